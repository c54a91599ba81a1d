//! Credential models shared by the store, the coordinator, and the middleware.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
