//! Bearer-credential guard for HTTP clients: single-flight credential refresh, fan-out replay of
//! rejected requests, and exactly-once session teardown.
//!
//! A [`session::Session`] owns one [`store::CredentialStore`] and one
//! [`refresh::Coordinator`]. Every request sent through a [`middleware::AuthClient`] carries the
//! current bearer credential; when the transport reports an authentication rejection the client
//! joins (or starts) the session's single in-flight refresh and replays the request once with the
//! fresh credential.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod issuer;
pub mod middleware;
pub mod obs;
pub mod refresh;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
