//! Collaborators the coordinator depends on: the credential issuer and the session teardown.
//!
//! Both contracts return boxed futures so implementations can be stored behind `Arc<dyn _>`
//! and driven from the coordinator's spawned refresh task.

#[cfg(feature = "reqwest")] pub mod http;

#[cfg(feature = "reqwest")] pub use http::*;

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, auth::IssuedCredential, error::IssuerError};

/// Boxed future returned by [`CredentialIssuer::issue`].
pub type IssuerFuture<'a> =
	Pin<Box<dyn Future<Output = Result<IssuedCredential, IssuerError>> + 'a + Send>>;

/// Boxed future returned by [`SessionTeardown::teardown`].
pub type TeardownFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Exchanges the session's long-lived refresh credential for a new access credential.
pub trait CredentialIssuer
where
	Self: Send + Sync,
{
	/// Requests a new access credential.
	///
	/// Return [`IssuerError::Rejected`] only when the refresh credential itself is invalid or
	/// expired; that is the one outcome that tears the session down.
	fn issue(&self) -> IssuerFuture<'_>;
}

/// Ends the session on the issuing side (for example by calling a logout endpoint).
///
/// The session wraps this collaborator so it runs at most once per login, no matter how many
/// callers trigger a teardown.
pub trait SessionTeardown
where
	Self: Send + Sync,
{
	/// Performs the teardown. Failures are the implementation's to log; nothing is propagated.
	fn teardown(&self) -> TeardownFuture<'_>;
}

/// Teardown collaborator that does nothing beyond the local session reset.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTeardown;
impl SessionTeardown for NoopTeardown {
	fn teardown(&self) -> TeardownFuture<'_> {
		Box::pin(async {})
	}
}

#[derive(Deserialize)]
struct TokenPayload {
	#[serde(rename = "accessToken", alias = "access_token")]
	access_token: String,
	#[serde(rename = "expiresIn", alias = "expires_in", default)]
	expires_in: Option<i64>,
}

/// Parses a refresh or login response body into an [`IssuedCredential`].
///
/// Accepts both the enveloped `{"data":{"accessToken":..,"expiresIn":..}}` shape and a bare
/// `{"accessToken":..}` object. A non-positive `expiresIn` is treated as unknown.
pub fn parse_issued_credential(body: &[u8]) -> Result<IssuedCredential, IssuerError> {
	let mut de = serde_json::Deserializer::from_slice(body);
	let mut value: Value = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| IssuerError::MalformedResponse { source })?;
	let payload = match value.get_mut("data").filter(|data| data.is_object()).map(Value::take) {
		Some(data) => data,
		None => value,
	};
	let payload: TokenPayload = serde_path_to_error::deserialize(payload)
		.map_err(|source| IssuerError::MalformedResponse { source })?;
	let mut issued = IssuedCredential::new(payload.access_token);

	if let Some(secs) = payload.expires_in.filter(|secs| *secs > 0) {
		issued = issued.with_expires_in(Duration::seconds(secs));
	}

	Ok(issued)
}
