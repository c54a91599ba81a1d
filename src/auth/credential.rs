//! Bearer credentials as issued by a collaborator and as held by the store.

// crates.io
use ::http::HeaderValue;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Credential freshly produced by a login or a refresh, before the store stamps it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredential {
	/// Bearer token value.
	pub access_token: TokenSecret,
	/// Lifetime advertised by the issuer, if any.
	pub expires_in: Option<Duration>,
}
impl IssuedCredential {
	/// Wraps a bearer token without a known lifetime.
	pub fn new(access_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: access_token.into(), expires_in: None }
	}

	/// Records the lifetime advertised by the issuer.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}
}
impl Debug for IssuedCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedCredential")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Current bearer credential held by a [`CredentialStore`](crate::store::CredentialStore).
///
/// The `generation` increases with every write to the store, which lets the coordinator tell
/// whether a rejected request was sent with the current credential or an older one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token value; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant the store accepted the credential.
	pub acquired_at: OffsetDateTime,
	/// Expiry derived from the issuer's advertised lifetime.
	pub expires_at: Option<OffsetDateTime>,
	/// Store write counter at the time this credential was set.
	pub generation: u64,
}
impl Credential {
	pub(crate) fn stamp(
		issued: IssuedCredential,
		acquired_at: OffsetDateTime,
		generation: u64,
	) -> Self {
		Self {
			token: issued.access_token,
			acquired_at,
			expires_at: issued.expires_in.map(|lifetime| acquired_at + lifetime),
			generation,
		}
	}

	/// Returns `true` if the credential carries an expiry at or before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}

	/// Returns `true` if the credential is known to be expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Renders the `Authorization: Bearer ...` header value, flagged as sensitive.
	pub fn bearer_header(&self) -> Result<HeaderValue, ConfigError> {
		let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token.expose()))?;

		value.set_sensitive(true);

		Ok(value)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("acquired_at", &self.acquired_at)
			.field("expires_at", &self.expires_at)
			.field("generation", &self.generation)
			.finish()
	}
}
