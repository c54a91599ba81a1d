//! Reqwest-backed collaborators for cookie-based refresh and logout endpoints.
//!
//! The refresh credential travels as a cookie (named `refreshToken` unless configured
//! otherwise) and is rotated from the `Set-Cookie` headers of every refresh or login response.

// crates.io
use ::http::{
	HeaderMap, HeaderValue, StatusCode,
	header::{COOKIE, SET_COOKIE},
};
// self
use crate::{
	_prelude::*,
	auth::{IssuedCredential, TokenSecret},
	error::{ConfigError, IssuerError},
	issuer::{CredentialIssuer, IssuerFuture, SessionTeardown, TeardownFuture},
};

/// Endpoint settings for [`HttpCredentialIssuer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpIssuerConfig {
	/// Endpoint that exchanges the refresh cookie for a new access credential.
	pub refresh_url: Url,
	/// Name of the cookie carrying the refresh credential.
	#[serde(default = "HttpIssuerConfig::default_cookie_name")]
	pub refresh_cookie: String,
}
impl HttpIssuerConfig {
	/// Creates a config for `refresh_url` with the default cookie name.
	pub fn new(refresh_url: Url) -> Self {
		Self { refresh_url, refresh_cookie: Self::default_cookie_name() }
	}

	/// Parses `refresh_url` and creates a config with the default cookie name.
	pub fn parse(refresh_url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Url::parse(refresh_url)?))
	}

	/// Overrides the refresh cookie name.
	pub fn with_refresh_cookie(mut self, name: impl Into<String>) -> Self {
		self.refresh_cookie = name.into();

		self
	}

	fn default_cookie_name() -> String {
		"refreshToken".into()
	}
}

/// [`CredentialIssuer`] that calls a cookie-authenticated refresh endpoint.
pub struct HttpCredentialIssuer {
	client: ReqwestClient,
	config: HttpIssuerConfig,
	refresh_token: RwLock<Option<TokenSecret>>,
}
impl HttpCredentialIssuer {
	/// Creates an issuer without a refresh credential; one is captured by [`Self::login`] or set
	/// through [`Self::with_refresh_token`].
	pub fn new(client: ReqwestClient, config: HttpIssuerConfig) -> Self {
		Self { client, config, refresh_token: RwLock::new(None) }
	}

	/// Seeds the refresh credential.
	pub fn with_refresh_token(self, secret: impl Into<TokenSecret>) -> Self {
		*self.refresh_token.write() = Some(secret.into());

		self
	}

	/// Returns the currently held refresh credential.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.refresh_token.read().clone()
	}

	/// Forgets the held refresh credential.
	pub fn forget_refresh_token(&self) {
		*self.refresh_token.write() = None;
	}

	/// Posts `payload` to a login endpoint, capturing the refresh cookie and returning the
	/// access credential from the response body.
	pub async fn login<T>(
		&self,
		login_url: Url,
		payload: &T,
	) -> Result<IssuedCredential, IssuerError>
	where
		T: ?Sized + Serialize,
	{
		let response = self.client.post(login_url).json(payload).send().await?;
		let status = response.status();

		if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
			return Err(IssuerError::rejected(format!("login endpoint responded with {status}")));
		}
		if !status.is_success() {
			return Err(IssuerError::unavailable(format!(
				"login endpoint responded with {status}"
			)));
		}

		self.rotate_from(response.headers());

		let body = response.bytes().await?;

		super::parse_issued_credential(&body)
	}

	async fn refresh(&self) -> Result<IssuedCredential, IssuerError> {
		let mut request =
			self.client.post(self.config.refresh_url.clone()).json(&serde_json::json!({}));

		if let Some(cookie) = self.cookie_header() {
			request = request.header(COOKIE, cookie);
		}

		let response = request.send().await?;
		let status = response.status();

		if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
			return Err(IssuerError::rejected(format!("refresh endpoint responded with {status}")));
		}
		if !status.is_success() {
			return Err(IssuerError::unavailable(format!(
				"refresh endpoint responded with {status}"
			)));
		}

		self.rotate_from(response.headers());

		let body = response.bytes().await?;

		super::parse_issued_credential(&body)
	}

	fn cookie_header(&self) -> Option<HeaderValue> {
		let guard = self.refresh_token.read();
		let secret = guard.as_ref()?;
		let mut value =
			HeaderValue::from_str(&format!("{}={}", self.config.refresh_cookie, secret.expose()))
				.ok()?;

		value.set_sensitive(true);

		Some(value)
	}

	fn rotate_from(&self, headers: &HeaderMap) {
		if let Some(rotated) = find_cookie(headers, &self.config.refresh_cookie) {
			*self.refresh_token.write() = rotated.map(TokenSecret::new);
		}
	}
}
impl CredentialIssuer for HttpCredentialIssuer {
	fn issue(&self) -> IssuerFuture<'_> {
		Box::pin(self.refresh())
	}
}
impl Debug for HttpCredentialIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpCredentialIssuer")
			.field("config", &self.config)
			.field("refresh_token_set", &self.refresh_token.read().is_some())
			.finish()
	}
}

/// [`SessionTeardown`] that notifies a logout endpoint.
///
/// When built with [`Self::with_issuer`], the refresh cookie is sent along and forgotten
/// afterwards so a stale refresh credential cannot revive the session.
#[derive(Debug)]
pub struct HttpSessionTeardown {
	client: ReqwestClient,
	logout_url: Url,
	issuer: Option<Arc<HttpCredentialIssuer>>,
}
impl HttpSessionTeardown {
	/// Creates a teardown collaborator for `logout_url`.
	pub fn new(client: ReqwestClient, logout_url: Url) -> Self {
		Self { client, logout_url, issuer: None }
	}

	/// Sends (and then forgets) the refresh cookie held by `issuer`.
	pub fn with_issuer(mut self, issuer: Arc<HttpCredentialIssuer>) -> Self {
		self.issuer = Some(issuer);

		self
	}

	async fn notify(&self) {
		let mut request = self.client.post(self.logout_url.clone()).json(&serde_json::json!({}));

		if let Some(cookie) = self.issuer.as_ref().and_then(|issuer| issuer.cookie_header()) {
			request = request.header(COOKIE, cookie);
		}

		match request.send().await {
			Ok(response) if !response.status().is_success() => {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					status = response.status().as_u16(),
					"Logout endpoint rejected the call."
				);
				#[cfg(not(feature = "tracing"))]
				let _ = response;
			},
			Ok(_) => {},
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %e, "Logout endpoint could not be reached.");
				#[cfg(not(feature = "tracing"))]
				let _ = e;
			},
		}

		if let Some(issuer) = &self.issuer {
			issuer.forget_refresh_token();
		}
	}
}
impl SessionTeardown for HttpSessionTeardown {
	fn teardown(&self) -> TeardownFuture<'_> {
		Box::pin(self.notify())
	}
}

/// Looks for `name` in the `Set-Cookie` headers.
///
/// Returns `Some(None)` when the server clears the cookie and `None` when it is not mentioned.
fn find_cookie(headers: &HeaderMap, name: &str) -> Option<Option<String>> {
	headers.get_all(SET_COOKIE).iter().filter_map(|value| value.to_str().ok()).find_map(|raw| {
		let pair = raw.split(';').next()?.trim();
		let (key, value) = pair.split_once('=')?;

		(key.trim() == name).then(|| {
			let value = value.trim();

			(!value.is_empty()).then(|| value.to_owned())
		})
	})
}
