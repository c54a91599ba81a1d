//! Guard-level error types shared across the middleware, coordinator, and collaborators.

// self
use crate::_prelude::*;

/// Guard-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced to callers of an [`AuthClient`](crate::middleware::AuthClient).
///
/// Authentication rejections never leak out directly: callers observe either a (possibly
/// replayed) response, a transport failure unrelated to authentication, or one of the two
/// terminal authentication errors.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure or a non-authentication error status, propagated unchanged.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The refresh episode that would have renewed the credential failed.
	#[error("Authentication expired: {reason}")]
	AuthenticationExpired {
		/// Why the refresh episode failed.
		reason: RefreshFailure,
	},
	/// The request was rejected again after being replayed with a fresh credential.
	#[error("Request was rejected after replaying it with a fresh credential.")]
	AlreadyRetried {
		/// Rejection returned by the replayed attempt.
		#[source]
		source: TransportError,
	},
}
impl Error {
	/// Returns `true` for [`Error::AuthenticationExpired`].
	pub fn is_authentication_expired(&self) -> bool {
		matches!(self, Self::AuthenticationExpired { .. })
	}
}
impl From<RefreshFailure> for Error {
	fn from(reason: RefreshFailure) -> Self {
		Self::AuthenticationExpired { reason }
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Credential cannot be encoded as an `Authorization` header.
	#[error("Credential cannot be encoded as an Authorization header.")]
	InvalidCredentialHeader(#[from] ::http::header::InvalidHeaderValue),
	/// Configured endpoint URL cannot be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint(#[from] url::ParseError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures reported by a [`Transport`](crate::http::Transport).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS, timeout).
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
	/// Server answered with a non-success status.
	#[error("Server responded with status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, kept for callers that need the server's error payload.
		body: Vec<u8>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Builds a status failure without body or retry hint.
	pub fn status(status: u16) -> Self {
		Self::Status { status, body: Vec::new(), retry_after: None }
	}

	/// Returns the HTTP status code, if the failure carries one.
	pub fn status_code(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failures reported by a [`CredentialIssuer`](crate::issuer::CredentialIssuer).
#[derive(Debug, ThisError)]
pub enum IssuerError {
	/// The long-lived refresh credential is invalid or expired.
	#[error("Refresh credential was rejected: {reason}.")]
	Rejected {
		/// Issuer- or guard-supplied reason string.
		reason: String,
	},
	/// The issuer could not be reached or answered unexpectedly.
	#[error("Credential issuer is unavailable: {message}.")]
	Unavailable {
		/// Summary of the failure.
		message: String,
		/// Underlying failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
	/// The issuer answered with a body that could not be parsed.
	#[error("Credential issuer returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl IssuerError {
	/// Builds an [`IssuerError::Rejected`].
	pub fn rejected(reason: impl Into<String>) -> Self {
		Self::Rejected { reason: reason.into() }
	}

	/// Builds an [`IssuerError::Unavailable`] without an underlying source.
	pub fn unavailable(message: impl Into<String>) -> Self {
		Self::Unavailable { message: message.into(), source: None }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for IssuerError {
	fn from(e: ReqwestError) -> Self {
		Self::Unavailable {
			message: "request to the refresh endpoint failed".into(),
			source: Some(Box::new(e)),
		}
	}
}

/// Outcome shared with every waiter of a failed refresh episode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RefreshFailure {
	/// The issuer rejected the refresh credential; the session was torn down.
	#[error("refresh credential was rejected ({reason})")]
	Rejected {
		/// Issuer-supplied reason string.
		reason: String,
	},
	/// The issuer could not produce a credential.
	#[error("credential issuer is unavailable ({message})")]
	Unavailable {
		/// Summary of the issuer failure.
		message: String,
	},
	/// The issuer did not answer within the configured refresh timeout.
	#[error("refresh did not complete within {after}")]
	TimedOut {
		/// Timeout that elapsed.
		after: Duration,
	},
	/// The session was logged out while the caller was waiting.
	#[error("session was closed")]
	SessionClosed,
	/// The refresh task ended without settling its waiters.
	#[error("refresh was abandoned")]
	Abandoned,
}
impl RefreshFailure {
	/// Returns `true` when the failure came out of the refresh itself and must tear down the
	/// session.
	///
	/// [`SessionClosed`](Self::SessionClosed) and [`Abandoned`](Self::Abandoned) describe an
	/// episode that never settled; the session is already gone or was never told anything.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Rejected { .. } | Self::Unavailable { .. } | Self::TimedOut { .. })
	}
}
impl From<&IssuerError> for RefreshFailure {
	fn from(e: &IssuerError) -> Self {
		match e {
			IssuerError::Rejected { reason } => Self::Rejected { reason: reason.clone() },
			IssuerError::Unavailable { message, .. } =>
				Self::Unavailable { message: message.clone() },
			IssuerError::MalformedResponse { source } => Self::Unavailable {
				message: format!("malformed issuer response at `{}`", source.path()),
			},
		}
	}
}
