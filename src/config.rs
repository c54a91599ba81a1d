//! Session-level configuration.

// self
use crate::_prelude::*;

/// Tunables shared by a session's coordinator and middleware clients.
///
/// Every field has a default, so a partial document (or `{}`) deserializes into a usable
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Upper bound on a single refresh call; waiters are rejected when it elapses.
	pub refresh_timeout: Duration,
	/// Response statuses treated as an authentication rejection.
	pub auth_failure_statuses: Vec<u16>,
}
impl SessionConfig {
	const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(30);

	/// Overrides the refresh timeout (negative values are clamped to zero).
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = if timeout.is_negative() { Duration::ZERO } else { timeout };

		self
	}

	/// Replaces the set of statuses treated as an authentication rejection.
	pub fn with_auth_failure_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
		self.auth_failure_statuses = statuses.into_iter().collect();

		self
	}

	/// Returns `true` if `status` signals an authentication rejection.
	pub fn is_auth_failure(&self, status: u16) -> bool {
		self.auth_failure_statuses.contains(&status)
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self { refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT, auth_failure_statuses: vec![401] }
	}
}
