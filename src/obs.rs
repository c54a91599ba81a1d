//! Observability hooks for the guard.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_guard.flow` with the `flow` and
//!   `stage` fields, plus a debug event for every [`AuthEvent`].
//! - Enable `metrics` to increment the `bearer_guard_event_total` counter for every
//!   [`AuthEvent`], labeled by `event`.
//!
//! Independently of both features, an [`AuthObserver`] registered on the session receives every
//! event synchronously.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Guard flows that open a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// A request passing through the middleware.
	Request,
	/// A refresh episode driven by the coordinator.
	Refresh,
	/// A session teardown.
	Teardown,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Request => "request",
			FlowKind::Refresh => "refresh",
			FlowKind::Teardown => "teardown",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Events emitted while coordinating credential refreshes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthEvent {
	/// A caller started a new refresh episode.
	RefreshStarted,
	/// A caller attached to the refresh episode already in flight.
	RefreshJoined,
	/// The issuer produced a new credential.
	RefreshSucceeded,
	/// The refresh episode failed.
	RefreshFailed,
	/// A rejected request was replayed with a fresh credential.
	RequestRetried,
	/// The session teardown collaborator ran.
	SessionTornDown,
}
impl AuthEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthEvent::RefreshStarted => "refresh_started",
			AuthEvent::RefreshJoined => "refresh_joined",
			AuthEvent::RefreshSucceeded => "refresh_succeeded",
			AuthEvent::RefreshFailed => "refresh_failed",
			AuthEvent::RequestRetried => "request_retried",
			AuthEvent::SessionTornDown => "session_torn_down",
		}
	}
}
impl Display for AuthEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Receives every [`AuthEvent`] of a session. Called inline, so implementations must not block.
pub trait AuthObserver
where
	Self: Send + Sync,
{
	/// Handles one event.
	fn on_event(&self, event: AuthEvent);
}

/// Fans an event out to tracing, metrics, and the optional observer.
#[derive(Clone, Default)]
pub(crate) struct EventSink(Option<Arc<dyn AuthObserver>>);
impl EventSink {
	pub(crate) fn new(observer: Option<Arc<dyn AuthObserver>>) -> Self {
		Self(observer)
	}

	pub(crate) fn emit(&self, event: AuthEvent) {
		#[cfg(feature = "tracing")]
		::tracing::debug!(event = event.as_str(), "bearer_guard event");

		record_event(event);

		if let Some(observer) = &self.0 {
			observer.on_event(event);
		}
	}
}
impl Debug for EventSink {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("EventSink").field(&self.0.is_some()).finish()
	}
}
