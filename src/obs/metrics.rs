// self
use crate::obs::AuthEvent;

/// Records an event via the global metrics recorder (when enabled).
pub fn record_event(event: AuthEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("bearer_guard_event_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}
