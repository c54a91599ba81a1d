// self
use crate::{_prelude::*, obs::FlowKind};

/// Future wrapped in the flow's span when tracing is enabled; the bare future otherwise.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future wrapped in the flow's span when tracing is enabled; the bare future otherwise.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span opened around a request, a refresh episode, or a teardown.
///
/// Spans are named `bearer_guard.flow` and carry `flow` and `stage`, plus the `episode` and
/// `generation` fields once recorded.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"bearer_guard.flow",
				flow = kind.as_str(),
				stage,
				episode = tracing::field::Empty,
				generation = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Tags the span with the refresh episode it belongs to.
	pub fn with_episode(self, episode: u64) -> Self {
		#[cfg(feature = "tracing")]
		{
			self.span.record("episode", episode);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = episode;
		}

		self
	}

	/// Tags the span with the store generation of the credential in use.
	pub fn record_generation(&self, generation: Option<u64>) {
		#[cfg(feature = "tracing")]
		{
			if let Some(generation) = generation {
				self.span.record("generation", generation);
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = generation;
		}
	}

	/// Runs `fut` inside the span without holding an entered guard across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
