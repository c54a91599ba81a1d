//! Single-flight refresh coordination with fan-out to every waiting request.
//!
//! A [`Coordinator`] owns the session's refresh state machine. The first caller that needs a
//! fresh credential while the coordinator is idle opens an *episode*: it flips the state to
//! [`RefreshState::Refreshing`] and spawns the only issuer call of that episode. Every caller
//! arriving while the episode is in flight is parked in the [`RetryQueue`]. When the issuer
//! answers, the new credential is written to the [`CredentialStore`] and then handed to every
//! waiter; when it fails, every waiter receives the same [`RefreshFailure`] and the teardown
//! collaborator runs exactly once, bounded by the same timeout as the issuer call.
//!
//! The state, the episode counter, and the queue share one mutex, so entering `Refreshing`,
//! enqueueing, and draining are mutually exclusive. The issuer call runs on its own tokio task
//! and completes even if the caller that started it is dropped.

pub mod queue;

mod metrics;

pub use metrics::RefreshMetrics;
pub use queue::{RefreshOutcome, RetryQueue, WaitHandle, Waiter};

// self
use crate::{
	_prelude::*,
	auth::{Credential, IssuedCredential},
	error::RefreshFailure,
	issuer::{CredentialIssuer, SessionTeardown},
	obs::{AuthEvent, AuthObserver, EventSink, FlowKind, FlowSpan},
	store::CredentialStore,
};

/// Refresh state of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshState {
	/// No refresh in flight.
	Idle,
	/// An issuer call is in flight; new callers join it.
	Refreshing,
	/// The episode failed; waiters were rejected and the teardown is running.
	Failed(RefreshFailure),
}

#[derive(Debug)]
struct Inner {
	state: RefreshState,
	episode: u64,
	queue: RetryQueue,
}
impl Inner {
	fn is_refreshing(&self, episode: u64) -> bool {
		self.episode == episode && self.state == RefreshState::Refreshing
	}
}

enum Entry {
	Fresh(Credential),
	Settled(RefreshFailure),
	Joined(WaitHandle),
	Started(WaitHandle, u64),
}

/// Single-flight refresh coordinator for one session.
///
/// Requires a tokio runtime with the time driver enabled: episodes run on spawned tasks bounded
/// by the refresh timeout.
pub struct Coordinator {
	inner: Mutex<Inner>,
	store: Arc<CredentialStore>,
	issuer: Arc<dyn CredentialIssuer>,
	teardown: Arc<dyn SessionTeardown>,
	refresh_timeout: Duration,
	events: EventSink,
	metrics: Arc<RefreshMetrics>,
}
impl Coordinator {
	const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates an idle coordinator writing to `store`.
	pub fn new(
		store: Arc<CredentialStore>,
		issuer: Arc<dyn CredentialIssuer>,
		teardown: Arc<dyn SessionTeardown>,
	) -> Self {
		Self {
			inner: Mutex::new(Inner {
				state: RefreshState::Idle,
				episode: 0,
				queue: RetryQueue::default(),
			}),
			store,
			issuer,
			teardown,
			refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
			events: EventSink::default(),
			metrics: Default::default(),
		}
	}

	/// Overrides the per-episode issuer timeout (defaults to 30 seconds).
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = if timeout.is_negative() { Duration::ZERO } else { timeout };

		self
	}

	/// Registers an observer for refresh events.
	pub fn with_observer(mut self, observer: Arc<dyn AuthObserver>) -> Self {
		self.events = EventSink::new(Some(observer));

		self
	}

	pub(crate) fn with_events(mut self, events: EventSink) -> Self {
		self.events = events;

		self
	}

	/// Returns the store this coordinator writes to.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns a snapshot of the refresh state.
	pub fn state(&self) -> RefreshState {
		self.inner.lock().state.clone()
	}

	/// Moves a coordinator stuck in [`RefreshState::Failed`] back to idle.
	///
	/// The pending teardown keeps running, but it no longer holds back new episodes. Returns
	/// `true` if the state changed.
	pub fn reset_failed(&self) -> bool {
		let mut inner = self.inner.lock();

		if !matches!(inner.state, RefreshState::Failed(_)) {
			return false;
		}

		inner.episode += 1;
		inner.state = RefreshState::Idle;

		true
	}

	/// Returns the number of callers parked on the current episode.
	pub fn waiting(&self) -> usize {
		self.inner.lock().queue.len()
	}

	/// Returns a credential newer than the one identified by `stale`, refreshing if needed.
	///
	/// `stale` is the generation of the credential the rejected request carried (`None` when it
	/// carried none). If the store already holds a newer credential it is returned immediately;
	/// otherwise the caller starts or joins the current episode and suspends until it settles.
	pub async fn obtain_fresh_credential(
		self: &Arc<Self>,
		stale: Option<u64>,
	) -> Result<Credential, RefreshFailure> {
		let entry = {
			let mut inner = self.inner.lock();

			if let Some(current) = self.store.newer_than(stale) {
				Entry::Fresh(current)
			} else {
				match inner.state.clone() {
					RefreshState::Failed(failure) => Entry::Settled(failure),
					RefreshState::Refreshing => {
						let (waiter, handle) = Waiter::new();

						inner.queue.enqueue(waiter);

						Entry::Joined(handle)
					},
					RefreshState::Idle => {
						let (waiter, handle) = Waiter::new();

						inner.state = RefreshState::Refreshing;
						inner.episode += 1;
						inner.queue.enqueue(waiter);

						Entry::Started(handle, inner.episode)
					},
				}
			}
		};

		match entry {
			Entry::Fresh(credential) => Ok(credential),
			Entry::Settled(failure) => Err(failure),
			Entry::Joined(handle) => {
				self.metrics.record_join();
				self.events.emit(AuthEvent::RefreshJoined);

				handle.wait().await
			},
			Entry::Started(handle, episode) => {
				self.events.emit(AuthEvent::RefreshStarted);

				tokio::spawn(Arc::clone(self).run_episode(episode));

				handle.wait().await
			},
		}
	}

	/// Releases every parked caller with [`RefreshFailure::SessionClosed`] and returns to idle.
	///
	/// An issuer call still in flight is left to finish, but its outcome is discarded and never
	/// reaches the store. Returns how many waiters were released.
	pub fn abort(&self) -> usize {
		let mut inner = self.inner.lock();
		let released = inner.queue.drain_failure(&RefreshFailure::SessionClosed);

		if inner.state != RefreshState::Idle {
			inner.episode += 1;
			inner.state = RefreshState::Idle;
		}

		released
	}

	async fn run_episode(self: Arc<Self>, episode: u64) {
		let span = FlowSpan::new(FlowKind::Refresh, "run_episode").with_episode(episode);
		let guard = EpisodeGuard { coordinator: Arc::clone(&self), episode };

		span.instrument(async move {
			self.metrics.record_attempt();

			let issued = tokio::time::timeout(self.std_timeout(), self.issuer.issue()).await;
			let outcome = match issued {
				Ok(Ok(issued)) => Ok(issued),
				Ok(Err(e)) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(episode, error = %e, "Credential issuer failed.");

					Err(RefreshFailure::from(&e))
				},
				Err(_) => Err(RefreshFailure::TimedOut { after: self.refresh_timeout }),
			};

			match outcome {
				Ok(issued) => self.settle_success(episode, issued),
				Err(failure) => self.settle_failure(episode, failure).await,
			}

			drop(guard);
		})
		.await
	}

	fn settle_success(&self, episode: u64, issued: IssuedCredential) {
		let released = {
			let mut inner = self.inner.lock();

			if !inner.is_refreshing(episode) {
				#[cfg(feature = "tracing")]
				tracing::debug!(episode, "Discarding credential issued for an aborted episode.");

				return;
			}

			let credential = self.store.set(issued);

			inner.state = RefreshState::Idle;

			inner.queue.drain_success(&credential)
		};

		#[cfg(feature = "tracing")]
		tracing::debug!(episode, released, "Refresh episode succeeded.");
		#[cfg(not(feature = "tracing"))]
		let _ = released;

		self.metrics.record_success();
		self.events.emit(AuthEvent::RefreshSucceeded);
	}

	async fn settle_failure(&self, episode: u64, failure: RefreshFailure) {
		let released = {
			let mut inner = self.inner.lock();

			if !inner.is_refreshing(episode) {
				return;
			}

			inner.state = RefreshState::Failed(failure.clone());

			inner.queue.drain_failure(&failure)
		};

		#[cfg(feature = "tracing")]
		tracing::warn!(episode, released, reason = %failure, "Refresh episode failed.");
		#[cfg(not(feature = "tracing"))]
		let _ = released;

		self.metrics.record_failure();
		self.events.emit(AuthEvent::RefreshFailed);

		if failure.is_terminal()
			&& tokio::time::timeout(self.std_timeout(), self.teardown.teardown()).await.is_err()
		{
			#[cfg(feature = "tracing")]
			tracing::warn!(episode, "Session teardown did not finish in time; abandoning it.");
		}

		let mut inner = self.inner.lock();

		if inner.episode == episode && matches!(inner.state, RefreshState::Failed(_)) {
			inner.state = RefreshState::Idle;
		}
	}

	fn std_timeout(&self) -> std::time::Duration {
		std::time::Duration::try_from(self.refresh_timeout).unwrap_or_default()
	}
}
impl Debug for Coordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.inner.lock();

		f.debug_struct("Coordinator")
			.field("state", &inner.state)
			.field("episode", &inner.episode)
			.field("waiting", &inner.queue.len())
			.field("refresh_timeout", &self.refresh_timeout)
			.finish()
	}
}

/// Settles an episode whose task ended (panic or runtime shutdown) before settling it.
struct EpisodeGuard {
	coordinator: Arc<Coordinator>,
	episode: u64,
}
impl Drop for EpisodeGuard {
	fn drop(&mut self) {
		let mut inner = self.coordinator.inner.lock();

		if inner.episode != self.episode || inner.state == RefreshState::Idle {
			return;
		}

		let was_refreshing = inner.state == RefreshState::Refreshing;

		inner.queue.drain_failure(&RefreshFailure::Abandoned);
		inner.state = RefreshState::Idle;

		drop(inner);

		if was_refreshing {
			self.coordinator.metrics.record_failure();
		}
	}
}
