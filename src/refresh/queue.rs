//! Waiters suspended on an in-flight refresh episode.

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{auth::Credential, error::RefreshFailure};

/// Result delivered to every waiter of an episode.
pub type RefreshOutcome = Result<Credential, RefreshFailure>;

/// Sending half of a suspended caller.
#[derive(Debug)]
pub struct Waiter(oneshot::Sender<RefreshOutcome>);
impl Waiter {
	/// Creates a waiter together with the handle its caller awaits.
	pub fn new() -> (Self, WaitHandle) {
		let (tx, rx) = oneshot::channel();

		(Self(tx), WaitHandle(rx))
	}

	fn settle(self, outcome: RefreshOutcome) -> bool {
		self.0.send(outcome).is_ok()
	}
}

/// Receiving half of a [`Waiter`].
#[derive(Debug)]
pub struct WaitHandle(oneshot::Receiver<RefreshOutcome>);
impl WaitHandle {
	/// Suspends until the episode settles.
	///
	/// A waiter dropped without being settled resolves to [`RefreshFailure::Abandoned`].
	pub async fn wait(self) -> RefreshOutcome {
		self.0.await.unwrap_or(Err(RefreshFailure::Abandoned))
	}
}

/// FIFO of waiters attached to the current episode.
///
/// The queue has no lock of its own: the coordinator keeps it behind the same mutex as its
/// state, so an enqueue can never interleave with a drain.
#[derive(Debug, Default)]
pub struct RetryQueue(VecDeque<Waiter>);
impl RetryQueue {
	/// Appends a waiter.
	pub fn enqueue(&mut self, waiter: Waiter) {
		self.0.push_back(waiter);
	}

	/// Resolves every waiter with `credential` and empties the queue.
	///
	/// Returns how many waiters were still listening.
	pub fn drain_success(&mut self, credential: &Credential) -> usize {
		self.drain_with(|| Ok(credential.clone()))
	}

	/// Rejects every waiter with `failure` and empties the queue.
	///
	/// Returns how many waiters were still listening.
	pub fn drain_failure(&mut self, failure: &RefreshFailure) -> usize {
		self.drain_with(|| Err(failure.clone()))
	}

	/// Returns the number of queued waiters.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no waiter is queued.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn drain_with(&mut self, outcome: impl Fn() -> RefreshOutcome) -> usize {
		self.0.drain(..).map(|waiter| waiter.settle(outcome())).filter(|sent| *sent).count()
	}
}
