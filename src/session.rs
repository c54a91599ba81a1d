//! Session ownership of the credential store, the coordinator, and the teardown collaborator.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credential, IssuedCredential},
	config::SessionConfig,
	http::Transport,
	issuer::{CredentialIssuer, NoopTeardown, SessionTeardown, TeardownFuture},
	middleware::AuthClient,
	obs::{AuthEvent, AuthObserver, EventSink, FlowKind, FlowSpan},
	refresh::{Coordinator, RefreshMetrics},
	store::CredentialStore,
};

/// Wraps the user's teardown so it runs at most once per login.
struct TeardownOnce {
	store: Arc<CredentialStore>,
	active: AtomicBool,
	inner: Arc<dyn SessionTeardown>,
	events: EventSink,
}
impl TeardownOnce {
	async fn run(&self) {
		self.store.clear();

		if !self.active.swap(false, Ordering::SeqCst) {
			return;
		}

		self.events.emit(AuthEvent::SessionTornDown);

		FlowSpan::new(FlowKind::Teardown, "teardown").instrument(self.inner.teardown()).await;
	}
}
impl SessionTeardown for TeardownOnce {
	fn teardown(&self) -> TeardownFuture<'_> {
		Box::pin(self.run())
	}
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	issuer: Arc<dyn CredentialIssuer>,
	teardown: Arc<dyn SessionTeardown>,
	config: SessionConfig,
	observer: Option<Arc<dyn AuthObserver>>,
}
impl SessionBuilder {
	/// Sets the collaborator that ends the session remotely (defaults to [`NoopTeardown`]).
	pub fn teardown(mut self, teardown: Arc<dyn SessionTeardown>) -> Self {
		self.teardown = teardown;

		self
	}

	/// Replaces the session configuration.
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;

		self
	}

	/// Registers an observer for the session's events.
	pub fn observer(mut self, observer: Arc<dyn AuthObserver>) -> Self {
		self.observer = Some(observer);

		self
	}

	/// Builds an inactive session; call [`Session::login`] or [`Session::resume`] next.
	pub fn build(self) -> Session {
		let events = EventSink::new(self.observer);
		let store = Arc::new(CredentialStore::default());
		let teardown = Arc::new(TeardownOnce {
			store: Arc::clone(&store),
			active: AtomicBool::new(false),
			inner: self.teardown,
			events: events.clone(),
		});
		let coordinator = Coordinator::new(Arc::clone(&store), self.issuer, teardown.clone())
			.with_refresh_timeout(self.config.refresh_timeout)
			.with_events(events.clone());

		Session {
			store,
			coordinator: Arc::new(coordinator),
			teardown,
			config: Arc::new(self.config),
			events,
		}
	}
}

/// One authenticated session: a credential store, its refresh coordinator, and the teardown
/// that ends it.
///
/// Every [`AuthClient`] handed out by [`Session::client`] shares the same coordinator, so
/// rejections across all of them converge on a single refresh.
pub struct Session {
	store: Arc<CredentialStore>,
	coordinator: Arc<Coordinator>,
	teardown: Arc<TeardownOnce>,
	config: Arc<SessionConfig>,
	events: EventSink,
}
impl Session {
	/// Starts building a session around `issuer`.
	pub fn builder(issuer: Arc<dyn CredentialIssuer>) -> SessionBuilder {
		SessionBuilder {
			issuer,
			teardown: Arc::new(NoopTeardown),
			config: SessionConfig::default(),
			observer: None,
		}
	}

	/// Stores the credential obtained by a login and marks the session active.
	///
	/// A coordinator still settling a failed episode is released, so the first rejection after
	/// the login starts a fresh refresh.
	pub fn login(&self, issued: IssuedCredential) -> Credential {
		let credential = self.store.set(issued);

		self.coordinator.reset_failed();
		self.teardown.active.store(true, Ordering::SeqCst);

		#[cfg(feature = "tracing")]
		tracing::debug!(generation = credential.generation, "Session logged in.");

		credential
	}

	/// Restores a session on start-up.
	///
	/// Returns the stored credential when there is one; otherwise asks the issuer for a new one
	/// through the coordinator. A rejected refresh credential tears the session down again.
	pub async fn resume(&self) -> Result<Credential> {
		self.teardown.active.store(true, Ordering::SeqCst);

		Ok(self.coordinator.obtain_fresh_credential(None).await?)
	}

	/// Ends the session: releases parked requests, clears the credential, and runs the teardown
	/// collaborator if this is the first logout since the last login.
	pub async fn logout(&self) {
		let released = self.coordinator.abort();

		#[cfg(feature = "tracing")]
		tracing::debug!(released, "Session logging out.");
		#[cfg(not(feature = "tracing"))]
		let _ = released;

		self.teardown.run().await;
	}

	/// Builds a middleware client sending through `transport`.
	pub fn client<T>(&self, transport: Arc<T>) -> AuthClient<T>
	where
		T: ?Sized + Transport,
	{
		AuthClient::with_shared(
			transport,
			Arc::clone(&self.coordinator),
			Arc::clone(&self.config),
			self.events.clone(),
		)
	}

	/// Returns the current credential, if any.
	pub fn current(&self) -> Option<Credential> {
		self.store.get()
	}

	/// Returns `true` between a login (or resume) and the next teardown.
	pub fn is_active(&self) -> bool {
		self.teardown.active.load(Ordering::SeqCst)
	}

	/// Returns the session's refresh coordinator.
	pub fn coordinator(&self) -> &Arc<Coordinator> {
		&self.coordinator
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Returns the session configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("active", &self.is_active())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
