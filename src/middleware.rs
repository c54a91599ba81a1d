//! Per-request credential handling: attach, detect rejection, refresh once, replay once.
//!
//! [`AuthClient::execute`] is the only entry point. Anonymous requests go straight to the
//! transport. Everything else carries the session credential (unless the caller supplied an
//! explicit `Authorization` header), and a rejection whose status is listed in
//! [`SessionConfig::auth_failure_statuses`] sends the request through the coordinator and back to
//! the transport exactly once.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::SessionConfig,
	error::TransportError,
	http::{ApiRequest, ApiResponse, AuthMode, Transport},
	obs::{AuthEvent, EventSink, FlowKind, FlowSpan},
	refresh::Coordinator,
	store::CredentialStore,
};

/// An outbound request together with its single retry allowance.
#[derive(Clone, Debug)]
pub struct RequestAttempt {
	request: ApiRequest,
	sent_with: Option<u64>,
	retried: bool,
}
impl RequestAttempt {
	/// Wraps a request that has not been sent yet.
	pub fn new(request: ApiRequest) -> Self {
		Self { request, sent_with: None, retried: false }
	}

	/// Returns `true` once the attempt has used its retry.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	/// Returns the store generation the request was sent against, if any.
	///
	/// For a guard-attached credential this is the credential's own generation. A caller-supplied
	/// `Authorization` header is pinned to the generation current when it was sent, so its
	/// rejection is only answered by a credential written afterwards.
	pub fn sent_with(&self) -> Option<u64> {
		self.sent_with
	}

	/// Returns the request as it will be sent next.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Attaches the stored credential unless the caller supplied an explicit `Authorization`
	/// header.
	fn prepare(&mut self, store: &CredentialStore) -> Result<()> {
		if self.request.has_authorization() {
			self.sent_with = Some(store.generation());

			return Ok(());
		}
		if let Some(credential) = store.get() {
			self.request.set_authorization(credential.bearer_header()?);
			self.sent_with = Some(credential.generation);
		}

		Ok(())
	}

	/// Consumes the retry allowance and re-attaches `credential`.
	///
	/// Returns `false` (and leaves the request untouched) if the allowance is already spent.
	fn retry_with(&mut self, credential: &Credential) -> Result<bool> {
		if self.retried {
			return Ok(false);
		}

		self.request.set_authorization(credential.bearer_header()?);
		self.sent_with = Some(credential.generation);
		self.retried = true;

		Ok(true)
	}
}

/// Middleware client wrapping a [`Transport`] with the session's refresh handling.
pub struct AuthClient<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	coordinator: Arc<Coordinator>,
	config: Arc<SessionConfig>,
	events: EventSink,
}
impl<T> AuthClient<T>
where
	T: ?Sized + Transport,
{
	/// Creates a client that sends through `transport` and refreshes through `coordinator`.
	pub fn new(transport: Arc<T>, coordinator: Arc<Coordinator>, config: SessionConfig) -> Self {
		Self {
			transport,
			coordinator,
			config: Arc::new(config),
			events: EventSink::default(),
		}
	}

	pub(crate) fn with_shared(
		transport: Arc<T>,
		coordinator: Arc<Coordinator>,
		config: Arc<SessionConfig>,
		events: EventSink,
	) -> Self {
		Self { transport, coordinator, config, events }
	}

	/// Returns the wrapped transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Sends `request`, refreshing the credential and replaying the request once on rejection.
	pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
		if request.auth == AuthMode::Anonymous {
			return Ok(self.transport.execute(request).await?);
		}

		let span = FlowSpan::new(FlowKind::Request, "execute");

		span.instrument(self.execute_bearer(&span, RequestAttempt::new(request))).await
	}

	async fn execute_bearer(
		&self,
		span: &FlowSpan,
		mut attempt: RequestAttempt,
	) -> Result<ApiResponse> {
		attempt.prepare(self.coordinator.store())?;
		span.record_generation(attempt.sent_with);

		let rejection = match self.transport.execute(attempt.request.clone()).await {
			Ok(response) => return Ok(response),
			Err(e) if self.is_auth_rejection(&e) => e,
			Err(e) => return Err(e.into()),
		};

		#[cfg(feature = "tracing")]
		tracing::debug!(
			status = rejection.status_code(),
			sent_with = attempt.sent_with,
			"Request was rejected; obtaining a fresh credential."
		);
		#[cfg(not(feature = "tracing"))]
		let _ = &rejection;

		let credential = self.coordinator.obtain_fresh_credential(attempt.sent_with).await?;

		if !attempt.retry_with(&credential)? {
			return Err(Error::AlreadyRetried { source: rejection });
		}

		span.record_generation(attempt.sent_with);

		self.coordinator.metrics().record_retry();
		self.events.emit(AuthEvent::RequestRetried);

		match self.transport.execute(attempt.request).await {
			Ok(response) => Ok(response),
			Err(e) if self.is_auth_rejection(&e) => Err(Error::AlreadyRetried { source: e }),
			Err(e) => Err(e.into()),
		}
	}

	fn is_auth_rejection(&self, error: &TransportError) -> bool {
		error.status_code().is_some_and(|status| self.config.is_auth_failure(status))
	}
}
impl<T> Clone for AuthClient<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			coordinator: Arc::clone(&self.coordinator),
			config: Arc::clone(&self.config),
			events: self.events.clone(),
		}
	}
}
impl<T> Debug for AuthClient<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("coordinator", &self.coordinator)
			.field("config", &self.config)
			.finish()
	}
}
