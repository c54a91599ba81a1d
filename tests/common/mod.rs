//! Fakes shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::HashSet,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
use tokio::sync::Notify;
// self
use bearer_guard::{
	auth::IssuedCredential,
	config::SessionConfig,
	error::{IssuerError, TransportError},
	http::{ApiRequest, ApiResponse, Transport, TransportFuture},
	issuer::{CredentialIssuer, IssuerFuture, SessionTeardown, TeardownFuture},
	obs::{AuthEvent, AuthObserver},
	session::Session,
	url::Url,
};

pub const API_BASE: &str = "https://forum.example.com";

pub fn api_url(path: &str) -> Url {
	Url::parse(API_BASE)
		.and_then(|base| base.join(path))
		.expect("Fixture URL should parse successfully.")
}

/// One request as the fake server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seen {
	pub path: String,
	pub authorization: Option<String>,
}

/// Fake API server: accepts bearer tokens from an allow-list and rejects everything else.
#[derive(Default)]
pub struct ScriptedTransport {
	accepted: Mutex<HashSet<String>>,
	network_failures: Mutex<HashSet<String>>,
	seen: Mutex<Vec<Seen>>,
}
impl ScriptedTransport {
	pub fn accepting(token: &str) -> Arc<Self> {
		let transport = Arc::new(Self::default());

		transport.accept(token);

		transport
	}

	pub fn accept(&self, token: &str) {
		self.accepted.lock().insert(format!("Bearer {token}"));
	}

	pub fn revoke(&self, token: &str) {
		self.accepted.lock().remove(&format!("Bearer {token}"));
	}

	/// Makes every request to `path` fail at the network layer.
	pub fn break_path(&self, path: &str) {
		self.network_failures.lock().insert(path.to_owned());
	}

	pub fn seen(&self) -> Vec<Seen> {
		self.seen.lock().clone()
	}

	pub fn seen_with(&self, authorization: &str) -> usize {
		self.seen
			.lock()
			.iter()
			.filter(|seen| seen.authorization.as_deref() == Some(authorization))
			.count()
	}
}
impl Transport for ScriptedTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let path = request.url.path().to_owned();
		let authorization =
			request.authorization().and_then(|value| value.to_str().ok()).map(str::to_owned);

		self.seen.lock().push(Seen { path: path.clone(), authorization: authorization.clone() });

		let outcome = if self.network_failures.lock().contains(&path) {
			Err(TransportError::network(std::io::Error::other("connection reset by peer")))
		} else if path.starts_with("/api/public") {
			Ok(ApiResponse::new(200, path))
		} else if authorization.is_some_and(|value| self.accepted.lock().contains(&value)) {
			Ok(ApiResponse::new(200, path))
		} else if path.starts_with("/api/admin") {
			Err(TransportError::status(403))
		} else {
			Err(TransportError::status(401))
		};

		Box::pin(async move {
			tokio::task::yield_now().await;

			outcome
		})
	}
}

/// What the fake issuer does on its next call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerScript {
	/// Issue `access-{n}` and make the transport accept it.
	Succeed,
	/// Issue `access-{n}` without telling the transport about it.
	SucceedUnaccepted,
	/// The refresh credential is invalid.
	Reject,
	/// The refresh endpoint is down.
	Unavailable,
	/// Never answer.
	Hang,
}

/// Fake refresh endpoint counting its calls.
pub struct ScriptedIssuer {
	calls: AtomicUsize,
	script: Mutex<IssuerScript>,
	gate: Option<Notify>,
	transport: Arc<ScriptedTransport>,
}
impl ScriptedIssuer {
	pub fn new(transport: Arc<ScriptedTransport>, script: IssuerScript) -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			script: Mutex::new(script),
			gate: None,
			transport,
		})
	}

	/// Like [`Self::new`], but every call blocks until [`Self::open`] is called.
	pub fn gated(transport: Arc<ScriptedTransport>, script: IssuerScript) -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			script: Mutex::new(script),
			gate: Some(Notify::new()),
			transport,
		})
	}

	pub fn open(&self) {
		if let Some(gate) = &self.gate {
			gate.notify_one();
		}
	}

	pub fn set_script(&self, script: IssuerScript) {
		*self.script.lock() = script;
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	async fn run(&self) -> Result<IssuedCredential, IssuerError> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

		if let Some(gate) = &self.gate {
			gate.notified().await;
		}

		let script = *self.script.lock();

		match script {
			IssuerScript::Succeed | IssuerScript::SucceedUnaccepted => {
				let token = format!("access-{}", call + 1);

				if script == IssuerScript::Succeed {
					self.transport.accept(&token);
				}

				Ok(IssuedCredential::new(token))
			},
			IssuerScript::Reject => Err(IssuerError::rejected("refresh token expired")),
			IssuerScript::Unavailable => Err(IssuerError::unavailable("connection refused")),
			IssuerScript::Hang => std::future::pending().await,
		}
	}
}
impl CredentialIssuer for ScriptedIssuer {
	fn issue(&self) -> IssuerFuture<'_> {
		Box::pin(self.run())
	}
}

/// Teardown collaborator counting how often it ran.
#[derive(Default)]
pub struct CountingTeardown {
	calls: AtomicUsize,
	gate: Option<Notify>,
}
impl CountingTeardown {
	/// Every teardown blocks until [`Self::open`] is called.
	pub fn gated() -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0), gate: Some(Notify::new()) })
	}

	pub fn open(&self) {
		if let Some(gate) = &self.gate {
			gate.notify_one();
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl SessionTeardown for CountingTeardown {
	fn teardown(&self) -> TeardownFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if let Some(gate) = &self.gate {
				gate.notified().await;
			}
		})
	}
}

/// Observer keeping every event in order.
#[derive(Default)]
pub struct EventLog(Mutex<Vec<AuthEvent>>);
impl EventLog {
	pub fn events(&self) -> Vec<AuthEvent> {
		self.0.lock().clone()
	}

	pub fn count(&self, event: AuthEvent) -> usize {
		self.0.lock().iter().filter(|e| **e == event).count()
	}
}
impl AuthObserver for EventLog {
	fn on_event(&self, event: AuthEvent) {
		self.0.lock().push(event);
	}
}

/// A logged-in session holding `access-1`, wired to the given fakes.
pub struct Fixture {
	pub session: Session,
	pub transport: Arc<ScriptedTransport>,
	pub issuer: Arc<ScriptedIssuer>,
	pub teardown: Arc<CountingTeardown>,
	pub events: Arc<EventLog>,
}
impl Fixture {
	pub fn new(issuer: impl FnOnce(Arc<ScriptedTransport>) -> Arc<ScriptedIssuer>) -> Self {
		Self::with_config(SessionConfig::default(), issuer)
	}

	pub fn with_config(
		config: SessionConfig,
		issuer: impl FnOnce(Arc<ScriptedTransport>) -> Arc<ScriptedIssuer>,
	) -> Self {
		Self::with_teardown(config, Arc::new(CountingTeardown::default()), issuer)
	}

	pub fn with_teardown(
		config: SessionConfig,
		teardown: Arc<CountingTeardown>,
		issuer: impl FnOnce(Arc<ScriptedTransport>) -> Arc<ScriptedIssuer>,
	) -> Self {
		let transport = Arc::new(ScriptedTransport::default());
		let issuer = issuer(Arc::clone(&transport));
		let events = Arc::new(EventLog::default());
		let session = Session::builder(issuer.clone())
			.teardown(teardown.clone())
			.config(config)
			.observer(events.clone())
			.build();

		session.login(IssuedCredential::new("access-1"));

		Self { session, transport, issuer, teardown, events }
	}

	/// Yields until the coordinator has `n` parked callers.
	pub async fn wait_for_waiters(&self, n: usize) {
		while self.session.coordinator().waiting() < n {
			tokio::task::yield_now().await;
		}
	}

	/// Yields until the teardown collaborator has been entered `n` times.
	pub async fn wait_for_teardowns(&self, n: usize) {
		while self.teardown.calls() < n {
			tokio::task::yield_now().await;
		}
	}
}
