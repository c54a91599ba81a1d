//! Demonstrates five concurrent requests converging on a single credential refresh.
//!
//! The transport below accepts exactly one bearer token at a time. All five requests leave with
//! the expired `access-1`, get rejected, park on the session's coordinator, and are replayed with
//! the `access-2` produced by the one issuer call.

// std
use std::{
	collections::HashSet,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
use url::Url;
// self
use bearer_guard::{
	auth::IssuedCredential,
	error::{IssuerError, TransportError},
	http::{ApiRequest, ApiResponse, Transport, TransportFuture},
	issuer::{CredentialIssuer, IssuerFuture},
	obs::{AuthEvent, AuthObserver},
	session::Session,
};

#[derive(Default)]
struct ForumApi {
	accepted: Mutex<HashSet<String>>,
}
impl Transport for ForumApi {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let authorized = request
			.authorization()
			.and_then(|value| value.to_str().ok())
			.is_some_and(|value| self.accepted.lock().contains(value));
		let path = request.url.path().to_owned();

		Box::pin(async move {
			tokio::task::yield_now().await;

			if authorized {
				Ok(ApiResponse::new(200, format!("{{\"path\":\"{path}\"}}")))
			} else {
				Err(TransportError::status(401))
			}
		})
	}
}

struct RefreshEndpoint {
	api: Arc<ForumApi>,
	calls: AtomicUsize,
}
impl CredentialIssuer for RefreshEndpoint {
	fn issue(&self) -> IssuerFuture<'_> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let token = format!("access-{}", call + 1);

			tokio::time::sleep(std::time::Duration::from_millis(50)).await;
			self.api.accepted.lock().insert(format!("Bearer {token}"));

			Ok::<_, IssuerError>(IssuedCredential::new(token))
		})
	}
}

struct PrintEvents;
impl AuthObserver for PrintEvents {
	fn on_event(&self, event: AuthEvent) {
		println!("event: {event}");
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let api = Arc::new(ForumApi::default());
	let issuer = Arc::new(RefreshEndpoint { api: Arc::clone(&api), calls: AtomicUsize::new(0) });
	let session = Session::builder(issuer.clone()).observer(Arc::new(PrintEvents)).build();

	session.login(IssuedCredential::new("access-1"));

	let client = session.client(Arc::clone(&api));
	let base = Url::parse("https://forum.example.com/api/topics/")?;
	let mut tasks = Vec::new();

	for id in 0..5 {
		let client = client.clone();
		let url = base.join(&id.to_string())?;

		tasks.push(tokio::spawn(async move { client.execute(ApiRequest::get(url)).await }));
	}
	for task in tasks {
		let response = task.await??;

		println!("{} -> {}", response.status, String::from_utf8_lossy(&response.body));
	}

	println!(
		"Issuer calls: {}; replayed requests: {}.",
		issuer.calls.load(Ordering::SeqCst),
		session.metrics().retries()
	);

	session.logout().await;

	Ok(())
}
