mod common;

// crates.io
use time::Duration;
// self
use bearer_guard::{
	auth::IssuedCredential,
	config::SessionConfig,
	error::{Error, RefreshFailure, TransportError},
	http::ApiRequest,
	http_types::{HeaderValue, header::AUTHORIZATION},
	middleware::AuthClient,
	obs::AuthEvent,
	refresh::RefreshState,
};
use common::{
	CountingTeardown, Fixture, IssuerScript, ScriptedIssuer, ScriptedTransport, api_url,
};

async fn settle(fixture: &Fixture) {
	for _ in 0..50 {
		if fixture.session.coordinator().state() == RefreshState::Idle {
			break;
		}

		tokio::task::yield_now().await;
	}
}

fn spawn_requests(
	client: &AuthClient<ScriptedTransport>,
	n: usize,
) -> Vec<tokio::task::JoinHandle<Result<String, Error>>> {
	(0..n)
		.map(|i| {
			let client = client.clone();

			tokio::spawn(async move {
				let request = ApiRequest::get(api_url(&format!("/api/topics/{i}")));
				let response = client.execute(request).await?;

				Ok::<_, Error>(String::from_utf8_lossy(&response.body).into_owned())
			})
		})
		.collect()
}

#[tokio::test]
async fn five_concurrent_rejections_share_one_refresh() {
	let fixture = Fixture::new(|t| ScriptedIssuer::gated(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());
	let handles = spawn_requests(&client, 5);

	fixture.wait_for_waiters(5).await;

	assert_eq!(fixture.session.coordinator().state(), RefreshState::Refreshing);

	fixture.issuer.open();

	for (i, handle) in handles.into_iter().enumerate() {
		let body = handle
			.await
			.expect("Request task should not panic.")
			.expect("Every request should succeed after the shared refresh.");

		assert_eq!(body, format!("/api/topics/{i}"));
	}

	assert_eq!(fixture.issuer.calls(), 1);
	assert_eq!(fixture.transport.seen_with("Bearer access-1"), 5);
	assert_eq!(fixture.transport.seen_with("Bearer access-2"), 5);
	assert_eq!(fixture.transport.seen().len(), 10);
	assert_eq!(fixture.events.count(AuthEvent::RefreshStarted), 1);
	assert_eq!(fixture.events.count(AuthEvent::RefreshJoined), 4);
	assert_eq!(fixture.events.count(AuthEvent::RefreshSucceeded), 1);
	assert_eq!(fixture.events.count(AuthEvent::RequestRetried), 5);
	assert_eq!(fixture.session.metrics().retries(), 5);
	assert_eq!(fixture.teardown.calls(), 0);
}

#[tokio::test]
async fn rejected_refresh_expires_the_request_and_tears_down_once() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Reject));
	let client = fixture.session.client(fixture.transport.clone());
	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A rejected refresh credential should fail the request.");

	assert!(matches!(
		err,
		Error::AuthenticationExpired { reason: RefreshFailure::Rejected { .. } }
	));

	settle(&fixture).await;

	assert_eq!(fixture.teardown.calls(), 1);
	assert!(!fixture.session.is_active());
	assert!(fixture.session.current().is_none());

	fixture.session.logout().await;

	assert_eq!(fixture.teardown.calls(), 1);
	assert_eq!(fixture.events.count(AuthEvent::SessionTornDown), 1);
}

#[tokio::test]
async fn failed_refresh_fans_out_to_every_waiter() {
	let fixture = Fixture::new(|t| ScriptedIssuer::gated(t, IssuerScript::Reject));
	let client = fixture.session.client(fixture.transport.clone());
	let handles = spawn_requests(&client, 5);

	fixture.wait_for_waiters(5).await;
	fixture.issuer.open();

	for handle in handles {
		let err = handle
			.await
			.expect("Request task should not panic.")
			.expect_err("Every waiter should observe the failed refresh.");

		assert!(err.is_authentication_expired());
	}

	settle(&fixture).await;

	assert_eq!(fixture.issuer.calls(), 1);
	assert_eq!(fixture.teardown.calls(), 1);
	assert_eq!(fixture.events.count(AuthEvent::RefreshFailed), 1);
	assert_eq!(fixture.events.count(AuthEvent::RequestRetried), 0);
}

#[tokio::test]
async fn replayed_rejection_is_surfaced_without_second_refresh() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::SucceedUnaccepted));
	let client = fixture.session.client(fixture.transport.clone());
	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A replayed request that is rejected again should fail.");

	match err {
		Error::AlreadyRetried { source } => assert_eq!(source.status_code(), Some(401)),
		other => panic!("Expected AlreadyRetried, got {other:?}."),
	}

	assert_eq!(fixture.issuer.calls(), 1);
	assert_eq!(fixture.transport.seen_with("Bearer access-1"), 1);
	assert_eq!(fixture.transport.seen_with("Bearer access-2"), 1);
	assert_eq!(fixture.teardown.calls(), 0);
}

#[tokio::test]
async fn waiters_never_see_the_stale_credential() {
	let fixture = Fixture::new(|t| ScriptedIssuer::gated(t, IssuerScript::Succeed));
	let coordinator = fixture.session.coordinator().clone();
	let waiters = (0..3)
		.map(|_| {
			let coordinator = coordinator.clone();

			tokio::spawn(async move { coordinator.obtain_fresh_credential(Some(1)).await })
		})
		.collect::<Vec<_>>();

	fixture.wait_for_waiters(3).await;
	fixture.issuer.open();

	for waiter in waiters {
		let credential = waiter
			.await
			.expect("Waiter task should not panic.")
			.expect("Waiter should receive the refreshed credential.");
		let stored = fixture.session.current().expect("Store should hold the new credential.");

		assert_eq!(credential.token.expose(), "access-2");
		assert_eq!(credential.generation, stored.generation);
	}
}

#[tokio::test]
async fn newer_stored_credential_skips_the_refresh() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());

	client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect("First request should succeed after refreshing.");

	// A request that left with `access-1` before the refresh landed.
	let credential = fixture
		.session
		.coordinator()
		.obtain_fresh_credential(Some(1))
		.await
		.expect("The newer credential should be handed out directly.");

	assert_eq!(credential.token.expose(), "access-2");
	assert_eq!(fixture.issuer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_timeout_rejects_waiters_and_tears_down() {
	let config = SessionConfig::default().with_refresh_timeout(Duration::seconds(5));
	let fixture =
		Fixture::with_config(config, |t| ScriptedIssuer::new(t, IssuerScript::Hang));
	let client = fixture.session.client(fixture.transport.clone());
	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A hanging issuer should time out.");

	assert!(matches!(
		err,
		Error::AuthenticationExpired { reason: RefreshFailure::TimedOut { after } }
			if after == Duration::seconds(5)
	));

	settle(&fixture).await;

	assert_eq!(fixture.teardown.calls(), 1);
	assert!(!fixture.session.is_active());
	assert!(fixture.session.current().is_none());

	fixture.issuer.set_script(IssuerScript::Succeed);

	let credential = fixture.session.resume().await.expect("Resume should start a new episode.");

	assert_eq!(credential.token.expose(), "access-3");
	assert_eq!(fixture.issuer.calls(), 2);
}

#[tokio::test]
async fn unavailable_issuer_rejects_waiters_and_tears_down_once() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Unavailable));
	let client = fixture.session.client(fixture.transport.clone());
	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("An unavailable issuer should fail the request.");

	assert!(matches!(
		err,
		Error::AuthenticationExpired { reason: RefreshFailure::Unavailable { .. } }
	));

	settle(&fixture).await;

	assert_eq!(fixture.teardown.calls(), 1);
	assert!(!fixture.session.is_active());
	assert_eq!(fixture.events.count(AuthEvent::SessionTornDown), 1);
}

#[tokio::test]
async fn caller_arriving_during_teardown_gets_the_settled_failure() {
	let fixture = Fixture::with_teardown(SessionConfig::default(), CountingTeardown::gated(), |t| {
		ScriptedIssuer::new(t, IssuerScript::Reject)
	});
	let client = fixture.session.client(fixture.transport.clone());
	let first = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A rejected refresh credential should fail the request.");

	assert!(first.is_authentication_expired());

	fixture.wait_for_teardowns(1).await;

	assert!(matches!(fixture.session.coordinator().state(), RefreshState::Failed(_)));

	let late = client
		.execute(ApiRequest::get(api_url("/api/topics/1")))
		.await
		.expect_err("A caller arriving while the teardown runs should fail.");

	assert!(matches!(
		late,
		Error::AuthenticationExpired { reason: RefreshFailure::Rejected { .. } }
	));
	assert_eq!(fixture.issuer.calls(), 1);

	fixture.teardown.open();
	settle(&fixture).await;

	assert_eq!(fixture.session.coordinator().state(), RefreshState::Idle);
	assert_eq!(fixture.teardown.calls(), 1);
}

#[tokio::test]
async fn login_after_a_stuck_teardown_starts_a_new_episode() {
	let fixture = Fixture::with_teardown(SessionConfig::default(), CountingTeardown::gated(), |t| {
		ScriptedIssuer::new(t, IssuerScript::Reject)
	});
	let client = fixture.session.client(fixture.transport.clone());

	client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A rejected refresh credential should fail the request.");
	fixture.wait_for_teardowns(1).await;

	assert!(matches!(fixture.session.coordinator().state(), RefreshState::Failed(_)));

	fixture.session.login(IssuedCredential::new("access-9"));
	fixture.issuer.set_script(IssuerScript::Succeed);

	assert_eq!(fixture.session.coordinator().state(), RefreshState::Idle);

	let response = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect("The new login should be able to refresh again.");

	assert_eq!(response.status, 200);
	assert_eq!(fixture.issuer.calls(), 2);
	assert_eq!(fixture.transport.seen_with("Bearer access-9"), 1);
	assert_eq!(fixture.transport.seen_with("Bearer access-3"), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_teardown_is_abandoned_after_the_refresh_timeout() {
	let config = SessionConfig::default().with_refresh_timeout(Duration::seconds(5));
	let fixture = Fixture::with_teardown(config, CountingTeardown::gated(), |t| {
		ScriptedIssuer::new(t, IssuerScript::Reject)
	});
	let client = fixture.session.client(fixture.transport.clone());

	client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("A rejected refresh credential should fail the request.");

	tokio::time::sleep(std::time::Duration::from_secs(6)).await;

	assert_eq!(fixture.teardown.calls(), 1);
	assert_eq!(fixture.session.coordinator().state(), RefreshState::Idle);
}

#[tokio::test]
async fn rejected_explicit_authorization_still_refreshes() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());
	let response = client
		.execute(
			ApiRequest::get(api_url("/api/spaces"))
				.with_header(AUTHORIZATION, HeaderValue::from_static("Bearer custom")),
		)
		.await
		.expect("The request should be replayed with a refreshed credential.");

	assert_eq!(response.status, 200);
	assert_eq!(fixture.issuer.calls(), 1);
	assert_eq!(
		fixture
			.transport
			.seen()
			.into_iter()
			.map(|seen| seen.authorization.unwrap_or_default())
			.collect::<Vec<_>>(),
		["Bearer custom", "Bearer access-2"]
	);
}

#[tokio::test]
async fn forced_logout_releases_parked_requests() {
	let fixture = Fixture::new(|t| ScriptedIssuer::gated(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());
	let handles = spawn_requests(&client, 3);

	fixture.wait_for_waiters(3).await;
	fixture.session.logout().await;

	for handle in handles {
		let err = handle
			.await
			.expect("Request task should not panic.")
			.expect_err("Parked requests should be released by the logout.");

		assert!(matches!(
			err,
			Error::AuthenticationExpired { reason: RefreshFailure::SessionClosed }
		));
	}

	assert_eq!(fixture.teardown.calls(), 1);

	// The abandoned issuer call may still finish; its credential must not revive the session.
	fixture.issuer.open();

	for _ in 0..20 {
		tokio::task::yield_now().await;
	}

	assert!(fixture.session.current().is_none());
	assert_eq!(fixture.session.coordinator().state(), RefreshState::Idle);
}

#[tokio::test]
async fn anonymous_requests_bypass_the_guard() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());
	let response = client
		.execute(ApiRequest::post(api_url("/api/public/auth/login")).anonymous())
		.await
		.expect("Anonymous request should pass through.");

	assert_eq!(response.status, 200);

	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")).anonymous())
		.await
		.expect_err("Anonymous rejection should surface unchanged.");

	assert!(matches!(err, Error::Transport(TransportError::Status { status: 401, .. })));
	assert!(fixture.transport.seen().iter().all(|seen| seen.authorization.is_none()));
	assert_eq!(fixture.issuer.calls(), 0);
}

#[tokio::test]
async fn transport_failures_never_refresh() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());

	fixture.transport.break_path("/api/spaces");

	let err = client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect_err("Network failure should propagate.");

	assert!(matches!(err, Error::Transport(TransportError::Network { .. })));

	let err = client
		.execute(ApiRequest::get(api_url("/api/admin/users")))
		.await
		.expect_err("Forbidden should propagate.");

	assert!(matches!(err, Error::Transport(TransportError::Status { status: 403, .. })));
	assert_eq!(fixture.issuer.calls(), 0);
}

#[tokio::test]
async fn configured_statuses_count_as_rejections() {
	let config = SessionConfig::default().with_auth_failure_statuses([401, 403]);
	let fixture =
		Fixture::with_config(config, |t| ScriptedIssuer::new(t, IssuerScript::Succeed));
	let client = fixture.session.client(fixture.transport.clone());

	client
		.execute(ApiRequest::get(api_url("/api/admin/users")))
		.await
		.expect("A 403 should be treated as a rejection and replayed.");

	assert_eq!(fixture.issuer.calls(), 1);
}

#[tokio::test]
async fn resume_refreshes_when_nothing_is_stored() {
	let fixture = Fixture::new(|t| ScriptedIssuer::new(t, IssuerScript::Succeed));

	fixture.session.logout().await;

	assert!(!fixture.session.is_active());

	let credential = fixture.session.resume().await.expect("Resume should refresh.");

	assert_eq!(credential.token.expose(), "access-2");
	assert!(fixture.session.is_active());
	assert_eq!(fixture.issuer.calls(), 1);

	let client = fixture.session.client(fixture.transport.clone());

	client
		.execute(ApiRequest::get(api_url("/api/spaces")))
		.await
		.expect("Resumed session should authenticate requests.");

	assert_eq!(fixture.teardown.calls(), 1);
}
