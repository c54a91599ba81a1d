//! Demonstrates a cookie-based session against HTTP login, refresh, and logout endpoints.
//!
//! A local mock server plays the API: it hands out `access-1` on login, rejects it on the first
//! data request, and accepts the `access-2` obtained from the refresh endpoint.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use bearer_guard::{
	http::{ApiRequest, ReqwestTransport},
	issuer::{HttpCredentialIssuer, HttpIssuerConfig, HttpSessionTeardown},
	reqwest::Client,
	session::Session,
};

fn envelope(access_token: &str) -> String {
	json!({
		"success": true,
		"message": "OK",
		"data": { "accessToken": access_token, "expiresIn": 900, "tokenType": "Bearer" },
		"statusCode": 200,
	})
	.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200)
				.header("content-type", "application/json")
				.header("set-cookie", "refreshToken=r-1; HttpOnly")
				.body(envelope("access-1"));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").header("cookie", "refreshToken=r-1");
			then.status(200)
				.header("content-type", "application/json")
				.header("set-cookie", "refreshToken=r-2; HttpOnly")
				.body(envelope("access-2"));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/spaces").header("authorization", "Bearer access-1");
			then.status(401).body("{\"message\":\"jwt expired\"}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/spaces").header("authorization", "Bearer access-2");
			then.status(200).header("content-type", "application/json").body("[\"general\"]");
		})
		.await;

	let logout = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout");
			then.status(200).body("{\"success\":true}");
		})
		.await;
	let client = Client::new();
	let issuer = Arc::new(HttpCredentialIssuer::new(
		client.clone(),
		HttpIssuerConfig::parse(&server.url("/api/auth/refresh"))?,
	));
	let logout_url = Url::parse(&server.url("/api/auth/logout"))?;
	let teardown =
		HttpSessionTeardown::new(client.clone(), logout_url).with_issuer(Arc::clone(&issuer));
	let session = Session::builder(issuer.clone()).teardown(Arc::new(teardown)).build();
	let issued = issuer
		.login(
			Url::parse(&server.url("/api/auth/login"))?,
			&json!({ "email": "ada@example.com", "password": "hunter2" }),
		)
		.await?;

	session.login(issued);

	let api = session.client(Arc::new(ReqwestTransport::with_client(client)));
	let response = api.execute(ApiRequest::get(Url::parse(&server.url("/api/spaces"))?)).await?;

	println!("Spaces: {}.", String::from_utf8_lossy(&response.body));
	println!("Current credential: {:?}.", session.current());

	session.logout().await;
	logout.assert_async().await;

	Ok(())
}
