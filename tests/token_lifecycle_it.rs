#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use webhook_token_guard::{
	_preludet::*,
	auth::{Credential, ProviderId, TokenSecret, UserId},
	error::{Error, TransientError},
	flows::{AccessTokenRequest, ClientRegistration, RefreshSnapshot},
	provider::ProviderDescriptor,
};

const CLIENT_ID: &str = "client";
const CLIENT_SECRET: &str = "secret";
// base64("client:secret")
const BASIC_AUTH: &str = "Basic Y2xpZW50OnNlY3JldA==";

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-lifecycle").expect("Provider identifier should be valid.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse(&server.url("/authorize"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.scopes(["user-read-email", "playlist-read-private"])
		.build()
		.expect("Provider descriptor should build successfully.")
}

fn registration() -> ClientRegistration {
	ClientRegistration::new(
		CLIENT_ID,
		CLIENT_SECRET,
		Url::parse("https://app.example.com/callback").expect("Redirect URI should parse."),
	)
}

fn user() -> UserId {
	UserId::new("user_29w83sxmDNGwOuEthce5gg56FcC").expect("User fixture should be valid.")
}

fn credential_expiring_in(remaining: Duration, refresh: Option<&str>) -> Credential {
	Credential::issued(
		TokenSecret::new("access-old"),
		refresh.map(TokenSecret::new),
		OffsetDateTime::now_utc() + remaining,
	)
}

#[tokio::test]
async fn valid_token_is_returned_without_network_io() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());

	store.insert(user(), credential_expiring_in(Duration::seconds(60), Some("refresh-old")));

	let token = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect("Token with 60s left should be returned as-is.");

	assert_eq!(token.expose(), "access-old");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn refresh_without_rotation_keeps_the_stored_refresh_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").header("authorization", BASIC_AUTH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"access-new","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());

	store.insert(user(), credential_expiring_in(Duration::seconds(20), Some("refresh-old")));

	let token = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect("Refresh inside the margin should succeed.");

	mock.assert_async().await;

	let stored = store.get(&user()).expect("Credential should remain stored after refresh.");

	assert_eq!(token.expose(), "access-new");
	assert_eq!(stored.access_token.as_ref().map(TokenSecret::expose), Some("access-new"));
	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-old"));
	assert!(
		stored.expires_at.is_some_and(|at| at > OffsetDateTime::now_utc() + Duration::minutes(59))
	);
	assert_eq!(
		manager.refresh_metrics.snapshot(),
		RefreshSnapshot { attempts: 1, successes: 1, failures: 0, retained_refresh_tokens: 1 }
	);
}

#[tokio::test]
async fn rotated_refresh_token_replaces_the_stored_one() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"access-new","refresh_token":"refresh-new","token_type":"bearer","expires_in":1800}"#,
			);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());

	store.insert(user(), credential_expiring_in(-Duration::minutes(5), Some("refresh-old")));
	manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect("Refresh of an expired token should succeed.");

	mock.assert_async().await;

	let stored = store.get(&user()).expect("Credential should remain stored after refresh.");

	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-new"));
	assert_eq!(manager.refresh_metrics.snapshot().retained_refresh_tokens, 0);
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"access-new","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());

	store.insert(user(), credential_expiring_in(Duration::seconds(5), Some("refresh-old")));

	let (first, second) = tokio::join!(
		manager.ensure_valid_access_token(AccessTokenRequest::new(user())),
		manager.ensure_valid_access_token(AccessTokenRequest::new(user())),
	);

	assert_eq!(first.expect("First caller should get a token.").expose(), "access-new");
	assert_eq!(second.expect("Second caller should get a token.").expose(), "access-new");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn code_bootstraps_a_missing_credential() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").header("authorization", BASIC_AUTH);
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"access-first","refresh_token":"refresh-first","token_type":"Bearer","expires_in":3600}"#,
			);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());
	let token = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()).with_code("auth-code"))
		.await
		.expect("Authorization code exchange should succeed.");

	mock.assert_async().await;

	let stored = store.get(&user()).expect("Bootstrapped credential should be stored.");

	assert_eq!(token.expose(), "access-first");
	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-first"));
}

#[tokio::test]
async fn missing_credential_without_code_requires_authorization() {
	let server = MockServer::start_async().await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());
	let err = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect_err("No credential and no code should fail.");

	assert!(matches!(err, Error::Unauthenticated { .. }));
	assert!(err.requires_reauthorization());
	assert!(store.is_empty());

	store.insert(user(), credential_expiring_in(-Duration::minutes(1), None));

	let err = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect_err("Expired credential without refresh token should fail.");

	assert!(matches!(err, Error::Unauthenticated { .. }));
}

#[tokio::test]
async fn invalid_grant_requires_reauthorization_and_keeps_the_store() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
			);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());
	let seeded = credential_expiring_in(Duration::seconds(10), Some("refresh-revoked"));

	store.insert(user(), seeded.clone());

	let err = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect_err("Revoked refresh token should fail.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { .. }));
	assert!(err.requires_reauthorization());
	assert!(!err.is_retryable());
	assert_eq!(store.get(&user()), Some(seeded));
	assert_eq!(manager.refresh_metrics.snapshot().failures, 1);
}

#[tokio::test]
async fn unavailable_provider_is_retryable_and_keeps_the_store() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503).header("retry-after", "7").body("upstream unavailable");
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());
	let seeded = credential_expiring_in(Duration::seconds(10), Some("refresh-old"));

	store.insert(user(), seeded.clone());

	let err = manager
		.ensure_valid_access_token(AccessTokenRequest::new(user()))
		.await
		.expect_err("Provider outage should fail.");

	mock.assert_async().await;

	assert!(err.is_retryable());
	assert!(!err.requires_reauthorization());
	assert!(matches!(
		err,
		Error::Transient(TransientError::TokenEndpoint { status: Some(503), retry_after, .. })
			if retry_after == Some(Duration::seconds(7))
	));
	assert_eq!(store.get(&user()), Some(seeded));
}

#[tokio::test]
async fn authorization_round_trip_validates_state() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"access-first","refresh_token":"refresh-first","token_type":"Bearer","expires_in":3600}"#,
			);
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(build_descriptor(&server), registration());
	let session = manager.start_authorization(user()).expect("Authorization should start.");
	let query = session.authorize_url.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert_eq!(session.authorize_url.path(), "/authorize");
	assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
	assert_eq!(query.get("client_id").map(String::as_str), Some(CLIENT_ID));
	assert_eq!(
		query.get("redirect_uri").map(String::as_str),
		Some("https://app.example.com/callback")
	);
	assert_eq!(
		query.get("scope").map(String::as_str),
		Some("user-read-email playlist-read-private")
	);
	assert_eq!(query.get("state").map(String::as_str), Some(session.state()));

	let err = manager
		.complete_authorization(&session, "forged-state", "auth-code")
		.await
		.expect_err("Mismatched state should be rejected.");

	assert!(matches!(err, Error::StateMismatch { .. }));
	assert!(store.is_empty());

	let token = manager
		.complete_authorization(&session, session.state(), "auth-code")
		.await
		.expect("Matching state should redeem the code.");

	mock.assert_async().await;

	assert_eq!(token.expose(), "access-first");
	assert!(store.get(&user()).is_some());
}
