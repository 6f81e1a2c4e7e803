// std
use std::{env, fs, process, sync::Arc};
// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use webhook_token_guard::{
	auth::{Credential, TokenSecret, UserId},
	store::{CredentialStore, FileStore, MemoryStore, StoreError},
};

fn user(id: &str) -> UserId {
	UserId::new(id).expect("Failed to build user identifier for store tests.")
}

fn credential(access: &str, refresh: Option<&str>) -> Credential {
	Credential::issued(
		TokenSecret::new(access),
		refresh.map(TokenSecret::new),
		macros::datetime!(2025-11-10 12:00 UTC) + Duration::hours(1),
	)
}

async fn exercise(store: Arc<dyn CredentialStore>) {
	let alice = user("user_alice");
	let bob = user("user_bob");

	assert_eq!(store.load(&alice).await.expect("Loading an absent user should succeed."), None);

	store
		.save(&alice, credential("access-1", Some("refresh-1")))
		.await
		.expect("Saving the first credential should succeed.");
	store
		.save(&bob, credential("access-b", None))
		.await
		.expect("Saving a second user should succeed.");
	store
		.save(&alice, credential("access-2", Some("refresh-1")))
		.await
		.expect("Replacing a credential should succeed.");

	let fetched = store
		.load(&alice)
		.await
		.expect("Loading a stored credential should succeed.")
		.expect("Stored credential should remain present.");

	assert_eq!(fetched, credential("access-2", Some("refresh-1")));
	assert_eq!(
		store
			.load(&bob)
			.await
			.expect("Loading the second user should succeed.")
			.and_then(|credential| credential.refresh_token),
		None
	);
}

#[tokio::test]
async fn memory_store_keeps_one_credential_per_user() {
	let store = Arc::new(MemoryStore::default());

	exercise(store.clone()).await;

	assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn file_store_survives_reopen() {
	let path = env::temp_dir().join(format!(
		"webhook_token_guard_store_it_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	));

	exercise(Arc::new(FileStore::open(&path).expect("Failed to open file store."))).await;

	let reopened = FileStore::open(&path).expect("Failed to reopen file store.");
	let fetched = reopened
		.load(&user("user_alice"))
		.await
		.expect("Loading after reopen should succeed.");

	assert_eq!(fetched, Some(credential("access-2", Some("refresh-1"))));

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
	});
}

#[tokio::test]
async fn memory_store_rejects_access_token_without_expiry() {
	let store = MemoryStore::default();
	let alice = user("user_alice");
	let undated = Credential { expires_at: None, ..credential("access-1", Some("refresh-1")) };
	let err =
		store.save(&alice, undated).await.expect_err("Undated access token should be rejected.");

	assert!(matches!(err, StoreError::InvalidCredential { .. }));
	assert!(store.is_empty());

	let refresh_only = Credential {
		access_token: None,
		refresh_token: Some(TokenSecret::new("refresh-1")),
		expires_at: None,
	};

	store.save(&alice, refresh_only).await.expect("Refresh-only credential should be accepted.");

	assert_eq!(store.len(), 1);
}
