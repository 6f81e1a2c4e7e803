//! Thread-safe in-memory [`CredentialStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credential, UserId},
	store::{CredentialStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<UserId, Credential>>>;

/// Keeps credentials in-process; contents are lost on drop.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of users with a stored credential.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing has been stored yet.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Synchronous snapshot of one user's credential.
	pub fn get(&self, user: &UserId) -> Option<Credential> {
		self.0.read().get(user).cloned()
	}

	/// Seeds a credential without going through the async contract.
	pub fn insert(&self, user: UserId, credential: Credential) {
		self.0.write().insert(user, credential);
	}
}
impl CredentialStore for MemoryStore {
	fn load<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(user).cloned()) })
	}

	fn save<'a>(&'a self, user: &'a UserId, credential: Credential) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			StoreError::check(user, &credential)?;
			map.write().insert(user.clone(), credential);

			Ok(())
		})
	}
}
