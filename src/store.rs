//! Persistence contract for per-user credentials and the built-in stores.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credential, UserId},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend holding at most one [`Credential`] per user.
///
/// The token manager serializes access per user, so implementations only need to make each
/// call atomic on its own.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches the credential stored for `user`, if any.
	fn load<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<Credential>>;

	/// Persists or replaces the credential for `user`.
	fn save<'a>(&'a self, user: &'a UserId, credential: Credential) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Credential rejected before it reached the backend.
	#[error("Rejected credential for {user}: {message}")]
	InvalidCredential {
		/// User the credential belongs to.
		user: String,
		/// Violated invariant.
		message: String,
	},
}
impl StoreError {
	/// Checks `credential` before a backend persists it.
	pub fn check(user: &UserId, credential: &Credential) -> Result<(), Self> {
		credential.validate().map_err(|e| Self::InvalidCredential {
			user: user.to_string(),
			message: e.to_string(),
		})
	}
}
