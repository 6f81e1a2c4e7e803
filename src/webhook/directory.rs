//! Account persistence the webhook endpoint writes verified events into.

// self
use crate::{_prelude::*, webhook::UserProfile};

/// Boxed future returned by [`UserDirectory`] operations.
pub type DirectoryFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + 'a + Send>>;

/// Local user records mirrored from the identity provider.
pub trait UserDirectory
where
	Self: Send + Sync,
{
	/// Inserts a new user; rejects duplicate ids, emails, and usernames.
	fn create_user<'a>(&'a self, profile: &'a UserProfile) -> DirectoryFuture<'a, ()>;

	/// Replaces an existing user's email and username.
	fn update_user<'a>(&'a self, profile: &'a UserProfile) -> DirectoryFuture<'a, ()>;

	/// Removes a user by provider id.
	fn delete_user<'a>(&'a self, id: &'a str) -> DirectoryFuture<'a, ()>;
}

/// Failures reported by a [`UserDirectory`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DirectoryError {
	/// A uniqueness constraint was violated.
	#[error("{message}")]
	Conflict {
		/// Which constraint failed.
		message: String,
	},
	/// The referenced user does not exist.
	#[error("User with ID {id} not found")]
	NotFound {
		/// Missing user id.
		id: String,
	},
	/// Storage engine failure unrelated to the event's content.
	#[error("Directory backend failure: {message}")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// In-process [`UserDirectory`] keyed by provider id.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory(Arc<RwLock<BTreeMap<String, UserProfile>>>);
impl MemoryDirectory {
	/// Returns the stored profile for `id`.
	pub fn get(&self, id: &str) -> Option<UserProfile> {
		self.0.read().get(id).cloned()
	}

	/// Number of stored users.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no users are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn ensure_unique(
		users: &BTreeMap<String, UserProfile>,
		profile: &UserProfile,
	) -> Result<(), DirectoryError> {
		let others = users.values().filter(|user| user.id != profile.id);

		for other in others {
			if other.email == profile.email {
				return Err(DirectoryError::Conflict {
					message: format!("Email {} is already registered", profile.email),
				});
			}
			if profile.username.is_some() && other.username == profile.username {
				return Err(DirectoryError::Conflict {
					message: format!(
						"Username {} is already taken",
						profile.username.as_deref().unwrap_or_default()
					),
				});
			}
		}

		Ok(())
	}
}
impl UserDirectory for MemoryDirectory {
	fn create_user<'a>(&'a self, profile: &'a UserProfile) -> DirectoryFuture<'a, ()> {
		Box::pin(async move {
			let mut users = self.0.write();

			if users.contains_key(&profile.id) {
				return Err(DirectoryError::Conflict {
					message: format!("User with ID {} already exists", profile.id),
				});
			}

			Self::ensure_unique(&users, profile)?;
			users.insert(profile.id.clone(), profile.clone());

			Ok(())
		})
	}

	fn update_user<'a>(&'a self, profile: &'a UserProfile) -> DirectoryFuture<'a, ()> {
		Box::pin(async move {
			let mut users = self.0.write();

			if !users.contains_key(&profile.id) {
				return Err(DirectoryError::NotFound { id: profile.id.clone() });
			}

			Self::ensure_unique(&users, profile)?;
			users.insert(profile.id.clone(), profile.clone());

			Ok(())
		})
	}

	fn delete_user<'a>(&'a self, id: &'a str) -> DirectoryFuture<'a, ()> {
		Box::pin(async move {
			self.0
				.write()
				.remove(id)
				.map(|_| ())
				.ok_or_else(|| DirectoryError::NotFound { id: id.to_owned() })
		})
	}
}
