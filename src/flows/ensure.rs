//! The demand-driven entry point: hand back an access token, refreshing or bootstrapping first
//! when the stored credential cannot be used as-is.

// self
use crate::{
	_prelude::*,
	auth::{CredentialState, TokenSecret, UserId},
	flows::TokenManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

/// Input to [`TokenManager::ensure_valid_access_token`].
///
/// `code` is a one-time authorization code. It is only redeemed when the user has no
/// credential, or the stored credential cannot be refreshed; otherwise it is ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTokenRequest {
	/// User whose credential is requested.
	pub user: UserId,
	/// Authorization code obtained from the provider's redirect, if any.
	pub code: Option<String>,
}
impl AccessTokenRequest {
	/// Requests a token for a user expected to already hold a credential.
	pub fn new(user: UserId) -> Self {
		Self { user, code: None }
	}

	/// Attaches an authorization code for bootstrapping.
	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into()).filter(|code| !code.is_empty());

		self
	}
}
impl Debug for AccessTokenRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessTokenRequest")
			.field("user", &self.user)
			.field("code", &self.code.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns an access token valid for at least the refresh margin.
	///
	/// | Stored state | Behavior |
	/// | --- | --- |
	/// | valid token | returned without network I/O |
	/// | expiring, refresh token present | `refresh_token` grant, then persisted |
	/// | nothing stored, or no refresh token | `authorization_code` grant when `code` is set |
	///
	/// Failures leave the stored credential untouched. Nothing is retried here; use
	/// [`Error::is_retryable`] and [`Error::requires_reauthorization`] to decide what to do.
	pub async fn ensure_valid_access_token(
		&self,
		request: AccessTokenRequest,
	) -> Result<TokenSecret> {
		let AccessTokenRequest { user, code } = request;
		let guard = self.user_guard(&user);
		let _singleflight = guard.lock().await;
		let stored = self.store.load(&user).await?;
		let now = OffsetDateTime::now_utc();
		let state = CredentialState::evaluate(stored.as_ref(), now);

		tracing::debug!(%user, state = state.as_str(), "Evaluated stored credential.");

		match (state, stored) {
			(CredentialState::HasValidToken, Some(credential)) => credential
				.usable_access_token_at(now)
				.cloned()
				.ok_or_else(|| unauthenticated(&user, "stored access token is no longer usable")),
			(CredentialState::NeedsRefresh, Some(credential)) =>
				self.refresh_credential(&user, credential).await,
			(CredentialState::Unrefreshable, stored) => match code {
				Some(code) => self.bootstrap_credential(&user, stored, &code).await,
				None => Err(unauthenticated(
					&user,
					"stored credential has no refresh token and no authorization code was supplied",
				)),
			},
			(_, stored) => match code {
				Some(code) => self.bootstrap_credential(&user, stored, &code).await,
				None => Err(unauthenticated(
					&user,
					"no credential is stored and no authorization code was supplied",
				)),
			},
		}
	}
}

fn unauthenticated(user: &UserId, reason: &str) -> Error {
	Error::Unauthenticated { user: user.to_string(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn empty_codes_are_treated_as_absent() {
		let user = UserId::new("user_1").expect("User fixture should be valid.");
		let request = AccessTokenRequest::new(user.clone()).with_code("");

		assert_eq!(request.code, None);

		let request = AccessTokenRequest::new(user).with_code("abc");

		assert_eq!(request.code.as_deref(), Some("abc"));
		assert!(!format!("{request:?}").contains("abc"));
	}
}
