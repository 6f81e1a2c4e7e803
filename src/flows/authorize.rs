//! Authorization code flow: building the authorize redirect and redeeming the returned code.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret, UserId},
	flows::TokenManager,
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	oauth::TransportErrorMapper,
};

const STATE_LEN: usize = 32;

/// Pending authorization for one user; keep it until the provider redirects back.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationSession {
	/// User the authorization was started for.
	pub user: UserId,
	/// Fully built provider authorize URL to redirect the user agent to.
	pub authorize_url: Url,
	state: String,
}
impl AuthorizationSession {
	/// Opaque anti-CSRF value embedded in [`AuthorizationSession::authorize_url`].
	pub fn state(&self) -> &str {
		&self.state
	}

	/// Returns `true` when the callback's `state` matches, compared in constant time.
	pub fn validate_state(&self, returned: &str) -> bool {
		self.state.as_bytes().ct_eq(returned.as_bytes()).into()
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("user", &self.user)
			.field("authorize_url", &self.authorize_url.as_str())
			.finish_non_exhaustive()
	}
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts an authorization code flow for `user` with the descriptor's scopes.
	pub fn start_authorization(&self, user: UserId) -> Result<AuthorizationSession> {
		let _span = FlowSpan::new(FlowKind::AuthorizationCode, "start_authorization").entered();
		let state = rand::rng()
			.sample_iter(&Alphanumeric)
			.take(STATE_LEN)
			.map(char::from)
			.collect::<String>();
		let authorize_url = self.token_endpoint()?.authorize_url(&self.descriptor.scopes, &state);

		tracing::debug!(%user, "Built authorize URL.");

		Ok(AuthorizationSession { user, authorize_url, state })
	}

	/// Finishes a flow started by [`TokenManager::start_authorization`].
	///
	/// The code is always redeemed, even when a usable credential already exists, because the
	/// user has just granted access again. A refresh token already on file survives when the
	/// provider does not issue a new one.
	pub async fn complete_authorization(
		&self,
		session: &AuthorizationSession,
		state: &str,
		code: &str,
	) -> Result<TokenSecret> {
		let user = &session.user;

		if !session.validate_state(state) {
			tracing::warn!(%user, "Authorization callback state did not match the session.");

			return Err(Error::StateMismatch { user: user.to_string() });
		}

		let guard = self.user_guard(user);
		let _singleflight = guard.lock().await;
		let stored = self.store.load(user).await?;

		self.bootstrap_credential(user, stored, code).await
	}

	/// Redeems `code` and stores the resulting credential. Callers must hold the user's guard.
	pub(crate) async fn bootstrap_credential(
		&self,
		user: &UserId,
		stored: Option<Credential>,
		code: &str,
	) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "exchange_authorization_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = self
					.token_endpoint()?
					.exchange_authorization_code(self.strategy.as_ref(), code)
					.await?;
				let expires_at = grant.expires_at(OffsetDateTime::now_utc())?;
				let access_token = grant.access_token;
				let refresh_token = grant.refresh_token;
				let credential = match stored {
					Some(mut existing) => {
						existing.apply_refresh(access_token.clone(), refresh_token, expires_at);

						existing
					},
					None => Credential::issued(access_token.clone(), refresh_token, expires_at),
				};

				if credential.refresh_token.is_none() {
					tracing::warn!(
						%user,
						"Provider issued no refresh_token; the next expiry requires reauthorization."
					);
				}

				self.store.save(user, credential).await?;
				tracing::info!(%user, "Stored credential from authorization code exchange.");

				Ok(access_token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn session(state: &str) -> AuthorizationSession {
		AuthorizationSession {
			user: UserId::new("user_1").expect("User fixture should be valid."),
			authorize_url: Url::parse("https://accounts.example.com/authorize")
				.expect("Authorize URL fixture should parse."),
			state: state.into(),
		}
	}

	#[test]
	fn state_validation_requires_exact_match() {
		let session = session("AbCdEf0123456789AbCdEf0123456789");

		assert!(session.validate_state("AbCdEf0123456789AbCdEf0123456789"));
		assert!(!session.validate_state("abcdef0123456789AbCdEf0123456789"));
		assert!(!session.validate_state("AbCdEf0123456789"));
		assert!(!session.validate_state(""));
		assert!(!format!("{session:?}").contains("AbCdEf"));
	}
}
