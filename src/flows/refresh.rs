//! Refresh token redemption with refresh-token retention and metrics.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshSnapshot};

// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret, UserId},
	flows::TokenManager,
	http::TokenHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	oauth::TransportErrorMapper,
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Redeems the credential's refresh token and persists the result.
	///
	/// Callers must hold the user's guard.
	pub(crate) async fn refresh_credential(
		&self,
		user: &UserId,
		mut credential: Credential,
	) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_credential");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async move {
				let refresh_token = credential.refresh_token.clone().ok_or_else(|| {
					Error::Unauthenticated {
						user: user.to_string(),
						reason: "stored credential has no refresh token".into(),
					}
				})?;
				let grant = self
					.token_endpoint()?
					.refresh(self.strategy.as_ref(), &refresh_token)
					.await
					.inspect_err(|e| {
						tracing::warn!(
							%user,
							error = %e,
							retryable = e.is_retryable(),
							"Refresh failed."
						);
					})?;
				let expires_at = grant.expires_at(OffsetDateTime::now_utc())?;
				let access_token = grant.access_token;
				let rotated =
					credential.apply_refresh(access_token.clone(), grant.refresh_token, expires_at);

				if !rotated {
					tracing::info!(%user, "Provider omitted refresh_token; keeping the stored one.");
				}

				self.store.save(user, credential).await?;

				Ok::<_, Error>((access_token, rotated))
			})
			.await;

		match &result {
			Ok((_, rotated)) => {
				self.refresh_metrics.record_success(*rotated);
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result.map(|(access_token, _)| access_token)
	}
}
