//! HTTP-shaped webhook boundary.
//!
//! [`WebhookEndpoint::handle`] never fails: every outcome is a [`WebhookResponse`].
//!
//! | Outcome | Status |
//! | --- | --- |
//! | event applied, or unknown type ignored | 200 |
//! | malformed payload, unresolved email, directory conflict | 400 |
//! | signature missing (unless bypassed) or invalid | 401 |
//! | directory backend failure | 500 |

// crates.io
use oauth2::http::StatusCode;
// self
use crate::{
	_prelude::*,
	config::WebhookConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	webhook::{
		DEFAULT_TOLERANCE, DirectoryError, SIGNATURE_HEADER, UserDirectory, WebhookEvent,
		WebhookSecret, verify_detailed,
	},
};

/// Status and plain-text body to send back to the delivering provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Plain-text body.
	pub body: String,
}
impl WebhookResponse {
	fn new(status: StatusCode, body: impl Into<String>) -> Self {
		Self { status, body: body.into() }
	}

	fn ok(body: &str) -> Self {
		Self::new(StatusCode::OK, body)
	}

	fn outcome(&self) -> &'static str {
		match self.status {
			status if status.is_success() => "accepted",
			status if status == StatusCode::UNAUTHORIZED => "unauthorized",
			status if status.is_client_error() => "rejected",
			_ => "failed",
		}
	}
}

/// What to do with deliveries that carry no signature header at all.
///
/// Deliveries whose header fails verification are rejected under every policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignaturePolicy {
	/// Reject unsigned deliveries with 401.
	#[default]
	Enforce,
	/// Accept unsigned deliveries. Never enable outside local development.
	AllowUnsignedForDevelopment,
}

/// Verifies, parses, and applies webhook deliveries.
#[derive(Clone)]
pub struct WebhookEndpoint {
	secret: WebhookSecret,
	directory: Arc<dyn UserDirectory>,
	policy: SignaturePolicy,
	tolerance: Duration,
}
impl WebhookEndpoint {
	/// Creates an enforcing endpoint; fails when `secret` cannot be decoded.
	pub fn new(secret: WebhookSecret, directory: Arc<dyn UserDirectory>) -> Result<Self> {
		secret.key_bytes().map_err(crate::error::ConfigError::from)?;

		Ok(Self {
			secret,
			directory,
			policy: SignaturePolicy::Enforce,
			tolerance: DEFAULT_TOLERANCE,
		})
	}

	/// Creates an endpoint from [`WebhookConfig`].
	pub fn from_config(config: &WebhookConfig, directory: Arc<dyn UserDirectory>) -> Result<Self> {
		let policy = if config.allow_unsigned_development {
			SignaturePolicy::AllowUnsignedForDevelopment
		} else {
			SignaturePolicy::Enforce
		};

		Ok(Self::new(config.signing_secret()?, directory)?
			.with_policy(policy)
			.with_tolerance(config.tolerance()))
	}

	/// Overrides the unsigned-delivery policy.
	pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
		if policy == SignaturePolicy::AllowUnsignedForDevelopment {
			tracing::warn!(
				header = SIGNATURE_HEADER,
				"Webhook endpoint accepts unsigned deliveries. DO NOT USE IN PRODUCTION."
			);
		}

		self.policy = policy;

		self
	}

	/// Overrides the freshness window.
	pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
		self.tolerance = tolerance.abs();

		self
	}

	/// Active unsigned-delivery policy.
	pub fn policy(&self) -> SignaturePolicy {
		self.policy
	}

	/// Handles one delivery using the current wall clock.
	///
	/// `signature` is the raw value of the [`SIGNATURE_HEADER`] header, if present.
	pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> WebhookResponse {
		self.handle_at(OffsetDateTime::now_utc(), payload, signature).await
	}

	/// Handles one delivery as if received at `now`.
	pub async fn handle_at(
		&self,
		now: OffsetDateTime,
		payload: &[u8],
		signature: Option<&str>,
	) -> WebhookResponse {
		const KIND: FlowKind = FlowKind::Webhook;

		let span = FlowSpan::new(KIND, "handle");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let response = span
			.instrument(async move {
				if let Err(rejection) = self.authenticate(now, payload, signature) {
					return rejection;
				}

				match WebhookEvent::parse(payload) {
					Ok(event) => self.dispatch(event).await,
					Err(e) => {
						tracing::warn!(error = %e, "Rejected malformed webhook payload.");

						WebhookResponse::new(StatusCode::BAD_REQUEST, e.to_string())
					},
				}
			})
			.await;

		obs::record_webhook_outcome(response.outcome());
		obs::record_flow_outcome(
			KIND,
			if response.status.is_success() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		response
	}

	fn authenticate(
		&self,
		now: OffsetDateTime,
		payload: &[u8],
		signature: Option<&str>,
	) -> Result<(), WebhookResponse> {
		match (signature.map(str::trim).filter(|value| !value.is_empty()), self.policy) {
			(Some(header), _) => verify_detailed(payload, header, &self.secret, now, self.tolerance)
				.map_err(|failure| {
					tracing::warn!(reason = %failure, "Webhook signature verification failed.");

					WebhookResponse::new(StatusCode::UNAUTHORIZED, "Invalid signature")
				}),
			(None, SignaturePolicy::AllowUnsignedForDevelopment) => {
				tracing::warn!(
					header = SIGNATURE_HEADER,
					"DEVELOPMENT MODE: skipping signature verification. DO NOT USE IN PRODUCTION."
				);

				Ok(())
			},
			(None, SignaturePolicy::Enforce) => {
				tracing::warn!(header = SIGNATURE_HEADER, "Missing webhook signature header.");

				Err(WebhookResponse::new(
					StatusCode::UNAUTHORIZED,
					"Missing required signature header",
				))
			},
		}
	}

	async fn dispatch(&self, event: WebhookEvent) -> WebhookResponse {
		tracing::info!(event_type = event.event_type(), "Processing webhook event.");

		match event {
			WebhookEvent::UserCreated(profile) => match self.directory.create_user(&profile).await {
				Ok(()) => {
					tracing::info!(user = %profile.id, "User created.");

					WebhookResponse::ok("User created successfully")
				},
				Err(e) => directory_failure("User creation", e),
			},
			WebhookEvent::UserUpdated(profile) => match self.directory.update_user(&profile).await {
				Ok(()) => {
					tracing::info!(user = %profile.id, "User updated.");

					WebhookResponse::ok("User updated successfully")
				},
				Err(e) => directory_failure("User update", e),
			},
			WebhookEvent::UserDeleted { id } => match self.directory.delete_user(&id).await {
				Ok(()) => {
					tracing::info!(user = %id, "User deleted.");

					WebhookResponse::ok("User deleted successfully")
				},
				Err(e) => directory_failure("User deletion", e),
			},
			WebhookEvent::Unhandled { event_type } => {
				tracing::info!(%event_type, "Unhandled webhook event type.");

				WebhookResponse::ok("Event received but not handled")
			},
		}
	}
}
impl Debug for WebhookEndpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WebhookEndpoint")
			.field("secret", &self.secret)
			.field("policy", &self.policy)
			.field("tolerance", &self.tolerance)
			.finish_non_exhaustive()
	}
}

fn directory_failure(action: &str, error: DirectoryError) -> WebhookResponse {
	match error {
		DirectoryError::Backend { .. } => {
			tracing::error!(error = %error, "{action} hit a directory backend failure.");

			WebhookResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
		},
		error => {
			tracing::warn!(error = %error, "{action} was rejected by the directory.");

			WebhookResponse::new(StatusCode::BAD_REQUEST, format!("{action} failed: {error}"))
		},
	}
}
