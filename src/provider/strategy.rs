//! Classification of token endpoint failures.
//!
//! The manager never retries on its own, so the classification decides what the caller is
//! told: a rejected code or refresh token means the user has to authorize again, while
//! throttling and server faults are safe to retry.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that maps provider error responses into [`ProviderErrorKind`]s.
pub trait ProviderStrategy: Send + Sync {
	/// Classifies a failed token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Code or refresh token rejected; the authorization flow must restart.
	InvalidGrant,
	/// Client id/secret rejected; a deployment problem, not a user problem.
	InvalidClient,
	/// Failure is temporary and the call may be retried.
	Transient,
}

/// Primitive facts about a failed token request handed to a [`ProviderStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self { grant_type, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// Strategy following RFC 6749 §5.2 error codes, then the HTTP status.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(classify_oauth_error)
			.or_else(|| ctx.error_description.as_deref().and_then(classify_description))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn classify_oauth_error(code: &str) -> Option<ProviderErrorKind> {
	match code.to_ascii_lowercase().as_str() {
		"invalid_grant" | "invalid_request" | "access_denied" => Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" | "unsupported_grant_type" =>
			Some(ProviderErrorKind::InvalidClient),
		"server_error" | "temporarily_unavailable" | "slow_down" => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_description(description: &str) -> Option<ProviderErrorKind> {
	let lowered = description.to_ascii_lowercase();

	if lowered.contains("invalid_grant")
		|| lowered.contains("invalid authorization code")
		|| lowered.contains("invalid refresh token")
		|| lowered.contains("revoked")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") || lowered.contains("invalid client") {
		Some(ProviderErrorKind::InvalidClient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 403 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}
