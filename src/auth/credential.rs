//! Per-user access/refresh token pair and the rule that decides when it must be refreshed.

// self
use crate::_prelude::*;

/// Safety margin subtracted from `expires_at` so a token never expires mid-request.
pub const REFRESH_MARGIN: Duration = Duration::seconds(30);

/// Redacted token wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Errors raised when a credential violates its invariants.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// An access token was present without a known expiry.
	#[error("Credential carries an access token without an expiry.")]
	AccessTokenWithoutExpiry,
}

/// Lifecycle state of a user's credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialState {
	/// Nothing is stored for the user; an authorization code exchange is required.
	NoCredential,
	/// The stored access token is usable beyond the safety margin.
	HasValidToken,
	/// The access token is missing, undated, or inside the margin, and a refresh token exists.
	NeedsRefresh,
	/// A refresh is required but no refresh token was ever stored.
	Unrefreshable,
}
impl CredentialState {
	/// Classifies an optional stored credential at `now`.
	pub fn evaluate(credential: Option<&Credential>, now: OffsetDateTime) -> Self {
		match credential {
			None => Self::NoCredential,
			Some(credential) if !credential.needs_refresh_at(now) => Self::HasValidToken,
			Some(credential) if credential.refresh_token.is_some() => Self::NeedsRefresh,
			Some(_) => Self::Unrefreshable,
		}
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NoCredential => "no_credential",
			Self::HasValidToken => "has_valid_token",
			Self::NeedsRefresh => "needs_refresh",
			Self::Unrefreshable => "unrefreshable",
		}
	}
}
impl Display for CredentialState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Stored OAuth credential for one user.
///
/// Every field is nullable because stores may hold partially populated rows, but any
/// credential produced by this crate keeps `expires_at` set whenever `access_token` is.
/// The refresh token is only ever replaced, never cleared.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Short-lived bearer token presented to the provider's APIs.
	pub access_token: Option<TokenSecret>,
	/// Long-lived token exchanged for new access tokens.
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry of `access_token`.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Builds the first credential issued by an authorization code exchange.
	pub fn issued(
		access_token: TokenSecret,
		refresh_token: Option<TokenSecret>,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { access_token: Some(access_token), refresh_token, expires_at: Some(expires_at) }
	}

	/// Checks the access-token-implies-expiry invariant.
	pub fn validate(&self) -> Result<(), CredentialError> {
		if self.access_token.is_some() && self.expires_at.is_none() {
			return Err(CredentialError::AccessTokenWithoutExpiry);
		}

		Ok(())
	}

	/// Returns `true` when the access token must be refreshed before use at `now`.
	pub fn needs_refresh_at(&self, now: OffsetDateTime) -> bool {
		match (&self.access_token, self.expires_at) {
			(Some(_), Some(expires_at)) => now > expires_at - REFRESH_MARGIN,
			_ => true,
		}
	}

	/// Returns the access token when it can be used at `now` without refreshing.
	pub fn usable_access_token_at(&self, now: OffsetDateTime) -> Option<&TokenSecret> {
		if self.needs_refresh_at(now) { None } else { self.access_token.as_ref() }
	}

	/// Applies a refresh response in place.
	///
	/// Returns `true` when the provider rotated the refresh token. Without a replacement the
	/// existing refresh token is retained unchanged.
	pub fn apply_refresh(
		&mut self,
		access_token: TokenSecret,
		refresh_token: Option<TokenSecret>,
		expires_at: OffsetDateTime,
	) -> bool {
		self.access_token = Some(access_token);
		self.expires_at = Some(expires_at);

		match refresh_token {
			Some(rotated) => {
				self.refresh_token = Some(rotated);

				true
			},
			None => false,
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
