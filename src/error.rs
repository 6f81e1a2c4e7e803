//! Error types shared by the token lifecycle manager, provider plumbing, stores, and config.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced by the token lifecycle APIs.
///
/// Variants fall into three groups: authentication failures the caller can only fix by
/// restarting the authorization flow ([`Error::InvalidGrant`], [`Error::Unauthenticated`]),
/// retryable failures ([`Error::Transient`], [`Error::Transport`]), and local problems
/// ([`Error::Config`], [`Error::Storage`], [`Error::InvalidClient`]).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem or malformed provider response.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider rejected the authorization code or refresh token.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or manager-supplied reason string.
		reason: String,
	},
	/// Provider rejected the client id/secret pair.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or manager-supplied reason string.
		reason: String,
	},
	/// Authorization callback carried a `state` that does not belong to the session.
	#[error("Authorization state mismatch for user `{user}`.")]
	StateMismatch {
		/// User whose authorization session was being completed.
		user: String,
	},
	/// No usable credential exists and no authorization code was supplied.
	#[error("User `{user}` is not authenticated: {reason}.")]
	Unauthenticated {
		/// User whose credential is missing or unusable.
		user: String,
		/// Why the stored state cannot produce an access token.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when retrying the same call may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// Returns `true` when the caller must send the user through authorization again.
	pub fn requires_reauthorization(&self) -> bool {
		matches!(
			self,
			Self::InvalidGrant { .. } | Self::StateMismatch { .. } | Self::Unauthenticated { .. }
		)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::provider::ProviderDescriptorError),
	/// An endpoint or redirect URL could not be handed to the OAuth client.
	#[error("The {name} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Webhook signing secret is unusable.
	#[error(transparent)]
	InvalidWebhookSecret(#[from] crate::webhook::SecretError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Configuration file could not be read.
	#[error("Failed to read configuration from {path}.")]
	Read {
		/// File that failed to load.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is malformed.")]
	Parse {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Required environment variable is absent.
	#[error("Environment variable `{key}` is required.")]
	MissingEnv {
		/// Variable name.
		key: &'static str,
	},
	/// Environment variable holds a value that cannot be interpreted.
	#[error("Environment variable `{key}` has an invalid value: {message}.")]
	InvalidEnv {
		/// Variable name.
		key: &'static str,
		/// Parsing failure summary.
		message: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_and_reauthorization_are_disjoint() {
		let transient: Error = TransientError::TokenEndpoint {
			message: "server_error".into(),
			status: Some(503),
			retry_after: None,
		}
		.into();
		let grant = Error::InvalidGrant { reason: "code already used".into() };
		let missing = Error::Unauthenticated { user: "user_1".into(), reason: "none".into() };

		assert!(transient.is_retryable());
		assert!(!transient.requires_reauthorization());
		assert!(grant.requires_reauthorization());
		assert!(!grant.is_retryable());
		assert!(missing.requires_reauthorization());
		assert!(!Error::InvalidClient { reason: "bad".into() }.is_retryable());
	}
}
