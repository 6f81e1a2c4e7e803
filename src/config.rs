//! Deployment configuration: a JSON document overlaid with environment variables.
//!
//! | Variable | Field |
//! | --- | --- |
//! | `WEBHOOK_SIGNING_SECRET` | `webhook.signing_secret` |
//! | `WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT` | `webhook.allow_unsigned_development` |
//! | `WEBHOOK_TOLERANCE_SECONDS` | `webhook.tolerance_seconds` |
//! | `OAUTH_CLIENT_ID` | `provider.client_id` |
//! | `OAUTH_CLIENT_SECRET` | `provider.client_secret` |
//! | `OAUTH_REDIRECT_URI` | `provider.redirect_uri` |
//! | `OAUTH_AUTHORIZE_URL` | `provider.authorize_url` |
//! | `OAUTH_TOKEN_URL` | `provider.token_url` |
//! | `OAUTH_REQUEST_TIMEOUT_SECONDS` | `provider.request_timeout_seconds` |

// std
use std::{fs, path::Path};
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TokenSecret},
	error::ConfigError,
	flows::ClientRegistration,
	provider::{ClientAuthMethod, ProviderDescriptor},
	webhook::WebhookSecret,
};

const DEFAULT_TOLERANCE_SECONDS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Inbound webhook settings.
	pub webhook: WebhookConfig,
	/// OAuth provider settings.
	pub provider: ProviderConfig,
}
impl Config {
	/// Parses a JSON document; errors name the offending path.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(json);

		serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Parse { source })
	}

	/// Reads and parses a JSON file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let json = fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;

		Self::from_json_str(&json)
	}

	/// Defaults overlaid with the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_with(|key| std::env::var(key).ok())
	}

	/// Defaults overlaid with variables from `lookup`.
	pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = Self::default();

		config.apply_env_overrides(lookup)?;

		Ok(config)
	}

	/// Overwrites fields for every variable `lookup` returns; empty values are ignored.
	pub fn apply_env_overrides(
		&mut self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<(), ConfigError> {
		let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
		let webhook = &mut self.webhook;
		let provider = &mut self.provider;

		if let Some(value) = get("WEBHOOK_SIGNING_SECRET") {
			webhook.signing_secret = Some(WebhookSecret::new(value));
		}
		if let Some(value) = get("WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT") {
			webhook.allow_unsigned_development =
				parse_flag("WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT", &value)?;
		}
		if let Some(value) = get("WEBHOOK_TOLERANCE_SECONDS") {
			webhook.tolerance_seconds = parse_seconds("WEBHOOK_TOLERANCE_SECONDS", &value)?;
		}
		if let Some(value) = get("OAUTH_CLIENT_ID") {
			provider.client_id = Some(value);
		}
		if let Some(value) = get("OAUTH_CLIENT_SECRET") {
			provider.client_secret = Some(TokenSecret::new(value));
		}
		if let Some(value) = get("OAUTH_REDIRECT_URI") {
			provider.redirect_uri = Some(parse_url("OAUTH_REDIRECT_URI", &value)?);
		}
		if let Some(value) = get("OAUTH_AUTHORIZE_URL") {
			provider.authorize_url = Some(parse_url("OAUTH_AUTHORIZE_URL", &value)?);
		}
		if let Some(value) = get("OAUTH_TOKEN_URL") {
			provider.token_url = Some(parse_url("OAUTH_TOKEN_URL", &value)?);
		}
		if let Some(value) = get("OAUTH_REQUEST_TIMEOUT_SECONDS") {
			provider.request_timeout_seconds =
				parse_seconds("OAUTH_REQUEST_TIMEOUT_SECONDS", &value)?;
		}

		Ok(())
	}
}

/// Webhook verification settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
	/// `whsec_`-prefixed signing secret.
	pub signing_secret: Option<WebhookSecret>,
	/// Accept deliveries without a signature header. Off unless set explicitly.
	pub allow_unsigned_development: bool,
	/// Freshness window in seconds.
	pub tolerance_seconds: u64,
}
impl WebhookConfig {
	/// Configured secret, required for every endpoint.
	pub fn signing_secret(&self) -> Result<WebhookSecret, ConfigError> {
		self.signing_secret
			.clone()
			.ok_or(ConfigError::MissingEnv { key: "WEBHOOK_SIGNING_SECRET" })
	}

	/// Freshness window as a [`Duration`].
	pub fn tolerance(&self) -> Duration {
		Duration::seconds(i64::try_from(self.tolerance_seconds).unwrap_or(i64::MAX))
	}
}
impl Default for WebhookConfig {
	fn default() -> Self {
		Self {
			signing_secret: None,
			allow_unsigned_development: false,
			tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
		}
	}
}

/// Identity provider and client registration settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
	/// Descriptor identifier used in logs.
	pub id: String,
	/// OAuth client id.
	pub client_id: Option<String>,
	/// OAuth client secret.
	pub client_secret: Option<TokenSecret>,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Option<Url>,
	/// Authorization endpoint.
	pub authorize_url: Option<Url>,
	/// Token endpoint.
	pub token_url: Option<Url>,
	/// How the client authenticates at the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Scopes requested when starting authorization.
	pub scopes: Vec<String>,
	/// Per-request timeout for token endpoint calls.
	pub request_timeout_seconds: u64,
}
impl ProviderConfig {
	/// Builds and validates the provider descriptor.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let mut builder = ProviderDescriptor::builder(ProviderId::new(&self.id)?)
			.client_auth_method(self.client_auth_method)
			.scopes(self.scopes.iter().cloned());

		if let Some(url) = &self.authorize_url {
			builder = builder.authorization_endpoint(url.clone());
		}
		if let Some(url) = &self.token_url {
			builder = builder.token_endpoint(url.clone());
		}

		Ok(builder.build()?)
	}

	/// Client id, secret, and redirect URI; each is required.
	pub fn registration(&self) -> Result<ClientRegistration, ConfigError> {
		let client_id = self
			.client_id
			.clone()
			.filter(|id| !id.is_empty())
			.ok_or(ConfigError::MissingEnv { key: "OAUTH_CLIENT_ID" })?;
		let client_secret = self
			.client_secret
			.clone()
			.ok_or(ConfigError::MissingEnv { key: "OAUTH_CLIENT_SECRET" })?;
		let redirect_uri = self
			.redirect_uri
			.clone()
			.ok_or(ConfigError::MissingEnv { key: "OAUTH_REDIRECT_URI" })?;

		Ok(ClientRegistration { client_id, client_secret, redirect_uri })
	}

	/// Token endpoint request timeout.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_seconds)
	}
}
impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			id: "oauth".into(),
			client_id: None,
			client_secret: None,
			redirect_uri: None,
			authorize_url: None,
			token_url: None,
			client_auth_method: ClientAuthMethod::default(),
			scopes: Vec::new(),
			request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
		}
	}
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" => Ok(true),
		"false" | "0" => Ok(false),
		other => Err(ConfigError::InvalidEnv {
			key,
			message: format!("expected true/false/1/0, got `{other}`"),
		}),
	}
}

fn parse_seconds(key: &'static str, value: &str) -> Result<u64, ConfigError> {
	value
		.trim()
		.parse()
		.map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
			key,
			message: e.to_string(),
		})
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value.trim()).map_err(|e| ConfigError::InvalidEnv { key, message: e.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
		move |key: &str| {
			pairs.iter().find(|(name, _)| *name == key).map(|(_, value)| (*value).to_owned())
		}
	}

	#[test]
	fn defaults_keep_the_bypass_off() {
		let config = Config::from_env_with(env(&[])).expect("Empty environment should load.");

		assert!(!config.webhook.allow_unsigned_development);
		assert_eq!(config.webhook.tolerance(), Duration::minutes(5));
		assert_eq!(config.provider.request_timeout(), std::time::Duration::from_secs(10));
		assert!(matches!(
			config.webhook.signing_secret(),
			Err(ConfigError::MissingEnv { key: "WEBHOOK_SIGNING_SECRET" })
		));
	}

	#[test]
	fn environment_overrides_the_document() {
		let mut config = Config::from_json_str(
			r#"{
				"webhook": { "tolerance_seconds": 60 },
				"provider": {
					"id": "spotify",
					"client_id": "from-file",
					"authorize_url": "https://accounts.example.com/authorize",
					"scopes": ["user-read-email"]
				}
			}"#,
		)
		.expect("Configuration document should parse.");

		config
			.apply_env_overrides(env(&[
				("OAUTH_CLIENT_ID", "from-env"),
				("OAUTH_CLIENT_SECRET", "shh"),
				("OAUTH_REDIRECT_URI", "https://app.example.com/callback"),
				("OAUTH_TOKEN_URL", "https://accounts.example.com/api/token"),
				("WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT", "1"),
				("WEBHOOK_SIGNING_SECRET", ""),
			]))
			.expect("Overrides should apply.");

		let registration = config.provider.registration().expect("Registration should be complete.");
		let descriptor = config.provider.descriptor().expect("Descriptor should build.");

		assert_eq!(registration.client_id, "from-env");
		assert_eq!(registration.client_secret.expose(), "shh");
		assert_eq!(descriptor.scope_param().as_deref(), Some("user-read-email"));
		assert_eq!(config.webhook.tolerance_seconds, 60);
		assert!(config.webhook.allow_unsigned_development);
		assert!(config.webhook.signing_secret.is_none());
	}

	#[test]
	fn invalid_values_are_reported_with_their_source() {
		let err = Config::from_env_with(env(&[("WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT", "yes")]))
			.expect_err("Unrecognized flags should fail.");

		assert!(matches!(
			err,
			ConfigError::InvalidEnv { key: "WEBHOOK_ALLOW_UNSIGNED_DEVELOPMENT", .. }
		));

		let err = Config::from_json_str(r#"{ "provider": { "request_timeout_seconds": "soon" } }"#)
			.expect_err("Non-numeric timeout should fail.");

		match err {
			ConfigError::Parse { source } =>
				assert_eq!(source.path().to_string(), "provider.request_timeout_seconds"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn incomplete_provider_settings_are_rejected() {
		let config = ProviderConfig::default();

		assert!(matches!(
			config.registration(),
			Err(ConfigError::MissingEnv { key: "OAUTH_CLIENT_ID" })
		));
		assert!(matches!(config.descriptor(), Err(ConfigError::InvalidDescriptor(_))));
	}
}
