//! Token endpoint client built on the `oauth2` crate.
//!
//! [`TokenEndpoint`] performs the two grants the manager needs (`authorization_code` and
//! `refresh_token`) and turns provider failures into the crate's [`Error`] taxonomy through a
//! [`ProviderStrategy`] and a [`TransportErrorMapper`].

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
	EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError, TransportError},
	http::{ExchangeMetadata, ExchangeMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ExchangeMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
///
/// Timeouts become [`TransientError`]s; connection failures become [`TransportError`]s.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		meta: Option<&ExchangeMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown failure"),
		}
	}
}

/// Tokens issued by a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Newly issued access token.
	pub access_token: TokenSecret,
	/// Refresh token, when the provider issued or rotated one.
	pub refresh_token: Option<TokenSecret>,
	/// Relative lifetime reported through `expires_in`.
	pub expires_in: Duration,
}
impl TokenGrant {
	/// Absolute expiry for a grant received at `issued_at`.
	///
	/// Fails when the lifetime pushes the expiry past the representable date range.
	pub fn expires_at(&self, issued_at: OffsetDateTime) -> Result<OffsetDateTime> {
		Ok(issued_at.checked_add(self.expires_in).ok_or(ConfigError::ExpiresInOutOfRange)?)
	}

	fn from_response(response: BasicTokenResponse) -> Result<Self> {
		let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
		let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		Ok(Self {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token: response
				.refresh_token()
				.map(|token| TokenSecret::new(token.secret().to_owned())),
			expires_in: Duration::seconds(expires_in),
		})
	}
}

/// Confidential client bound to one provider's token endpoint.
pub(crate) struct TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: &TokenSecret,
		redirect_uri: &Url,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "authorization", source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "token", source })?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "redirect", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Builds the provider authorize URL carrying `response_type=code`, the client id, the
	/// redirect URI, `scopes`, and `state`.
	pub(crate) fn authorize_url(&self, scopes: &[String], state: &str) -> Url {
		let (url, _) = self
			.oauth_client
			.authorize_url(|| CsrfToken::new(state.to_owned()))
			.add_scopes(scopes.iter().cloned().map(Scope::new))
			.url();

		url
	}

	/// Exchanges a one-time authorization code; `redirect_uri` must match the one used to
	/// obtain it.
	pub(crate) async fn exchange_authorization_code(
		&self,
		strategy: &dyn ProviderStrategy,
		code: &str,
	) -> Result<TokenGrant> {
		let meta = ExchangeMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::AuthorizationCode,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

		TokenGrant::from_response(response)
	}

	/// Redeems a refresh token for a new access token.
	pub(crate) async fn refresh(
		&self,
		strategy: &dyn ProviderStrategy,
		refresh_token: &TokenSecret,
	) -> Result<TokenGrant> {
		let meta = ExchangeMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::RefreshToken,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

		TokenGrant::from_response(response)
	}
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ExchangeMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			map_parse_error(strategy, grant, meta_ref, error),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ExchangeMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_string(),
	};

	classify(strategy.classify_token_error(&ctx), message, meta)
}

// Non-2xx bodies that are not OAuth error documents (HTML from a gateway, empty 503s) land here.
fn map_parse_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<&ExchangeMetadata>,
	source: serde_path_to_error::Error<serde_json::Error>,
) -> Error {
	match meta_status(meta) {
		Some(status) if !(200..300).contains(&status) => {
			let ctx = ProviderErrorContext::new(grant).with_http_status(status);

			classify(
				strategy.classify_token_error(&ctx),
				format!("token endpoint responded with HTTP {status}"),
				meta,
			)
		},
		status => TransientError::TokenResponseParse { source, status }.into(),
	}
}

fn classify(kind: ProviderErrorKind, message: String, meta: Option<&ExchangeMetadata>) -> Error {
	match kind {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ExchangeMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ExchangeMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ExchangeMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ExchangeMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{
		AccessToken, EmptyExtraTokenFields, StandardTokenResponse, basic::BasicTokenType,
	};
	use time::macros;
	// self
	use super::*;
	use crate::provider::DefaultProviderStrategy;

	fn response(expires_in: Option<u64>, refresh: Option<&str>) -> BasicTokenResponse {
		let mut response = StandardTokenResponse::new(
			AccessToken::new("access".into()),
			BasicTokenType::Bearer,
			EmptyExtraTokenFields {},
		);

		response.set_expires_in(expires_in.map(std::time::Duration::from_secs).as_ref());
		response.set_refresh_token(refresh.map(|value| RefreshToken::new(value.into())));

		response
	}

	#[test]
	fn grant_requires_positive_expiry() {
		let grant = TokenGrant::from_response(response(Some(3600), None))
			.expect("Response with expires_in should convert.");
		let issued_at = macros::datetime!(2025-03-01 12:00 UTC);

		assert_eq!(
			grant.expires_at(issued_at).expect("One hour expiry should be representable."),
			issued_at + Duration::hours(1)
		);
		assert!(grant.refresh_token.is_none());
		assert!(matches!(
			TokenGrant::from_response(response(None, Some("refresh"))),
			Err(Error::Config(ConfigError::MissingExpiresIn))
		));
		assert!(matches!(
			TokenGrant::from_response(response(Some(0), None)),
			Err(Error::Config(ConfigError::NonPositiveExpiresIn))
		));
	}

	#[test]
	fn oversized_expiry_is_rejected_instead_of_overflowing() {
		let grant = TokenGrant::from_response(response(Some(9_000_000_000_000_000_000), None))
			.expect("Lifetime within i64 seconds should convert.");

		assert!(matches!(
			grant.expires_at(OffsetDateTime::now_utc()),
			Err(Error::Config(ConfigError::ExpiresInOutOfRange))
		));
	}

	#[test]
	fn server_errors_follow_strategy_classification() {
		let meta = ExchangeMetadata { status: Some(503), retry_after: Some(Duration::seconds(7)) };
		let error = map_server_response_error(
			&DefaultProviderStrategy,
			GrantType::RefreshToken,
			BasicErrorResponse::new(
				oauth2::basic::BasicErrorResponseType::Extension("temporarily_unavailable".into()),
				None,
				None,
			),
			Some(&meta),
		);

		assert!(matches!(
			error,
			Error::Transient(TransientError::TokenEndpoint {
				status: Some(503),
				retry_after: Some(retry_after),
				..
			}) if retry_after == Duration::seconds(7)
		));

		let error = map_server_response_error(
			&DefaultProviderStrategy,
			GrantType::AuthorizationCode,
			BasicErrorResponse::new(
				oauth2::basic::BasicErrorResponseType::InvalidGrant,
				Some("Invalid authorization code".into()),
				None,
			),
			None,
		);

		assert!(error.requires_reauthorization());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_clients_for_both_auth_methods() {
		// self
		use crate::{auth::ProviderId, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

		for method in [ClientAuthMethod::ClientSecretBasic, ClientAuthMethod::ClientSecretPost] {
			let descriptor = ProviderDescriptor::builder(
				ProviderId::new("spotify").expect("Provider id should be valid."),
			)
			.authorization_endpoint(
				Url::parse("https://accounts.example.com/authorize")
					.expect("Authorization URL should parse."),
			)
			.token_endpoint(
				Url::parse("https://accounts.example.com/api/token").expect("Token URL should parse."),
			)
			.client_auth_method(method)
			.build()
			.expect("Descriptor should build.");
			let redirect =
				Url::parse("https://app.example.com/callback").expect("Redirect URL should parse.");
			let endpoint = <TokenEndpoint<ReqwestHttpClient, ReqwestTransportErrorMapper>>::from_descriptor(
				&descriptor,
				"client",
				&TokenSecret::new("secret"),
				&redirect,
				Arc::new(ReqwestHttpClient::default()),
				Arc::new(ReqwestTransportErrorMapper),
			);

			assert!(endpoint.is_ok(), "{method:?}");
		}
	}
}
