//! Per-user token lifecycle orchestration.
//!
//! [`TokenManager`] answers one question for callers about to hit the provider's API: "give me
//! an access token for this user that will not expire mid-request". Work is lazy and
//! demand-driven. Calls for the same user are serialized through a per-user async guard, so two
//! concurrent requests never redeem the same refresh token twice. Different users never wait on
//! each other.

pub mod authorize;
pub mod ensure;
pub mod refresh;

pub use authorize::*;
pub use ensure::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId},
	http::TokenHttpClient,
	oauth::{TokenEndpoint, TransportErrorMapper},
	provider::{ProviderDescriptor, ProviderStrategy},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	config::ProviderConfig,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::DefaultProviderStrategy,
};

#[cfg(feature = "reqwest")]
/// Manager specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Confidential client registration presented to the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientRegistration {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret used for Basic or form-body authentication.
	pub client_secret: TokenSecret,
	/// Redirect URI registered with the provider; sent with every code exchange.
	pub redirect_uri: Url,
}
impl ClientRegistration {
	/// Bundles the client id, secret, and redirect URI.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		redirect_uri: Url,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			redirect_uri,
		}
	}
}
impl Debug for ClientRegistration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientRegistration")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}

/// Owns every collaborator the token lifecycle needs for a single provider.
#[derive(Clone)]
pub struct TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Credential persistence.
	pub store: Arc<dyn CredentialStore>,
	/// Provider descriptor that defines endpoints, client auth, and scopes.
	pub descriptor: ProviderDescriptor,
	/// Strategy classifying token endpoint failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Client id, secret, and redirect URI.
	pub registration: ClientRegistration,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	user_guards: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		registration: ClientRegistration,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			registration,
			refresh_metrics: Default::default(),
			user_guards: Default::default(),
		}
	}

	fn user_guard(&self, user: &UserId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.user_guards.lock();

		// Entries only the map still references belong to finished flows.
		guards.retain(|_, guard| Arc::strong_count(guard) > 1);
		guards.entry(user.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn token_endpoint(&self) -> Result<TokenEndpoint<C, M>> {
		TokenEndpoint::from_descriptor(
			&self.descriptor,
			&self.registration.client_id,
			&self.registration.client_secret,
			&self.registration.redirect_uri,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest transport and the default error strategy.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		registration: ClientRegistration,
	) -> Self {
		Self::with_http_client(
			store,
			descriptor,
			Arc::new(DefaultProviderStrategy),
			registration,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}

	/// Builds a manager from [`ProviderConfig`], applying its request timeout.
	pub fn from_config(store: Arc<dyn CredentialStore>, config: &ProviderConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout())?;

		Ok(Self::with_http_client(
			store,
			config.descriptor()?,
			Arc::new(DefaultProviderStrategy),
			config.registration()?,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("descriptor", &self.descriptor)
			.field("registration", &self.registration)
			.finish()
	}
}
