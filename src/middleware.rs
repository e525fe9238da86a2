//! Middleware bootstrap and the per-request handler factory.

// std
use std::any::type_name;
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	config::{ClientSecret, OAuthConfig},
	error::ConfigError,
	http::{Backchannel, BackchannelHandler, ReqwestBackchannelHandler},
	obs::{MiddlewareSpan, Stage},
	protect::DataProtectionProvider,
	state::{ProtectedStateFormat, STATE_FORMAT_VERSION, StateDataFormat, StateProperties},
};

const STATE_NONCE_KEY: &str = "nonce";
const STATE_NONCE_LEN: usize = 32;

/// Hook set invoked at well-defined points of the authentication flow.
///
/// Every hook has a passthrough default, so integrations implement only the ones they care
/// about. The middleware stores the hook set behind `Arc<dyn OAuthNotifications>` rather than a
/// compile-time type parameter.
pub trait OAuthNotifications
where
	Self: Send + Sync,
{
	/// Lets integrations rewrite the authorization redirect before it is issued.
	fn apply_redirect(&self, authorize_url: Url) -> Url {
		authorize_url
	}
}

/// Passthrough implementation of every notification hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultOAuthNotifications;
impl OAuthNotifications for DefaultOAuthNotifications {}

/// Fully-initialized authentication middleware instance.
///
/// Owns the backchannel transport and state data format exclusively for its lifetime; both are
/// immutable after construction, so concurrent request handling needs no synchronization. All
/// configuration problems surface from [`initialize`](Self::initialize), never later.
pub struct OAuthMiddleware {
	scheme: String,
	client_id: String,
	client_secret: ClientSecret,
	authorization_endpoint: Url,
	token_endpoint: Url,
	state_format: Arc<dyn StateDataFormat>,
	backchannel: Backchannel,
	notifications: Arc<dyn OAuthNotifications>,
	span: MiddlewareSpan,
}
impl OAuthMiddleware {
	/// Validates `config` and wires up a ready-to-use middleware instance.
	///
	/// Fails fast with a [`ConfigError`] when a required field is blank, an endpoint does not
	/// parse as a URL, or a certificate validator is supplied alongside a transport handler that
	/// cannot honor it. When `config` carries no state data format, one is derived from
	/// `protection` scoped by the concrete middleware type name, the authentication scheme, and
	/// [`STATE_FORMAT_VERSION`]. No network I/O occurs here.
	pub fn initialize(
		config: OAuthConfig,
		protection: &dyn DataProtectionProvider,
		notifications: Arc<dyn OAuthNotifications>,
	) -> Result<Self> {
		config.validate()?;

		let authorization_endpoint =
			parse_endpoint("AuthorizationEndpoint", config.authorization_endpoint())?;
		let token_endpoint = parse_endpoint("TokenEndpoint", config.token_endpoint())?;
		let span = MiddlewareSpan::new(type_name::<Self>(), config.scheme());
		let guard = span.enter(Stage::Initialize);
		let state_format: Arc<dyn StateDataFormat> = match config.state_data_format() {
			Some(format) => format,
			None => {
				let protector = protection.create_protector(&[
					type_name::<Self>(),
					config.scheme(),
					STATE_FORMAT_VERSION,
				]);

				Arc::new(ProtectedStateFormat::new(protector))
			},
		};
		let handler = resolve_transport_handler(&config)?;
		let backchannel = Backchannel::new(handler.as_ref(), config.backchannel_timeout())?;

		drop(guard);

		Ok(Self {
			scheme: config.scheme().to_owned(),
			client_id: config.client_id().to_owned(),
			client_secret: config.client_secret().clone(),
			authorization_endpoint,
			token_endpoint,
			state_format,
			backchannel,
			notifications,
			span,
		})
	}

	/// Authentication scheme label.
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// OAuth 2.0 client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Redacted client secret, reserved for the token exchange performed by the handler.
	pub fn client_secret(&self) -> &ClientSecret {
		&self.client_secret
	}

	/// Parsed authorization endpoint.
	pub fn authorization_endpoint(&self) -> &Url {
		&self.authorization_endpoint
	}

	/// Parsed token endpoint.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// State data format owned by this instance.
	pub fn state_format(&self) -> &Arc<dyn StateDataFormat> {
		&self.state_format
	}

	/// Backchannel transport owned by this instance.
	pub fn backchannel(&self) -> &Backchannel {
		&self.backchannel
	}

	/// Creates the per-request handler for one pipeline invocation.
	///
	/// Handlers share the middleware's transport, state format, and notifications; creating one
	/// is a handful of `Arc` clones.
	pub fn create_handler(&self) -> RequestHandler {
		RequestHandler {
			scheme: self.scheme.clone(),
			client_id: self.client_id.clone(),
			authorization_endpoint: self.authorization_endpoint.clone(),
			state_format: self.state_format.clone(),
			backchannel: self.backchannel.clone(),
			notifications: self.notifications.clone(),
			span: self.span.clone(),
		}
	}
}
impl Debug for OAuthMiddleware {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthMiddleware")
			.field("scheme", &self.scheme)
			.field("client_id", &self.client_id)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.field("token_endpoint", &self.token_endpoint)
			.field("backchannel", &self.backchannel)
			.finish()
	}
}

/// Authorization challenge produced by [`RequestHandler::begin_challenge`].
#[derive(Clone, Debug)]
pub struct Challenge {
	/// Fully-formed authorize URL the end-user should be redirected to.
	pub authorize_url: Url,
	/// Protected state token embedded in the URL, exposed for cookie correlation.
	pub state: String,
}

/// Per-request view over one middleware instance.
#[derive(Clone)]
pub struct RequestHandler {
	scheme: String,
	client_id: String,
	authorization_endpoint: Url,
	state_format: Arc<dyn StateDataFormat>,
	backchannel: Backchannel,
	notifications: Arc<dyn OAuthNotifications>,
	span: MiddlewareSpan,
}
impl RequestHandler {
	/// Builds the authorization redirect for an unauthenticated request.
	///
	/// A fresh random nonce is folded into `properties` before sealing, so every challenge
	/// carries a distinct state token even for identical property bags.
	pub fn begin_challenge(&self, mut properties: StateProperties) -> Result<Challenge> {
		let _guard = self.span.enter(Stage::Challenge);

		properties.set(STATE_NONCE_KEY, random_string(STATE_NONCE_LEN));

		let state = self.state_format.protect(&properties)?;
		let mut authorize_url = self.authorization_endpoint.clone();

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", &self.client_id);

			if let Some(redirect_uri) = properties.redirect_uri() {
				pairs.append_pair("redirect_uri", redirect_uri);
			}
			if let Some(scope) = properties.get("scope") {
				pairs.append_pair("scope", scope);
			}

			pairs.append_pair("state", &state);
		}

		Ok(Challenge { authorize_url: self.notifications.apply_redirect(authorize_url), state })
	}

	/// Validates the `state` parameter returned by the authorization server.
	///
	/// `None` means the token is tampered, foreign, or stale; the caller rejects the request.
	pub fn validate_returned_state(&self, token: &str) -> Option<StateProperties> {
		let _guard = self.span.enter(Stage::Callback);

		self.state_format.unprotect(token)
	}

	/// Authentication scheme label.
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// Backchannel transport shared with the owning middleware.
	pub fn backchannel(&self) -> &Backchannel {
		&self.backchannel
	}
}
impl Debug for RequestHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestHandler")
			.field("scheme", &self.scheme)
			.field("client_id", &self.client_id)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.finish()
	}
}

fn resolve_transport_handler(config: &OAuthConfig) -> Result<Arc<dyn BackchannelHandler>> {
	let handler: Arc<dyn BackchannelHandler> = match config.backchannel_http_handler() {
		Some(handler) => handler,
		None => Arc::new(ReqwestBackchannelHandler::default()),
	};

	if let Some(validator) = config.backchannel_certificate_validator() {
		if !handler.supports_certificate_validation() {
			return Err(ConfigError::ValidatorUnsupported { handler: handler.name() }.into());
		}

		handler.attach_certificate_validator(validator)?;
	}

	Ok(handler)
}

fn parse_endpoint(field: &'static str, value: &str) -> Result<Url> {
	Url::parse(value.trim())
		.map_err(|source| ConfigError::InvalidEndpoint { field, source }.into())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
