//! Client configuration consumed by the middleware bootstrap.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{BackchannelCertificateValidator, BackchannelHandler},
	state::StateDataFormat,
};

/// Default authentication scheme label applied when callers do not override it.
pub const DEFAULT_SCHEME: &str = "oauth2";
/// Default backchannel request timeout.
pub const DEFAULT_BACKCHANNEL_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Redacted client secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);
impl ClientSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for ClientSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClientSecret").field(&"<redacted>").finish()
	}
}
impl Display for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// OAuth 2.0 client settings accepted by the middleware bootstrap.
///
/// The four required fields (`ClientId`, `ClientSecret`, `AuthorizationEndpoint`,
/// `TokenEndpoint`) are validated at construction time by
/// [`OAuthMiddleware::initialize`](crate::middleware::OAuthMiddleware::initialize); a blank field
/// is a fatal configuration error, never a deferred one.
#[derive(Clone)]
pub struct OAuthConfig {
	client_id: String,
	client_secret: ClientSecret,
	authorization_endpoint: String,
	token_endpoint: String,
	scheme: String,
	backchannel_timeout: StdDuration,
	backchannel_http_handler: Option<Arc<dyn BackchannelHandler>>,
	backchannel_certificate_validator: Option<Arc<dyn BackchannelCertificateValidator>>,
	state_data_format: Option<Arc<dyn StateDataFormat>>,
}
impl OAuthConfig {
	/// Creates a configuration with the crate defaults for every optional setting.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		authorization_endpoint: impl Into<String>,
		token_endpoint: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: ClientSecret::new(client_secret),
			authorization_endpoint: authorization_endpoint.into(),
			token_endpoint: token_endpoint.into(),
			scheme: DEFAULT_SCHEME.into(),
			backchannel_timeout: DEFAULT_BACKCHANNEL_TIMEOUT,
			backchannel_http_handler: None,
			backchannel_certificate_validator: None,
			state_data_format: None,
		}
	}

	/// Sets or replaces the authentication scheme label.
	pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.scheme = scheme.into();

		self
	}

	/// Sets or replaces the backchannel request timeout.
	pub fn with_backchannel_timeout(mut self, timeout: StdDuration) -> Self {
		self.backchannel_timeout = timeout;

		self
	}

	/// Supplies a custom transport handler used instead of the crate default.
	pub fn with_backchannel_http_handler(mut self, handler: Arc<dyn BackchannelHandler>) -> Self {
		self.backchannel_http_handler = Some(handler);

		self
	}

	/// Supplies a server-certificate validation policy for the backchannel.
	pub fn with_backchannel_certificate_validator(
		mut self,
		validator: Arc<dyn BackchannelCertificateValidator>,
	) -> Self {
		self.backchannel_certificate_validator = Some(validator);

		self
	}

	/// Supplies a pre-built state data format instead of deriving one.
	pub fn with_state_data_format(mut self, format: Arc<dyn StateDataFormat>) -> Self {
		self.state_data_format = Some(format);

		self
	}

	/// OAuth 2.0 client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Redacted client secret.
	pub fn client_secret(&self) -> &ClientSecret {
		&self.client_secret
	}

	/// Authorization endpoint as supplied by the caller.
	pub fn authorization_endpoint(&self) -> &str {
		&self.authorization_endpoint
	}

	/// Token endpoint as supplied by the caller.
	pub fn token_endpoint(&self) -> &str {
		&self.token_endpoint
	}

	/// Authentication scheme label scoping the derived state protector.
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// Backchannel request timeout.
	pub fn backchannel_timeout(&self) -> StdDuration {
		self.backchannel_timeout
	}

	/// Caller-supplied transport handler, if any.
	pub fn backchannel_http_handler(&self) -> Option<Arc<dyn BackchannelHandler>> {
		self.backchannel_http_handler.clone()
	}

	/// Caller-supplied certificate validation policy, if any.
	pub fn backchannel_certificate_validator(
		&self,
	) -> Option<Arc<dyn BackchannelCertificateValidator>> {
		self.backchannel_certificate_validator.clone()
	}

	/// Caller-supplied state data format, if any.
	pub fn state_data_format(&self) -> Option<Arc<dyn StateDataFormat>> {
		self.state_data_format.clone()
	}

	/// Checks that every required field is non-empty after trimming whitespace.
	///
	/// The returned error names exactly the first offending field.
	pub fn validate(&self) -> Result<(), ConfigError> {
		required("ClientId", &self.client_id)?;
		required("ClientSecret", self.client_secret.expose())?;
		required("AuthorizationEndpoint", &self.authorization_endpoint)?;
		required("TokenEndpoint", &self.token_endpoint)?;

		Ok(())
	}
}
impl Debug for OAuthConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.field("token_endpoint", &self.token_endpoint)
			.field("scheme", &self.scheme)
			.field("backchannel_timeout", &self.backchannel_timeout)
			.field("backchannel_http_handler_set", &self.backchannel_http_handler.is_some())
			.field(
				"backchannel_certificate_validator_set",
				&self.backchannel_certificate_validator.is_some(),
			)
			.field("state_data_format_set", &self.state_data_format.is_some())
			.finish()
	}
}

fn required(field: &'static str, value: &str) -> Result<(), ConfigError> {
	if value.trim().is_empty() { Err(ConfigError::MissingField { field }) } else { Ok(()) }
}
