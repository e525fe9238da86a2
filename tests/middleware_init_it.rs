// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// self
use oauth2_middleware::{
	config::OAuthConfig,
	error::{ConfigError, Error},
	http::{BackchannelCertificateValidator, BackchannelHandler, ReqwestBackchannelHandler},
	middleware::{DefaultOAuthNotifications, OAuthMiddleware},
	protect::{AesGcmProtectionProvider, DataProtectionProvider, DataProtector},
	state::StateProperties,
};

fn config() -> OAuthConfig {
	OAuthConfig::new("abc", "secret", "https://a/auth", "https://a/token")
}

fn initialize(config: OAuthConfig) -> Result<OAuthMiddleware, Error> {
	OAuthMiddleware::initialize(
		config,
		&AesGcmProtectionProvider::new([3; 32]),
		Arc::new(DefaultOAuthNotifications),
	)
}

struct CountingProvider {
	inner: AesGcmProtectionProvider,
	created: AtomicUsize,
}
impl CountingProvider {
	fn new() -> Self {
		Self { inner: AesGcmProtectionProvider::new([3; 32]), created: AtomicUsize::new(0) }
	}
}
impl DataProtectionProvider for CountingProvider {
	fn create_protector(&self, purposes: &[&str]) -> Arc<dyn DataProtector> {
		self.created.fetch_add(1, Ordering::SeqCst);

		self.inner.create_protector(purposes)
	}
}

struct RecordingValidator {
	calls: AtomicUsize,
	verdict: bool,
}
impl RecordingValidator {
	fn new(verdict: bool) -> Self {
		Self { calls: AtomicUsize::new(0), verdict }
	}
}
impl BackchannelCertificateValidator for RecordingValidator {
	fn validate(&self, _certificate_der: &[u8], _host: &str) -> bool {
		self.calls.fetch_add(1, Ordering::SeqCst);

		self.verdict
	}
}

struct PlainHandler;
impl BackchannelHandler for PlainHandler {
	fn name(&self) -> &'static str {
		"PlainHandler"
	}

	fn client(
		&self,
		timeout: Duration,
	) -> Result<oauth2_middleware::reqwest::Client, ConfigError> {
		oauth2_middleware::reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(ConfigError::from)
	}
}

#[test]
fn each_missing_required_field_is_named() {
	let cases = [
		(OAuthConfig::new("", "secret", "https://a/auth", "https://a/token"), "ClientId"),
		(OAuthConfig::new("   ", "secret", "https://a/auth", "https://a/token"), "ClientId"),
		(OAuthConfig::new("abc", "", "https://a/auth", "https://a/token"), "ClientSecret"),
		(OAuthConfig::new("abc", "secret", "", "https://a/token"), "AuthorizationEndpoint"),
		(OAuthConfig::new("abc", "secret", "\t\n", "https://a/token"), "AuthorizationEndpoint"),
		(OAuthConfig::new("abc", "secret", "https://a/auth", ""), "TokenEndpoint"),
	];

	for (config, expected) in cases {
		let err = initialize(config).expect_err("Blank required field should fail initialization.");

		assert!(
			matches!(err, Error::Config(ConfigError::MissingField { field }) if field == expected),
			"expected a MissingField error naming {expected}, got: {err}"
		);
		assert!(err.to_string().contains(expected));
	}
}

#[test]
fn failed_validation_constructs_no_protector() {
	let provider = CountingProvider::new();
	let result = OAuthMiddleware::initialize(
		OAuthConfig::new("abc", "", "https://a/auth", "https://a/token"),
		&provider,
		Arc::new(DefaultOAuthNotifications),
	);

	assert!(result.is_err());
	assert_eq!(provider.created.load(Ordering::SeqCst), 0);
}

#[test]
fn valid_configuration_yields_the_fixed_buffer_limit() {
	for timeout in [Duration::from_secs(1), Duration::from_secs(60), Duration::from_secs(600)] {
		let middleware = initialize(config().with_backchannel_timeout(timeout))
			.expect("Valid configuration should initialize.");

		assert_eq!(middleware.backchannel().max_buffered_response_bytes(), 10 * 1024 * 1024);
		assert_eq!(middleware.backchannel().timeout(), timeout);
	}
}

#[test]
fn default_timeout_is_sixty_seconds() {
	let middleware = initialize(config()).expect("Valid configuration should initialize.");

	assert_eq!(middleware.backchannel().timeout(), Duration::from_secs(60));
	assert_eq!(middleware.backchannel().max_buffered_response_bytes(), 10_485_760);
	assert!(middleware.backchannel().certificate_validator().is_none());
}

#[test]
fn validator_with_incompatible_handler_fails_fast() {
	let err = initialize(
		config()
			.with_backchannel_http_handler(Arc::new(PlainHandler))
			.with_backchannel_certificate_validator(Arc::new(RecordingValidator::new(true))),
	)
	.expect_err("Validator + incompatible handler should fail initialization.");

	assert!(matches!(
		err,
		Error::Config(ConfigError::ValidatorUnsupported { handler: "PlainHandler" })
	));
}

#[test]
fn validator_with_compatible_handler_is_attached() {
	let validator = Arc::new(RecordingValidator::new(true));
	let middleware = initialize(
		config().with_backchannel_certificate_validator(validator.clone()),
	)
	.expect("Valid configuration should initialize.");
	let attached = middleware
		.backchannel()
		.certificate_validator()
		.expect("Transport should carry the attached validator.");

	assert!(attached.validate(b"certificate-der", "provider.example"));
	assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn caller_supplied_handler_is_used_without_a_validator() {
	let middleware = initialize(
		config()
			.with_backchannel_http_handler(Arc::new(ReqwestBackchannelHandler::default()))
			.with_backchannel_timeout(Duration::from_secs(7)),
	)
	.expect("Valid configuration should initialize.");

	assert_eq!(middleware.backchannel().timeout(), Duration::from_secs(7));
}

#[test]
fn derived_state_format_round_trips_and_rejects_garbage() {
	let middleware = initialize(config()).expect("Valid configuration should initialize.");
	let mut properties = StateProperties::new();

	properties.set_redirect_uri("https://app.example/after-login");
	properties.set("correlation_id", "c0ffee");

	let token = middleware
		.state_format()
		.protect(&properties)
		.expect("Protecting a valid bag should succeed.");

	assert_eq!(middleware.state_format().unprotect(&token), Some(properties));
	assert!(middleware.state_format().unprotect("").is_none());
	assert!(middleware.state_format().unprotect("AAAAAAAAAAAAAAAAAAAAAAAA").is_none());

	// A token sealed under a foreign master key must not unseal.
	let foreign = OAuthMiddleware::initialize(
		config(),
		&AesGcmProtectionProvider::new([4; 32]),
		Arc::new(DefaultOAuthNotifications),
	)
	.expect("Valid configuration should initialize.");
	let foreign_token = foreign
		.state_format()
		.protect(&StateProperties::new())
		.expect("Protecting a valid bag should succeed.");

	assert!(middleware.state_format().unprotect(&foreign_token).is_none());
}
