// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::Duration;
// self
use oauth2_middleware::{
	config::OAuthConfig,
	error::Result,
	middleware::{DefaultOAuthNotifications, OAuthMiddleware},
	protect::{AesGcmProtectionProvider, DataProtectionProvider},
	state::{ProtectedStateFormat, STATE_FORMAT_VERSION, StateDataFormat, StateProperties},
};

fn provider() -> AesGcmProtectionProvider {
	AesGcmProtectionProvider::new([11; 32])
}

fn config() -> OAuthConfig {
	OAuthConfig::new("client-id", "client-secret", "https://a/auth", "https://a/token")
}

#[test]
fn caller_supplied_format_takes_precedence_over_derivation() {
	struct CountingFormat {
		inner: ProtectedStateFormat,
		protected: AtomicUsize,
	}
	impl StateDataFormat for CountingFormat {
		fn protect(&self, properties: &StateProperties) -> Result<String> {
			self.protected.fetch_add(1, Ordering::SeqCst);

			self.inner.protect(properties)
		}

		fn unprotect(&self, token: &str) -> Option<StateProperties> {
			self.inner.unprotect(token)
		}
	}

	let format = Arc::new(CountingFormat {
		inner: ProtectedStateFormat::new(
			provider().create_protector(&["custom", STATE_FORMAT_VERSION]),
		),
		protected: AtomicUsize::new(0),
	});
	let middleware = OAuthMiddleware::initialize(
		config().with_state_data_format(format.clone()),
		&provider(),
		Arc::new(DefaultOAuthNotifications),
	)
	.expect("Valid configuration should initialize.");

	middleware
		.state_format()
		.protect(&StateProperties::new())
		.expect("Protecting through the supplied format should succeed.");

	assert_eq!(format.protected.load(Ordering::SeqCst), 1);
}

#[test]
fn distinct_middleware_instances_do_not_share_state_tokens() {
	// Same master key, different schemes: the purpose chain isolates the derived protectors.
	let first = OAuthMiddleware::initialize(
		config().with_scheme("sign-in"),
		&provider(),
		Arc::new(DefaultOAuthNotifications),
	)
	.expect("Valid configuration should initialize.");
	let second = OAuthMiddleware::initialize(
		config().with_scheme("link-account"),
		&provider(),
		Arc::new(DefaultOAuthNotifications),
	)
	.expect("Valid configuration should initialize.");
	let token = first
		.state_format()
		.protect(&StateProperties::new())
		.expect("Protecting a valid bag should succeed.");

	assert!(first.state_format().unprotect(&token).is_some());
	assert!(second.state_format().unprotect(&token).is_none());
}

#[test]
fn expiring_format_rejects_stale_tokens_without_erroring() {
	let format = ProtectedStateFormat::new(
		provider().create_protector(&["expiry", STATE_FORMAT_VERSION]),
	)
	.with_max_age(Duration::seconds(-1));
	let token = format
		.protect(&StateProperties::new())
		.expect("Protecting a valid bag should succeed.");

	// A negative max age makes every token stale the moment it is issued.
	assert!(format.unprotect(&token).is_none());
}

#[test]
fn unprotect_never_panics_on_hostile_input() {
	let format = ProtectedStateFormat::new(
		provider().create_protector(&["hostile", STATE_FORMAT_VERSION]),
	);

	for token in ["", " ", "!", "====", "AA", "\u{0}\u{0}", &"A".repeat(64 * 1024)] {
		assert!(format.unprotect(token).is_none());
	}
}
