//! State parameter serialization and the protector-backed data format.
//!
//! The state parameter round-trips through the external authorization server, so everything in
//! it must be tamper-evident and confidential. [`ProtectedStateFormat`] seals a
//! [`StateProperties`] bag with a [`DataProtector`] and encodes the result as unpadded
//! base64url, producing an opaque token suitable for a query-string value.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	error::StateError,
	obs::{self, StateOutcome},
	protect::DataProtector,
};

/// Version label for the sealed state layout, used as the final protector purpose.
pub const STATE_FORMAT_VERSION: &str = "v1";

/// Well-known properties key carrying the post-login return URL.
pub const REDIRECT_URI_KEY: &str = "redirect_uri";

/// Generic key-value payload carried inside the state parameter.
///
/// The bag records when it was issued so formats can enforce expiry; keys are kept ordered so
/// serialization is deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProperties {
	#[serde(with = "time::serde::timestamp")]
	issued_at: OffsetDateTime,
	items: BTreeMap<String, String>,
}
impl StateProperties {
	/// Creates an empty bag stamped with the current time.
	pub fn new() -> Self {
		let now = OffsetDateTime::now_utc();

		// Timestamps are serialized at second precision; truncate up front so a bag compares
		// equal to its round-tripped self.
		Self { issued_at: now.replace_nanosecond(0).unwrap_or(now), items: BTreeMap::new() }
	}

	/// Moment the bag was created, at second precision.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Stores a key-value entry, replacing any previous value.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.items.insert(key.into(), value.into());
	}

	/// Looks up an entry by key.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.items.get(key).map(String::as_str)
	}

	/// Stores the post-login return URL under [`REDIRECT_URI_KEY`].
	pub fn set_redirect_uri(&mut self, redirect_uri: impl Into<String>) {
		self.set(REDIRECT_URI_KEY, redirect_uri);
	}

	/// Post-login return URL, if one was recorded.
	pub fn redirect_uri(&self) -> Option<&str> {
		self.get(REDIRECT_URI_KEY)
	}

	/// Iterates over the entries in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.items.iter().map(|(key, value)| (key.as_str(), value.as_str()))
	}
}
impl Default for StateProperties {
	fn default() -> Self {
		Self::new()
	}
}

/// Serializes a properties bag into an opaque token and back.
///
/// `unprotect` is the non-throwing half of the contract: any malformed, tampered, foreign, or
/// stale token yields `None`, which callers treat as "invalid state, reject the request."
pub trait StateDataFormat
where
	Self: Send + Sync,
{
	/// Seals `properties` into an opaque, URL-safe token.
	fn protect(&self, properties: &StateProperties) -> Result<String>;

	/// Reverses [`protect`](StateDataFormat::protect); returns `None` instead of erroring.
	fn unprotect(&self, token: &str) -> Option<StateProperties>;
}

/// [`StateDataFormat`] backed by a purpose-scoped [`DataProtector`].
///
/// Holds no state beyond the wrapped protector and the optional expiry window; performs no
/// network or disk I/O.
pub struct ProtectedStateFormat {
	protector: Arc<dyn DataProtector>,
	max_age: Option<Duration>,
}
impl ProtectedStateFormat {
	/// Wraps a protector without an expiry window.
	pub fn new(protector: Arc<dyn DataProtector>) -> Self {
		Self { protector, max_age: None }
	}

	/// Rejects tokens whose bag was issued more than `max_age` ago.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age);

		self
	}

	fn try_unprotect(&self, token: &str) -> Option<StateProperties> {
		let sealed = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
		let payload = self.protector.unprotect(&sealed)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&payload);
		let properties: StateProperties = match serde_path_to_error::deserialize(&mut deserializer)
		{
			Ok(properties) => properties,
			Err(error) => {
				obs::state_rejected(&error);

				return None;
			},
		};

		if let Some(max_age) = self.max_age
			&& properties.issued_at() + max_age < OffsetDateTime::now_utc()
		{
			return None;
		}

		Some(properties)
	}
}
impl StateDataFormat for ProtectedStateFormat {
	fn protect(&self, properties: &StateProperties) -> Result<String> {
		let payload = serde_json::to_vec(properties).map_err(StateError::Serialize)?;
		let sealed = self.protector.protect(&payload)?;

		obs::record_state_outcome(StateOutcome::Protected);

		Ok(URL_SAFE_NO_PAD.encode(sealed))
	}

	fn unprotect(&self, token: &str) -> Option<StateProperties> {
		let Some(properties) = self.try_unprotect(token) else {
			obs::record_state_outcome(StateOutcome::Rejected);

			return None;
		};

		obs::record_state_outcome(StateOutcome::Accepted);

		Some(properties)
	}
}
impl Debug for ProtectedStateFormat {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProtectedStateFormat").field("max_age", &self.max_age).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::protect::{AesGcmProtectionProvider, DataProtectionProvider};

	const PURPOSES: &[&str] = &["middleware", "oauth2", STATE_FORMAT_VERSION];

	fn format() -> ProtectedStateFormat {
		let provider = AesGcmProtectionProvider::new([9; 32]);

		ProtectedStateFormat::new(provider.create_protector(PURPOSES))
	}

	fn bag() -> StateProperties {
		let mut properties = StateProperties::new();

		properties.set_redirect_uri("https://app.example/after-login");
		properties.set("correlation_id", "d3adb33f");

		properties
	}

	#[test]
	fn protect_round_trips_the_bag() {
		let format = format();
		let properties = bag();
		let token = format.protect(&properties).expect("Protecting a valid bag should succeed.");
		let round_tripped =
			format.unprotect(&token).expect("Unprotecting an untampered token should succeed.");

		assert_eq!(round_tripped, properties);
		assert_eq!(round_tripped.redirect_uri(), Some("https://app.example/after-login"));
	}

	#[test]
	fn tokens_are_url_safe() {
		let token =
			format().protect(&bag()).expect("Protecting a valid bag should succeed.");

		assert!(!token.contains(['+', '/', '=']));
	}

	#[test]
	fn unprotect_rejects_corrupted_tokens() {
		let format = format();
		let mut token =
			format.protect(&bag()).expect("Protecting a valid bag should succeed.");

		token.replace_range(..4, "AAAA");

		assert!(format.unprotect(&token).is_none());
		assert!(format.unprotect("not base64url!!!").is_none());
		assert!(format.unprotect("").is_none());
	}

	#[test]
	fn unprotect_rejects_foreign_tokens() {
		let foreign_provider = AesGcmProtectionProvider::new([1; 32]);
		let foreign =
			ProtectedStateFormat::new(foreign_provider.create_protector(PURPOSES));
		let token = foreign.protect(&bag()).expect("Protecting a valid bag should succeed.");

		assert!(format().unprotect(&token).is_none());
	}

	#[test]
	fn unprotect_rejects_unparseable_payloads() {
		let provider = AesGcmProtectionProvider::new([9; 32]);
		let protector = provider.create_protector(PURPOSES);
		let sealed =
			protector.protect(b"not json").expect("Sealing raw bytes should succeed.");

		assert!(format().unprotect(&URL_SAFE_NO_PAD.encode(sealed)).is_none());
	}

	#[test]
	fn max_age_rejects_stale_bags() {
		let provider = AesGcmProtectionProvider::new([9; 32]);
		let format = ProtectedStateFormat::new(provider.create_protector(PURPOSES))
			.with_max_age(Duration::minutes(10));
		let mut stale = bag();

		stale.issued_at = OffsetDateTime::now_utc() - Duration::hours(1);

		let token = format.protect(&stale).expect("Protecting a stale bag should still succeed.");

		assert!(format.unprotect(&token).is_none());

		let fresh_token =
			format.protect(&bag()).expect("Protecting a fresh bag should succeed.");

		assert!(format.unprotect(&fresh_token).is_some());
	}
}
