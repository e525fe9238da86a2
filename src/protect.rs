//! Data-protection contracts and the built-in AES-256-GCM provider.
//!
//! A [`DataProtectionProvider`] hands out [`DataProtector`] capabilities scoped by a purpose
//! chain. Payloads sealed under one purpose chain never unseal under another, which is what lets
//! the middleware bind its state parameter to the concrete middleware type, the authentication
//! scheme, and the state format version.

// crates.io
use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use hkdf::Hkdf;
use sha2::Sha256;
// self
use crate::{_prelude::*, error::StateError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Seals and unseals opaque byte payloads with confidentiality and integrity.
///
/// Implementations must be safe for concurrent use; the middleware shares one protector across
/// every request it handles.
pub trait DataProtector
where
	Self: Send + Sync,
{
	/// Seals `plaintext` into a tamper-evident payload.
	fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

	/// Reverses [`protect`](DataProtector::protect).
	///
	/// Returns `None` for any payload that is malformed or fails integrity verification; this
	/// operation never errors or panics.
	fn unprotect(&self, sealed: &[u8]) -> Option<Vec<u8>>;
}

/// Hands out [`DataProtector`] capabilities keyed by purpose strings.
pub trait DataProtectionProvider
where
	Self: Send + Sync,
{
	/// Creates a protector scoped to the given purpose chain.
	///
	/// Two protectors created from the same provider interoperate exactly when their purpose
	/// chains are equal.
	fn create_protector(&self, purposes: &[&str]) -> Arc<dyn DataProtector>;
}

/// Built-in provider deriving per-purpose AES-256-GCM subkeys from a single master key.
///
/// Subkeys are derived with HKDF-SHA256 over a length-prefixed encoding of the purpose chain, so
/// distinct chains can never collide through concatenation.
#[derive(Clone)]
pub struct AesGcmProtectionProvider {
	master_key: [u8; KEY_LEN],
}
impl AesGcmProtectionProvider {
	/// Creates a provider from an existing 32-byte master key.
	pub fn new(master_key: [u8; KEY_LEN]) -> Self {
		Self { master_key }
	}

	/// Creates a provider with a freshly generated random master key.
	///
	/// Payloads sealed by this provider cannot outlive the process; use [`new`](Self::new) with a
	/// persisted key when state must survive restarts.
	pub fn generate() -> Self {
		let mut master_key = [0; KEY_LEN];

		OsRng.fill_bytes(&mut master_key);

		Self { master_key }
	}
}
impl DataProtectionProvider for AesGcmProtectionProvider {
	fn create_protector(&self, purposes: &[&str]) -> Arc<dyn DataProtector> {
		let key = derive_key(&self.master_key, purposes);

		Arc::new(AesGcmProtector { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)) })
	}
}
impl Debug for AesGcmProtectionProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AesGcmProtectionProvider").field("master_key", &"<redacted>").finish()
	}
}

struct AesGcmProtector {
	cipher: Aes256Gcm,
}
impl DataProtector for AesGcmProtector {
	fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let mut nonce = [0; NONCE_LEN];

		OsRng.fill_bytes(&mut nonce);

		let sealed = self
			.cipher
			.encrypt(Nonce::from_slice(&nonce), plaintext)
			.map_err(|_| StateError::Seal)?;
		let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());

		payload.extend_from_slice(&nonce);
		payload.extend_from_slice(&sealed);

		Ok(payload)
	}

	fn unprotect(&self, sealed: &[u8]) -> Option<Vec<u8>> {
		if sealed.len() <= NONCE_LEN {
			return None;
		}

		let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

		self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
	}
}

fn derive_key(master_key: &[u8], purposes: &[&str]) -> [u8; KEY_LEN] {
	let mut info = Vec::new();

	for purpose in purposes {
		info.extend_from_slice(&(purpose.len() as u32).to_le_bytes());
		info.extend_from_slice(purpose.as_bytes());
	}

	let hkdf = Hkdf::<Sha256>::new(None, master_key);
	let mut okm = [0; KEY_LEN];

	// A 32-byte output is always within the HKDF-SHA256 bound.
	hkdf.expand(&info, &mut okm).expect("HKDF-SHA256 accepts 32-byte outputs.");

	okm
}
