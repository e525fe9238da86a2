//! Embeddable OAuth 2.0 authentication middleware bootstrap: validated client configuration,
//! cryptographically sealed state round-tripping, and a bounded backchannel transport.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod obs;
pub mod protect;
pub mod state;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures for integration tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{config::OAuthConfig, protect::AesGcmProtectionProvider};

	/// Fixed master key used by test protection providers.
	pub const TEST_MASTER_KEY: [u8; 32] = [7; 32];

	/// Builds a protection provider with a fixed master key so sealed payloads are reproducible
	/// across test processes.
	pub fn test_protection_provider() -> AesGcmProtectionProvider {
		AesGcmProtectionProvider::new(TEST_MASTER_KEY)
	}

	/// Builds a configuration that passes validation with the crate defaults.
	pub fn test_config() -> OAuthConfig {
		OAuthConfig::new(
			"client-id",
			"client-secret",
			"https://provider.example/oauth2/authorize",
			"https://provider.example/oauth2/token",
		)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::RwLock;
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, tokio as _};
