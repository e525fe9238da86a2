//! Middleware-level error types shared across configuration, state, and transport layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical middleware error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem, fatal at construction time.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// State payload could not be serialized or sealed.
	#[error(transparent)]
	State(#[from] StateError),
	/// Transport failure (DNS, TCP, TLS, oversized response).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Configuration and validation failures raised while bootstrapping the middleware.
///
/// Every variant is a programmer error: it is surfaced synchronously from
/// [`OAuthMiddleware::initialize`](crate::middleware::OAuthMiddleware::initialize), never retried,
/// and fatal to middleware construction.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required option is missing or blank after trimming whitespace.
	#[error("The `{field}` option must be provided.")]
	MissingField {
		/// Name of the offending configuration field.
		field: &'static str,
	},
	/// An endpoint option is present but cannot be parsed as a URL.
	#[error("The `{field}` option is not a valid URL.")]
	InvalidEndpoint {
		/// Name of the offending configuration field.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A certificate validator was supplied alongside a handler that cannot honor it.
	#[error(
		"A backchannel certificate validator was supplied, but the `{handler}` transport handler \
		 does not support certificate validation."
	)]
	ValidatorUnsupported {
		/// Name of the resolved transport handler.
		handler: &'static str,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while protecting a state payload.
///
/// Unprotecting never produces an error: tampered, malformed, or stale tokens surface as `None`
/// so request handlers can reject the request instead of crashing.
#[derive(Debug, ThisError)]
pub enum StateError {
	/// State properties could not be serialized before sealing.
	#[error("State payload could not be serialized.")]
	Serialize(#[from] serde_json::Error),
	/// The data protector rejected the payload.
	#[error("State payload could not be sealed.")]
	Seal,
}

/// Transport-level failures raised by the backchannel.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backchannel endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backchannel endpoint.")]
	Io(#[from] std::io::Error),
	/// The response body exceeded the fixed buffering limit.
	#[error("Backchannel response exceeded the {limit}-byte buffer limit.")]
	ResponseTooLarge {
		/// Maximum number of buffered response bytes.
		limit: usize,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn missing_field_message_names_the_field() {
		let err = ConfigError::MissingField { field: "ClientSecret" };

		assert!(err.to_string().contains("ClientSecret"));
	}

	#[test]
	fn validator_mismatch_message_names_the_handler() {
		let err = ConfigError::ValidatorUnsupported { handler: "PlainHandler" };

		assert!(err.to_string().contains("PlainHandler"));
		assert!(err.to_string().contains("certificate validation"));
	}

	#[test]
	fn response_too_large_reports_the_limit() {
		let err = TransportError::ResponseTooLarge { limit: 10 * 1024 * 1024 };

		assert!(err.to_string().contains("10485760"));
	}
}
