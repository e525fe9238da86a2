//! Backchannel transport primitives.
//!
//! The module exposes [`BackchannelHandler`] so callers can swap the underlying HTTP stack
//! without losing the middleware's configuration checks: a handler advertises whether it can
//! honor a [`BackchannelCertificateValidator`] through a capability query instead of downcasting,
//! and the bootstrap fails fast when a validator is supplied to a handler that cannot carry it.
//! The resolved [`Backchannel`] enforces the fixed response-buffering limit on every call.

// std
use std::any::type_name;
// crates.io
use reqwest::{Response, redirect::Policy};
use rustls::{
	DigitallySignedStruct, RootCertStore, SignatureScheme,
	client::{
		WebPkiServerVerifier,
		danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
	},
	crypto::ring,
	pki_types::{CertificateDer, ServerName, UnixTime},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Maximum number of response bytes the backchannel will buffer, fixed at 10 MiB.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Server-certificate validation policy applied to backchannel TLS sessions.
///
/// When attached, the policy replaces standard chain validation for the backchannel connection:
/// the trust decision for the presented end-entity certificate is entirely the implementation's.
/// Signature verification of the TLS handshake itself is unaffected.
pub trait BackchannelCertificateValidator
where
	Self: Send + Sync,
{
	/// Decides whether the presented end-entity certificate should be trusted for `host`.
	fn validate(&self, certificate_der: &[u8], host: &str) -> bool;
}

/// Message-handling strategy that produces the backchannel's HTTP client.
///
/// Handlers must be safe to share: the validator slot is written once during bootstrap and only
/// read afterwards. The default implementations describe a handler without certificate-validation
/// support, so custom handlers opt in explicitly.
pub trait BackchannelHandler
where
	Self: Send + Sync,
{
	/// Handler name used in diagnostics.
	fn name(&self) -> &'static str;

	/// Whether [`attach_certificate_validator`](Self::attach_certificate_validator) is honored.
	fn supports_certificate_validation(&self) -> bool {
		false
	}

	/// Attaches a certificate validation policy to this handler.
	fn attach_certificate_validator(
		&self,
		validator: Arc<dyn BackchannelCertificateValidator>,
	) -> Result<(), ConfigError> {
		let _ = validator;

		Err(ConfigError::ValidatorUnsupported { handler: self.name() })
	}

	/// Currently attached certificate validation policy, if any.
	fn certificate_validator(&self) -> Option<Arc<dyn BackchannelCertificateValidator>> {
		None
	}

	/// Builds the HTTP client with the provided request timeout.
	fn client(&self, timeout: StdDuration) -> Result<ReqwestClient, ConfigError>;
}

/// Default platform handler backed by reqwest + rustls.
///
/// Backchannel requests must not follow redirects, matching OAuth 2.0 guidance that token
/// endpoints return results directly instead of delegating to another URI.
#[derive(Default)]
pub struct ReqwestBackchannelHandler {
	validator: RwLock<Option<Arc<dyn BackchannelCertificateValidator>>>,
}
impl BackchannelHandler for ReqwestBackchannelHandler {
	fn name(&self) -> &'static str {
		type_name::<Self>()
	}

	fn supports_certificate_validation(&self) -> bool {
		true
	}

	fn attach_certificate_validator(
		&self,
		validator: Arc<dyn BackchannelCertificateValidator>,
	) -> Result<(), ConfigError> {
		*self.validator.write() = Some(validator);

		Ok(())
	}

	fn certificate_validator(&self) -> Option<Arc<dyn BackchannelCertificateValidator>> {
		self.validator.read().clone()
	}

	fn client(&self, timeout: StdDuration) -> Result<ReqwestClient, ConfigError> {
		let mut builder = ReqwestClient::builder().timeout(timeout).redirect(Policy::none());

		if let Some(validator) = self.certificate_validator() {
			builder = builder.use_preconfigured_tls(delegating_tls_config(validator)?);
		}

		builder.build().map_err(ConfigError::from)
	}
}
impl Debug for ReqwestBackchannelHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestBackchannelHandler")
			.field("certificate_validator_set", &self.validator.read().is_some())
			.finish()
	}
}

/// Server-to-server HTTP transport shared by every request a middleware instance handles.
///
/// Created once at middleware construction and never replaced; cloning shares the same
/// connection pool.
#[derive(Clone)]
pub struct Backchannel {
	client: ReqwestClient,
	timeout: StdDuration,
	max_response_bytes: usize,
	certificate_validator: Option<Arc<dyn BackchannelCertificateValidator>>,
}
impl Backchannel {
	pub(crate) fn new(
		handler: &dyn BackchannelHandler,
		timeout: StdDuration,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			client: handler.client(timeout)?,
			timeout,
			max_response_bytes: MAX_RESPONSE_BYTES,
			certificate_validator: handler.certificate_validator(),
		})
	}

	/// Request timeout enforced by the underlying client.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}

	/// Maximum number of response bytes buffered per call.
	pub fn max_buffered_response_bytes(&self) -> usize {
		self.max_response_bytes
	}

	/// Certificate validation policy carried by the transport, if one was attached.
	pub fn certificate_validator(&self) -> Option<&Arc<dyn BackchannelCertificateValidator>> {
		self.certificate_validator.as_ref()
	}

	/// Issues a GET request and buffers the response up to the fixed limit.
	pub async fn get(&self, url: Url) -> Result<BackchannelResponse> {
		let response = self.client.get(url).send().await.map_err(TransportError::from)?;

		self.buffered(response).await
	}

	/// Issues a form-encoded POST request and buffers the response up to the fixed limit.
	pub async fn post_form(
		&self,
		url: Url,
		form: &[(&str, &str)],
	) -> Result<BackchannelResponse> {
		let response =
			self.client.post(url).form(form).send().await.map_err(TransportError::from)?;

		self.buffered(response).await
	}

	async fn buffered(&self, mut response: Response) -> Result<BackchannelResponse> {
		let limit = self.max_response_bytes;

		if let Some(length) = response.content_length()
			&& length > limit as u64
		{
			return Err(TransportError::ResponseTooLarge { limit }.into());
		}

		let status = response.status().as_u16();
		let mut body = Vec::new();

		while let Some(chunk) = response.chunk().await.map_err(TransportError::from)? {
			if body.len() + chunk.len() > limit {
				return Err(TransportError::ResponseTooLarge { limit }.into());
			}

			body.extend_from_slice(&chunk);
		}

		Ok(BackchannelResponse { status, body })
	}
}
impl Debug for Backchannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Backchannel")
			.field("timeout", &self.timeout)
			.field("max_response_bytes", &self.max_response_bytes)
			.field("certificate_validator_set", &self.certificate_validator.is_some())
			.finish()
	}
}

/// Buffered backchannel response.
#[derive(Clone, Debug)]
pub struct BackchannelResponse {
	/// HTTP status code.
	pub status: u16,
	/// Buffered response body, at most [`MAX_RESPONSE_BYTES`] long.
	pub body: Vec<u8>,
}

fn delegating_tls_config(
	validator: Arc<dyn BackchannelCertificateValidator>,
) -> Result<rustls::ClientConfig, ConfigError> {
	let provider = Arc::new(ring::default_provider());
	let roots =
		Arc::new(RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() });
	let webpki = WebPkiServerVerifier::builder_with_provider(roots, provider.clone())
		.build()
		.map_err(ConfigError::http_client_build)?;
	let verifier = DelegatingCertVerifier { inner: webpki, validator };
	let config = rustls::ClientConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.map_err(ConfigError::http_client_build)?
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(verifier))
		.with_no_client_auth();

	Ok(config)
}

/// Certificate verifier that delegates the trust decision to the attached validator while
/// leaving handshake signature verification to webpki.
struct DelegatingCertVerifier {
	inner: Arc<WebPkiServerVerifier>,
	validator: Arc<dyn BackchannelCertificateValidator>,
}
impl ServerCertVerifier for DelegatingCertVerifier {
	fn verify_server_cert(
		&self,
		end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		let host = host_of(server_name);

		if self.validator.validate(end_entity.as_ref(), &host) {
			Ok(ServerCertVerified::assertion())
		} else {
			Err(rustls::Error::InvalidCertificate(
				rustls::CertificateError::ApplicationVerificationFailure,
			))
		}
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		self.inner.verify_tls12_signature(message, cert, dss)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		self.inner.verify_tls13_signature(message, cert, dss)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.inner.supported_verify_schemes()
	}
}
impl Debug for DelegatingCertVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("DelegatingCertVerifier(..)")
	}
}

fn host_of(server_name: &ServerName<'_>) -> String {
	match server_name {
		ServerName::DnsName(dns) => dns.as_ref().to_owned(),
		ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
		other => format!("{other:?}"),
	}
}
