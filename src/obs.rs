//! Optional observability helpers for middleware stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_middleware.request` carrying the
//!   `category` (concrete middleware type) and `scheme` fields, plus debug events per stage.
//! - Enable `metrics` to increment the `oauth2_middleware_state_total` counter for every state
//!   protect/unprotect outcome, labeled by `outcome`.

// std
use std::marker::PhantomData;
// self
use crate::_prelude::*;

/// Middleware stages observed by spans and events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Configuration validation and transport construction.
	Initialize,
	/// Authorization redirect issuance.
	Challenge,
	/// Returned-state validation on the redirect callback.
	Callback,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Initialize => "initialize",
			Stage::Challenge => "challenge",
			Stage::Callback => "callback",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for state protection operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateOutcome {
	/// A bag was sealed into a token.
	Protected,
	/// A token unsealed into a valid bag.
	Accepted,
	/// A token was rejected as malformed, tampered, or stale.
	Rejected,
}
impl StateOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StateOutcome::Protected => "protected",
			StateOutcome::Accepted => "accepted",
			StateOutcome::Rejected => "rejected",
		}
	}
}
impl Display for StateOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a state protection outcome via the global metrics recorder (when enabled).
pub fn record_state_outcome(outcome: StateOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_middleware_state_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Emits a debug event describing why a state token was rejected (when tracing is enabled).
pub fn state_rejected(reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(reason = %reason, "Rejected a state token.");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = reason;
	}
}

/// Named logging scope tied to one middleware instance.
///
/// Wraps a `tracing` span carrying the concrete middleware type name and the authentication
/// scheme; compiles to a no-op when the `tracing` feature is disabled.
#[derive(Clone, Debug)]
pub struct MiddlewareSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl MiddlewareSpan {
	/// Creates a span tagged with the middleware category and scheme.
	pub fn new(category: &'static str, scheme: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_middleware.request", category, scheme);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (category, scheme);

			Self {}
		}
	}

	/// Enters the span and announces the stage for the duration of the returned guard.
	pub fn enter(&self, stage: Stage) -> MiddlewareSpanGuard<'_> {
		#[cfg(feature = "tracing")]
		{
			let guard = self.span.enter();

			tracing::debug!(stage = stage.as_str(), "Entering middleware stage.");

			MiddlewareSpanGuard { guard, _marker: PhantomData }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			MiddlewareSpanGuard { _marker: PhantomData }
		}
	}
}

/// RAII guard returned by [`MiddlewareSpan::enter`].
pub struct MiddlewareSpanGuard<'a> {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::Entered<'a>,
	_marker: PhantomData<&'a ()>,
}
impl Debug for MiddlewareSpanGuard<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("MiddlewareSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn span_noop_without_tracing() {
		let span = MiddlewareSpan::new("oauth2_middleware::middleware::OAuthMiddleware", "oauth2");
		let _guard = span.enter(Stage::Initialize);
		// Compile-time smoke test ensures the guard exists even when tracing is disabled.
	}

	#[test]
	fn record_state_outcome_noop_without_metrics() {
		record_state_outcome(StateOutcome::Rejected);
	}

	#[test]
	fn labels_are_stable() {
		assert_eq!(Stage::Initialize.to_string(), "initialize");
		assert_eq!(Stage::Challenge.to_string(), "challenge");
		assert_eq!(Stage::Callback.to_string(), "callback");
		assert_eq!(StateOutcome::Protected.to_string(), "protected");
		assert_eq!(StateOutcome::Accepted.to_string(), "accepted");
		assert_eq!(StateOutcome::Rejected.to_string(), "rejected");
	}
}
