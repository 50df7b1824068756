//! Error types for protected operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Main error type for the resilience layer.
///
/// Protected callables signal failure semantics purely through the variant
/// they return; the classifier in [`crate::errors::classify`] maps each
/// variant to a retry category, so callers never need to parse message
/// strings.
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    /// Transient failure (connection blip, timeout) — retryable per policy
    #[error("Transient failure: {message}")]
    Transient {
        /// Error message describing the failure
        message: String,
    },

    /// Permanent failure (invalid request, bad credentials) — never retried
    #[error("Permanent failure: {message}")]
    Permanent {
        /// Error message describing the failure
        message: String,
    },

    /// The downstream dependency rejected the call for rate limiting
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Error message describing the rate limit
        message: String,
        /// Duration to wait before retrying, if the dependency provided one
        retry_after: Option<Duration>,
    },

    /// The downstream dependency is unavailable (5xx-class outage)
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Error message describing the outage
        message: String,
        /// Status code reported by the dependency, if any
        status_code: Option<u16>,
    },

    /// Synthetic error: the circuit breaker rejected the call without
    /// invoking the protected operation
    #[error("Circuit open for operation `{operation}`")]
    CircuitOpen {
        /// Operation whose breaker is open
        operation: String,
        /// Time remaining until the breaker probes again, if known
        retry_in: Option<Duration>,
    },

    /// The caller cancelled the operation (never counted as a failure)
    #[error("Operation `{operation}` cancelled")]
    Cancelled {
        /// Operation that was cancelled
        operation: String,
    },

    /// All attempts failed; wraps the last classified error with diagnostics
    #[error(
        "Operation `{operation}` failed after {attempts} attempt(s) in {elapsed:?}: {source}"
    )]
    AttemptsExhausted {
        /// Operation that failed
        operation: String,
        /// Number of attempts made (including the first call)
        attempts: u32,
        /// Wall-clock time spent across all attempts and backoff sleeps
        elapsed: Duration,
        /// The last error returned by the protected operation
        #[source]
        source: Box<ResilienceError>,
    },

    /// Configuration error (invalid strategy parameters, unknown route target)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Unrecognized failure — retried with conservative limits, never swallowed
    #[error("Unknown failure: {message}")]
    Unknown {
        /// Error message describing the failure
        message: String,
    },
}

impl ResilienceError {
    /// Returns true if this error is retryable with exponential backoff.
    pub fn is_retryable(&self) -> bool {
        super::classify(self).is_retryable()
    }

    /// Returns the retry-after duration if the dependency provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ResilienceError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Unwraps the innermost error behind any [`AttemptsExhausted`] layers.
    ///
    /// [`AttemptsExhausted`]: ResilienceError::AttemptsExhausted
    pub fn root_cause(&self) -> &ResilienceError {
        match self {
            ResilienceError::AttemptsExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
