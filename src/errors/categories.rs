//! Failure classification.
//!
//! The classifier is the seam that keeps the orchestrator agnostic to what
//! the protected operation actually does: it maps every error variant onto a
//! closed set of categories, and the retry engine and circuit breaker act on
//! the category alone.

use crate::errors::ResilienceError;

/// Category assigned to a failed call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Short-lived failure, retryable with standard backoff
    Transient,
    /// Failure that will not succeed on retry
    Permanent,
    /// The dependency is shedding load; retryable with amplified backoff
    RateLimited,
    /// The dependency is down; retryable, counts toward the breaker
    ServiceUnavailable,
    /// Unrecognized failure; retried with conservative limits
    Unknown,
}

impl FailureCategory {
    /// Whether the retry engine may schedule another attempt for this category.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureCategory::Permanent)
    }

    /// Multiplier applied to the exponential backoff for this category.
    ///
    /// Rate-limited failures back off hardest so retries do not keep feeding
    /// the limiter; unavailability backs off harder than a plain blip.
    pub fn backoff_multiplier(self) -> f64 {
        match self {
            FailureCategory::Transient => 1.0,
            FailureCategory::Permanent => 1.0,
            FailureCategory::RateLimited => 2.0,
            FailureCategory::ServiceUnavailable => 1.5,
            FailureCategory::Unknown => 1.0,
        }
    }

    /// Stable label for logging and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Transient => "transient",
            FailureCategory::Permanent => "permanent",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::ServiceUnavailable => "service_unavailable",
            FailureCategory::Unknown => "unknown",
        }
    }
}

/// Maps an error from a protected operation to its failure category.
///
/// Pure and side-effect-free. The match is exhaustive over the error enum,
/// so adding a variant without deciding its retry semantics is a compile
/// error. [`ResilienceError::AttemptsExhausted`] classifies as its wrapped
/// source, which keeps the layer safely re-entrant when one orchestrated
/// call wraps another. Cancellation classifies as permanent: a cancelled
/// call must never be retried on the caller's behalf.
pub fn classify(error: &ResilienceError) -> FailureCategory {
    match error {
        ResilienceError::Transient { .. } => FailureCategory::Transient,
        ResilienceError::Permanent { .. }
        | ResilienceError::Configuration { .. }
        | ResilienceError::Cancelled { .. } => FailureCategory::Permanent,
        ResilienceError::RateLimited { .. } => FailureCategory::RateLimited,
        ResilienceError::ServiceUnavailable { .. } | ResilienceError::CircuitOpen { .. } => {
            FailureCategory::ServiceUnavailable
        }
        ResilienceError::AttemptsExhausted { source, .. } => classify(source),
        ResilienceError::Unknown { .. } => FailureCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_case::test_case;

    fn transient() -> ResilienceError {
        ResilienceError::Transient {
            message: "connection reset".to_string(),
        }
    }

    #[test_case(transient() => FailureCategory::Transient)]
    #[test_case(ResilienceError::Permanent { message: "bad input".into() } => FailureCategory::Permanent)]
    #[test_case(ResilienceError::Configuration { message: "bad config".into() } => FailureCategory::Permanent)]
    #[test_case(ResilienceError::Cancelled { operation: "summarize".into() } => FailureCategory::Permanent)]
    #[test_case(ResilienceError::RateLimited { message: "slow down".into(), retry_after: None } => FailureCategory::RateLimited)]
    #[test_case(ResilienceError::ServiceUnavailable { message: "down".into(), status_code: Some(503) } => FailureCategory::ServiceUnavailable)]
    #[test_case(ResilienceError::CircuitOpen { operation: "summarize".into(), retry_in: None } => FailureCategory::ServiceUnavailable)]
    #[test_case(ResilienceError::Unknown { message: "???".into() } => FailureCategory::Unknown)]
    fn classification(error: ResilienceError) -> FailureCategory {
        classify(&error)
    }

    #[test]
    fn classify_recurses_through_exhausted_wrapper() {
        let wrapped = ResilienceError::AttemptsExhausted {
            operation: "summarize".to_string(),
            attempts: 3,
            elapsed: Duration::from_millis(90),
            source: Box::new(ResilienceError::RateLimited {
                message: "slow down".to_string(),
                retry_after: None,
            }),
        };
        assert_eq!(classify(&wrapped), FailureCategory::RateLimited);
    }

    #[test_case(FailureCategory::Transient => true)]
    #[test_case(FailureCategory::Permanent => false)]
    #[test_case(FailureCategory::RateLimited => true)]
    #[test_case(FailureCategory::ServiceUnavailable => true)]
    #[test_case(FailureCategory::Unknown => true)]
    fn retryability(category: FailureCategory) -> bool {
        category.is_retryable()
    }

    #[test]
    fn rate_limited_backs_off_hardest() {
        assert!(
            FailureCategory::RateLimited.backoff_multiplier()
                > FailureCategory::ServiceUnavailable.backoff_multiplier()
        );
        assert!(
            FailureCategory::ServiceUnavailable.backoff_multiplier()
                > FailureCategory::Transient.backoff_multiplier()
        );
    }
}
