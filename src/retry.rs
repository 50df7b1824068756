//! Retry policy engine: exponential backoff with jitter.

use crate::errors::{FailureCategory, ResilienceError, ResilienceResult};
use crate::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first call. Must be >= 1.
    pub max_attempts: u32,
    /// Delay before the first retry, scaled exponentially afterwards
    pub base_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Fraction of the raw delay used as the jitter span, in `0..=1`
    pub jitter_factor: f64,
    /// Master switch; when false no retries are scheduled
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
            enabled: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that performs the initial call only, never a retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Validates the configuration invariants.
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_attempts < 1 {
            return Err(ResilienceError::Configuration {
                message: "retry max_attempts must be at least 1".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(ResilienceError::Configuration {
                message: format!(
                    "retry base_delay ({:?}) must not exceed max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::Configuration {
                message: format!(
                    "retry jitter_factor must be within 0..=1, got {}",
                    self.jitter_factor
                ),
            });
        }
        Ok(())
    }
}

/// Source of uniform randomness for jitter computation.
///
/// Injectable so tests can pin the draw and verify delay bounds.
pub trait RandomSource: Send + Sync {
    /// Returns a uniform draw in `[0, 1)`.
    fn next_unit(&self) -> f64;
}

/// Default randomness backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_unit(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Decision returned by [`RetryPolicy::next_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make another attempt
    Retry {
        /// Backoff to apply before the next attempt
        delay: Duration,
    },
    /// Stop retrying and surface the failure
    Stop,
}

/// Computes whether and when the next attempt should run.
pub struct RetryPolicy {
    random: Arc<dyn RandomSource>,
}

impl RetryPolicy {
    /// Creates a policy using the thread-local RNG.
    pub fn new() -> Self {
        Self::with_random_source(Arc::new(ThreadRngSource))
    }

    /// Creates a policy with an injected randomness source.
    pub fn with_random_source(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Decides the fate of attempt `attempt` (1-based) that just failed with
    /// `category`.
    ///
    /// The raw delay is `base_delay * 2^(attempt-1)` scaled by the category's
    /// backoff multiplier and capped at `max_delay`; symmetric jitter of up
    /// to `raw * jitter_factor` is spread around it, and the result is
    /// clamped to `[0, max_delay]`. A `retry_after` hint from the dependency
    /// wins whenever it is longer than the computed delay.
    pub fn next_delay(
        &self,
        attempt: u32,
        category: FailureCategory,
        config: &RetryConfig,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if !config.enabled || !category.is_retryable() || attempt >= config.max_attempts {
            return RetryDecision::Stop;
        }

        let base = config.base_delay.as_secs_f64();
        let max = config.max_delay.as_secs_f64();
        // Exponent capped so the f64 never overflows to infinity.
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let raw = (base * 2f64.powi(exponent) * category.backoff_multiplier()).min(max);

        let span = raw * config.jitter_factor;
        let jittered = raw + (self.random.next_unit() - 0.5) * span;
        let mut delay = Duration::from_secs_f64(jittered.clamp(0.0, max));

        if let Some(hint) = retry_after {
            if hint > delay {
                delay = hint;
            }
        }

        RetryDecision::Retry { delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
