//! Per-operation circuit breaker state machine and registry.

use crate::errors::{ResilienceError, ResilienceResult};
use crate::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_MAX_CALLS, DEFAULT_RECOVERY_TIMEOUT_SECS};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens. Must be >= 1.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting probe calls
    pub recovery_timeout: Duration,
    /// Trial calls admitted while half-open. Must be >= 1.
    pub half_open_max_calls: u32,
    /// Master switch; when false every call passes through untracked
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs(DEFAULT_RECOVERY_TIMEOUT_SECS),
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
            enabled: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validates the configuration invariants.
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold < 1 {
            return Err(ResilienceError::Configuration {
                message: "circuit breaker failure_threshold must be at least 1".to_string(),
            });
        }
        if self.half_open_max_calls < 1 {
            return Err(ResilienceError::Configuration {
                message: "circuit breaker half_open_max_calls must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected without reaching the protected operation
    Open,
    /// A limited number of trial calls probe whether the dependency recovered
    HalfOpen,
}

impl CircuitState {
    /// Stable label for logging and the health snapshot.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Proof that the breaker admitted a call.
///
/// Every permit must be resolved with exactly one of
/// [`CircuitBreaker::record_success`], [`CircuitBreaker::record_failure`],
/// or [`CircuitBreaker::release`].
#[derive(Debug)]
#[must_use = "resolve the permit with record_success, record_failure, or release"]
pub struct BreakerPermit {
    probe: bool,
}

/// Rejection returned when the breaker refuses to admit a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRejection {
    /// Time remaining until the breaker admits a probe, when known.
    /// `None` when the half-open probe quota is already in use.
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
        }
    }
}

/// Circuit breaker for a single operation name.
///
/// All state lives behind one mutex per instance, so contention on one
/// operation's breaker never blocks another operation's breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Operation name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was created with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current run of consecutive failures while closed
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Time until an open breaker admits a probe; `None` unless open
    pub fn time_until_probe(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
        Some(self.config.recovery_timeout.saturating_sub(elapsed))
    }

    /// Asks the breaker to admit a call.
    ///
    /// An open breaker whose recovery timeout has elapsed transitions to
    /// half-open and admits the caller as the first probe. While half-open,
    /// admission is gated on `half_open_successes + half_open_in_flight <
    /// half_open_max_calls`, so exactly `half_open_max_calls` trials are
    /// admitted before the breaker commits to closed or open.
    pub fn try_acquire(&self) -> Result<BreakerPermit, OpenRejection> {
        if !self.config.enabled {
            return Ok(BreakerPermit { probe: false });
        }

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit { probe: false }),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_in_flight = 1;
                    Ok(BreakerPermit { probe: true })
                } else {
                    Err(OpenRejection {
                        retry_in: Some(self.config.recovery_timeout - elapsed),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_successes + inner.half_open_in_flight
                    < self.config.half_open_max_calls
                {
                    inner.half_open_in_flight += 1;
                    Ok(BreakerPermit { probe: true })
                } else {
                    Err(OpenRejection { retry_in: None })
                }
            }
        }
    }

    /// Record a successful call admitted by `permit`
    pub fn record_success(&self, permit: BreakerPermit) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if permit.probe => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // Result from a call admitted before the state changed; the
            // current probe window decides on its own evidence.
            _ => {}
        }
    }

    /// Record a failed call admitted by `permit`
    pub fn record_failure(&self, permit: BreakerPermit) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if permit.probe => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {
                debug!(breaker = %self.name, "stale failure outside its admission window ignored");
            }
        }
    }

    /// Hands back a permit without recording an outcome (cancellation path)
    pub fn release(&self, permit: BreakerPermit) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        if permit.probe && inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Forces the breaker back to a fresh closed state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = BreakerInner::new();
    }

    fn transition(&self, inner: &mut BreakerInner, next: CircuitState) {
        let prev = inner.state;
        if prev == next {
            return;
        }
        inner.state = next;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        match next {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = 0;
                warn!(breaker = %self.name, from = prev.as_str(), "circuit opened");
            }
            CircuitState::HalfOpen => {
                debug!(breaker = %self.name, "circuit half-open, probing");
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.consecutive_failures = 0;
                debug!(breaker = %self.name, "circuit closed");
            }
        }
    }
}

/// Concurrency-safe map of operation name to breaker instance.
///
/// Instances are created lazily on first use and live for the process
/// lifetime; the double-checked insert means racing callers converge on the
/// same instance.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker for `name`, creating it with `config` on first use.
    ///
    /// The config is fixed for the lifetime of the instance; later callers
    /// with a different config get the existing breaker unchanged.
    pub fn obtain(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config.clone()))),
        )
    }

    /// Returns the breaker for `name` if one exists.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).map(Arc::clone)
    }

    /// Snapshot of every breaker's current state.
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    /// Resets every breaker to a fresh closed state (tests/ops).
    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
