//! The resilience façade: strategy resolution, breaker gating, retry loop.

use crate::circuit_breaker::{CircuitBreakerRegistry, OpenRejection};
use crate::errors::{classify, ResilienceError, ResilienceResult};
use crate::metrics::{HealthReporter, HealthSnapshot, HealthStatus, ResilienceMetrics};
use crate::retry::{RandomSource, RetryDecision, RetryPolicy};
use crate::strategy::StrategyRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Trait for resilience orchestration.
///
/// The protected operation receives the cancellation token so a caller
/// timeout aborts the underlying call instead of merely abandoning it.
#[async_trait]
pub trait ResilienceOrchestrator: Send + Sync {
    /// Runs `f` under the resolved strategy for `operation`.
    async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        cancel: CancellationToken,
        f: F,
    ) -> ResilienceResult<T>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
        T: Send;
}

/// Result of a fallback-aware execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome<T> {
    /// The value produced by the operation or its fallback
    pub value: T,
    /// Whether the fallback stood in for a failed call
    pub fallback_used: bool,
    /// `degraded` when the fallback was used, `healthy` otherwise
    pub service_status: HealthStatus,
}

impl<T> ExecutionOutcome<T> {
    fn primary(value: T) -> Self {
        Self {
            value,
            fallback_used: false,
            service_status: HealthStatus::Healthy,
        }
    }

    fn degraded(value: T) -> Self {
        Self {
            value,
            fallback_used: true,
            service_status: HealthStatus::Degraded,
        }
    }
}

/// Default implementation of resilience orchestration.
///
/// Owns its breaker registry and strategy table; construct one per process
/// and share it by reference, rather than reaching for a module-level
/// singleton.
pub struct DefaultResilienceOrchestrator {
    strategies: RwLock<Arc<StrategyRegistry>>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<ResilienceMetrics>,
    retry_policy: RetryPolicy,
}

impl DefaultResilienceOrchestrator {
    /// Creates an orchestrator over the given strategy registry.
    pub fn new(strategies: StrategyRegistry) -> Self {
        Self {
            strategies: RwLock::new(Arc::new(strategies)),
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            metrics: Arc::new(ResilienceMetrics::new()),
            retry_policy: RetryPolicy::new(),
        }
    }

    /// Orchestrator with the built-in presets and no routes.
    pub fn with_defaults() -> Self {
        Self::new(StrategyRegistry::with_defaults())
    }

    /// Create a builder for configuring the orchestrator
    pub fn builder() -> ResilienceOrchestratorBuilder {
        ResilienceOrchestratorBuilder::new()
    }

    /// Replaces the strategy table wholesale.
    ///
    /// In-flight calls keep the registry they resolved against. Breakers
    /// already created keep their original configuration; `reset` clears
    /// them if the new table must take full effect.
    pub fn reload_strategies(&self, strategies: StrategyRegistry) {
        *self.strategies.write() = Arc::new(strategies);
    }

    /// The current strategy registry.
    pub fn strategies(&self) -> Arc<StrategyRegistry> {
        Arc::clone(&self.strategies.read())
    }

    /// The per-operation breaker registry.
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// The per-operation metrics registry.
    pub fn metrics(&self) -> &ResilienceMetrics {
        &self.metrics
    }

    /// A health reporter over this orchestrator's registries.
    pub fn reporter(&self) -> HealthReporter {
        HealthReporter::new(Arc::clone(&self.metrics), Arc::clone(&self.breakers))
    }

    /// Convenience for `reporter().snapshot()`.
    pub fn health(&self) -> HealthSnapshot {
        self.reporter().snapshot()
    }

    /// Clears all breakers and counters (tests/ops).
    pub fn reset(&self) {
        self.breakers.reset_all();
        self.metrics.reset();
    }

    /// Runs `f` under the resolved strategy, substituting `fallback` when
    /// every attempt fails or the circuit rejects the call.
    ///
    /// The fallback applies only when the resolved strategy enables it, and
    /// never masks a cancellation. The returned outcome is tagged so callers
    /// can surface degraded responses honestly.
    pub async fn execute_with_fallback<T, F, Fut, FB>(
        &self,
        operation: &str,
        cancel: CancellationToken,
        f: F,
        fallback: FB,
    ) -> ResilienceResult<ExecutionOutcome<T>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
        T: Send,
        FB: FnOnce() -> T + Send,
    {
        let strategy = self.strategies().resolve(operation);

        match self.run_protected(operation, &cancel, &f).await {
            Ok(value) => Ok(ExecutionOutcome::primary(value)),
            Err(err @ ResilienceError::Cancelled { .. }) => Err(err),
            Err(err) if strategy.fallback_enabled => {
                warn!(
                    operation,
                    strategy = strategy.name(),
                    error = %err,
                    "serving fallback for failed operation"
                );
                Ok(ExecutionOutcome::degraded(fallback()))
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, cancel, f))]
    async fn run_protected<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        f: &F,
    ) -> ResilienceResult<T>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
        T: Send,
    {
        let strategy = self.strategies().resolve(operation);
        let breaker = self.breakers.obtain(operation, &strategy.circuit_breaker);

        let started = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            // The breaker is consulted before every attempt, so a retry loop
            // whose own failures opened it stops instead of hammering a
            // known-bad dependency.
            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(OpenRejection { retry_in }) => {
                    let circuit_err = ResilienceError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_in,
                    };
                    if attempt == 1 {
                        // Nothing was attempted; this is a pure rejection.
                        self.metrics.record_rejection(operation);
                        debug!(operation, "call rejected by open circuit");
                        return Err(circuit_err);
                    }
                    // Earlier attempts ran and opened the circuit; the call
                    // finalizes as a failure, not a rejection.
                    self.metrics.record_failure(operation);
                    warn!(
                        operation,
                        attempts = attempt - 1,
                        "circuit opened mid-retry, abandoning attempts"
                    );
                    return Err(ResilienceError::AttemptsExhausted {
                        operation: operation.to_string(),
                        attempts: attempt - 1,
                        elapsed: started.elapsed(),
                        source: Box::new(circuit_err),
                    });
                }
            };

            if cancel.is_cancelled() {
                breaker.release(permit);
                self.metrics.record_cancellation(operation);
                return Err(ResilienceError::Cancelled {
                    operation: operation.to_string(),
                });
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = f(cancel.clone()) => Some(result),
            };

            match outcome {
                None => {
                    breaker.release(permit);
                    self.metrics.record_cancellation(operation);
                    return Err(ResilienceError::Cancelled {
                        operation: operation.to_string(),
                    });
                }
                Some(Ok(value)) => {
                    breaker.record_success(permit);
                    self.metrics.record_success(operation);
                    return Ok(value);
                }
                Some(Err(error @ ResilienceError::Cancelled { .. })) => {
                    breaker.release(permit);
                    self.metrics.record_cancellation(operation);
                    return Err(error);
                }
                Some(Err(error)) => {
                    let category = classify(&error);
                    breaker.record_failure(permit);

                    match self.retry_policy.next_delay(
                        attempt,
                        category,
                        &strategy.retry,
                        error.retry_after(),
                    ) {
                        RetryDecision::Retry { delay } => {
                            self.metrics.record_retry(operation);
                            debug!(
                                operation,
                                attempt,
                                category = category.as_str(),
                                delay_ms = delay.as_millis() as u64,
                                "retrying after failure"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    self.metrics.record_cancellation(operation);
                                    return Err(ResilienceError::Cancelled {
                                        operation: operation.to_string(),
                                    });
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                            attempt += 1;
                        }
                        RetryDecision::Stop => {
                            self.metrics.record_failure(operation);
                            let elapsed = started.elapsed();
                            warn!(
                                operation,
                                attempts = attempt,
                                category = category.as_str(),
                                error = %error,
                                "attempts exhausted"
                            );
                            return Err(ResilienceError::AttemptsExhausted {
                                operation: operation.to_string(),
                                attempts: attempt,
                                elapsed,
                                source: Box::new(error),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ResilienceOrchestrator for DefaultResilienceOrchestrator {
    async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        cancel: CancellationToken,
        f: F,
    ) -> ResilienceResult<T>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
        T: Send,
    {
        self.run_protected(operation, &cancel, &f).await
    }
}

/// Builder for configuring resilience orchestration.
pub struct ResilienceOrchestratorBuilder {
    strategies: Option<StrategyRegistry>,
    random_source: Option<Arc<dyn RandomSource>>,
}

impl ResilienceOrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            strategies: None,
            random_source: None,
        }
    }

    /// Sets the strategy registry.
    pub fn strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Injects the randomness source used for backoff jitter.
    pub fn random_source(mut self, source: Arc<dyn RandomSource>) -> Self {
        self.random_source = Some(source);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> DefaultResilienceOrchestrator {
        let strategies = self
            .strategies
            .unwrap_or_else(StrategyRegistry::with_defaults);
        let retry_policy = match self.random_source {
            Some(source) => RetryPolicy::with_random_source(source),
            None => RetryPolicy::new(),
        };

        DefaultResilienceOrchestrator {
            strategies: RwLock::new(Arc::new(strategies)),
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            metrics: Arc::new(ResilienceMetrics::new()),
            retry_policy,
        }
    }
}

impl Default for ResilienceOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::retry::RetryConfig;
    use crate::strategy::Strategy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_strategy(
        name: &str,
        max_attempts: u32,
        failure_threshold: u32,
        recovery_ms: u64,
        fallback_enabled: bool,
    ) -> Strategy {
        Strategy::custom(
            name,
            RetryConfig {
                max_attempts,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                jitter_factor: 0.0,
                enabled: true,
            },
            CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_millis(recovery_ms),
                half_open_max_calls: 1,
                enabled: true,
            },
            fallback_enabled,
        )
    }

    fn orchestrator_with(strategy: Strategy, operation: &str) -> DefaultResilienceOrchestrator {
        let name = strategy.name().to_string();
        let registry = StrategyRegistry::builder()
            .strategy(strategy)
            .route(operation, name)
            .build()
            .unwrap();
        DefaultResilienceOrchestrator::new(registry)
    }

    #[tokio::test]
    async fn executes_successfully() {
        let orchestrator = DefaultResilienceOrchestrator::with_defaults();

        let result = orchestrator
            .execute("test", CancellationToken::new(), |_cancel| async { Ok(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(orchestrator.metrics().operation("test").successful_calls, 1);
    }

    #[tokio::test]
    async fn retries_transient_failure_to_success() {
        let orchestrator = orchestrator_with(quick_strategy("s", 5, 100, 10_000, false), "flaky");

        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let result = orchestrator
            .execute("flaky", CancellationToken::new(), move |_cancel| {
                let seen = Arc::clone(&seen);
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ResilienceError::Transient {
                            message: "connection reset".to_string(),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = orchestrator.metrics().operation("flaky");
        assert_eq!(metrics.retried_calls, 2);
        assert_eq!(metrics.successful_calls, 1);
        assert_eq!(metrics.total_calls, 1);
    }

    #[tokio::test]
    async fn permanent_failure_is_never_retried() {
        let orchestrator = orchestrator_with(quick_strategy("s", 5, 100, 10_000, false), "strict");

        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let result: ResilienceResult<()> = orchestrator
            .execute("strict", CancellationToken::new(), move |_cancel| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(ResilienceError::Permanent {
                        message: "invalid prompt".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            ResilienceError::AttemptsExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, ResilienceError::Permanent { .. }));
            }
            other => panic!("expected AttemptsExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_wrapped_error() {
        let orchestrator = orchestrator_with(quick_strategy("s", 3, 100, 10_000, false), "down");

        let result: ResilienceResult<()> = orchestrator
            .execute("down", CancellationToken::new(), |_cancel| async {
                Err(ResilienceError::ServiceUnavailable {
                    message: "backend down".to_string(),
                    status_code: Some(503),
                })
            })
            .await;

        match result.unwrap_err() {
            ResilienceError::AttemptsExhausted {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "down");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected AttemptsExhausted, got {other:?}"),
        }

        let metrics = orchestrator.metrics().operation("down");
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.retried_calls, 2);
        assert!(metrics.last_failure_time.is_some());
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking() {
        let orchestrator =
            orchestrator_with(quick_strategy("s", 1, 2, 60_000, false), "breaker_test");

        let invocations = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let seen = Arc::clone(&invocations);
            let _ = orchestrator
                .execute("breaker_test", CancellationToken::new(), move |_cancel| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(ResilienceError::Transient {
                            message: "boom".to_string(),
                        })
                    }
                })
                .await;
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        let seen = Arc::clone(&invocations);
        let result: ResilienceResult<()> = orchestrator
            .execute("breaker_test", CancellationToken::new(), move |_cancel| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::CircuitOpen { .. }
        ));
        // The protected callable was not touched by the rejected call.
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        let metrics = orchestrator.metrics().operation("breaker_test");
        assert_eq!(metrics.circuit_rejections, 1);
        assert_eq!(metrics.total_calls, 2);
    }

    #[tokio::test]
    async fn retry_loop_stops_when_its_own_failures_open_the_breaker() {
        // Threshold below the attempt budget: the loop must bail early.
        let orchestrator = orchestrator_with(quick_strategy("s", 10, 2, 60_000, false), "hot");

        let invocations = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&invocations);
        let result: ResilienceResult<()> = orchestrator
            .execute("hot", CancellationToken::new(), move |_cancel| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(ResilienceError::Transient {
                        message: "boom".to_string(),
                    })
                }
            })
            .await;

        match result.unwrap_err() {
            ResilienceError::AttemptsExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, ResilienceError::CircuitOpen { .. }));
            }
            other => panic!("expected AttemptsExhausted, got {other:?}"),
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        let metrics = orchestrator.metrics().operation("hot");
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.circuit_rejections, 0);
    }

    #[tokio::test]
    async fn fallback_serves_degraded_response() {
        let orchestrator = orchestrator_with(quick_strategy("s", 2, 100, 10_000, true), "soft");

        let outcome = orchestrator
            .execute_with_fallback(
                "soft",
                CancellationToken::new(),
                |_cancel| async {
                    Err::<String, _>(ResilienceError::ServiceUnavailable {
                        message: "backend down".to_string(),
                        status_code: Some(503),
                    })
                },
                || "cached summary".to_string(),
            )
            .await
            .expect("fallback should mask the failure");

        assert!(outcome.fallback_used);
        assert_eq!(outcome.service_status, HealthStatus::Degraded);
        assert_eq!(outcome.service_status.as_str(), "degraded");
        assert_eq!(outcome.value, "cached summary");
    }

    #[tokio::test]
    async fn fallback_disabled_propagates_error() {
        let orchestrator = orchestrator_with(quick_strategy("s", 2, 100, 10_000, false), "hard");

        let result = orchestrator
            .execute_with_fallback(
                "hard",
                CancellationToken::new(),
                |_cancel| async {
                    Err::<String, _>(ResilienceError::Transient {
                        message: "boom".to_string(),
                    })
                },
                || "unused".to_string(),
            )
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::AttemptsExhausted { .. }
        ));
    }

    #[tokio::test]
    async fn fallback_not_used_on_success() {
        let orchestrator = DefaultResilienceOrchestrator::with_defaults();

        let outcome = orchestrator
            .execute_with_fallback(
                "fine",
                CancellationToken::new(),
                |_cancel| async { Ok("primary".to_string()) },
                || "unused".to_string(),
            )
            .await
            .unwrap();

        assert!(!outcome.fallback_used);
        assert_eq!(outcome.service_status, HealthStatus::Healthy);
        assert_eq!(outcome.value, "primary");
    }

    #[tokio::test]
    async fn cancellation_during_backoff_wakes_immediately() {
        let strategy = Strategy::custom(
            "slow_retry",
            RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(60),
                jitter_factor: 0.0,
                enabled: true,
            },
            CircuitBreakerConfig::default(),
            false,
        );
        let orchestrator = orchestrator_with(strategy, "sleepy");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: ResilienceResult<()> = orchestrator
            .execute("sleepy", cancel, |_cancel| async {
                Err(ResilienceError::Transient {
                    message: "boom".to_string(),
                })
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::Cancelled { .. }
        ));
        // The 30s backoff must not have been slept through.
        assert!(started.elapsed() < Duration::from_secs(5));

        // A cancelled call is not a breaker failure beyond the one recorded
        // for the failed attempt itself.
        let metrics = orchestrator.metrics().operation("sleepy");
        assert_eq!(metrics.failed_calls, 0);
        assert_eq!(metrics.total_calls, 1);
    }

    #[tokio::test]
    async fn cancellation_before_first_attempt() {
        let orchestrator = DefaultResilienceOrchestrator::with_defaults();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let invocations = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&invocations);
        let result: ResilienceResult<()> = orchestrator
            .execute("early", cancel, move |_cancel| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ResilienceError::Cancelled { .. }
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.breakers().get("early").unwrap().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reload_swaps_strategy_table_wholesale() {
        let orchestrator = DefaultResilienceOrchestrator::with_defaults();
        assert_eq!(orchestrator.strategies().resolve("sentiment").name(), "balanced");

        let reloaded = StrategyRegistry::builder()
            .route("sentiment", "aggressive")
            .build()
            .unwrap();
        orchestrator.reload_strategies(reloaded);

        assert_eq!(
            orchestrator.strategies().resolve("sentiment").name(),
            "aggressive"
        );
    }

    #[tokio::test]
    async fn builder_accepts_injected_randomness() {
        struct Midpoint;
        impl RandomSource for Midpoint {
            fn next_unit(&self) -> f64 {
                0.5
            }
        }

        let orchestrator = DefaultResilienceOrchestrator::builder()
            .strategies(StrategyRegistry::with_defaults())
            .random_source(Arc::new(Midpoint))
            .build();

        let result = orchestrator
            .execute("test", CancellationToken::new(), |_cancel| async { Ok(1) })
            .await;
        assert_eq!(result.unwrap(), 1);
    }
}
