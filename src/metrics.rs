//! In-memory resilience metrics and the health snapshot reporter.
//!
//! Counters are mutated only by the orchestrator, one record per operation
//! plus a global rollup. Each record sits behind its own lock, so a reader
//! takes a consistent copy per operation without any global lock; different
//! operations may be observed at slightly different instants, which is fine
//! because no invariant spans operations.

use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Counters for a single operation (or the global rollup).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationMetrics {
    /// Calls that made at least one attempt (rejections excluded)
    pub total_calls: u64,
    /// Calls that ultimately returned a result
    pub successful_calls: u64,
    /// Calls that exhausted their attempts
    pub failed_calls: u64,
    /// Individual retry attempts scheduled beyond first calls
    pub retried_calls: u64,
    /// Calls rejected by an open circuit without an attempt
    pub circuit_rejections: u64,
    /// When the operation last recorded a final failure
    pub last_failure_time: Option<DateTime<Utc>>,
}

/// Per-operation counter registry with a global rollup.
#[derive(Default)]
pub struct ResilienceMetrics {
    operations: RwLock<HashMap<String, Arc<Mutex<OperationMetrics>>>>,
    global: Mutex<OperationMetrics>,
}

impl ResilienceMetrics {
    /// Creates an empty metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, operation: &str) -> Arc<Mutex<OperationMetrics>> {
        if let Some(record) = self.operations.read().get(operation) {
            return Arc::clone(record);
        }
        let mut operations = self.operations.write();
        Arc::clone(
            operations
                .entry(operation.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(OperationMetrics::default()))),
        )
    }

    /// Records a call that returned a result.
    pub fn record_success(&self, operation: &str) {
        let record = self.entry(operation);
        {
            let mut metrics = record.lock();
            metrics.total_calls += 1;
            metrics.successful_calls += 1;
        }
        let mut global = self.global.lock();
        global.total_calls += 1;
        global.successful_calls += 1;
    }

    /// Records a call that exhausted its attempts.
    pub fn record_failure(&self, operation: &str) {
        let now = Utc::now();
        let record = self.entry(operation);
        {
            let mut metrics = record.lock();
            metrics.total_calls += 1;
            metrics.failed_calls += 1;
            metrics.last_failure_time = Some(now);
        }
        let mut global = self.global.lock();
        global.total_calls += 1;
        global.failed_calls += 1;
        global.last_failure_time = Some(now);
    }

    /// Records one retry attempt scheduled for the operation.
    pub fn record_retry(&self, operation: &str) {
        let record = self.entry(operation);
        record.lock().retried_calls += 1;
        self.global.lock().retried_calls += 1;
    }

    /// Records a rejection by an open circuit (no attempt was made).
    pub fn record_rejection(&self, operation: &str) {
        let record = self.entry(operation);
        record.lock().circuit_rejections += 1;
        self.global.lock().circuit_rejections += 1;
    }

    /// Records a call abandoned by caller cancellation.
    pub fn record_cancellation(&self, operation: &str) {
        let record = self.entry(operation);
        record.lock().total_calls += 1;
        self.global.lock().total_calls += 1;
    }

    /// Copy of one operation's counters (zeroed if never seen).
    pub fn operation(&self, operation: &str) -> OperationMetrics {
        self.operations
            .read()
            .get(operation)
            .map(|record| record.lock().clone())
            .unwrap_or_default()
    }

    /// Copy of the global rollup.
    pub fn global(&self) -> OperationMetrics {
        self.global.lock().clone()
    }

    /// Consistent per-operation copies of every record.
    pub fn snapshot(&self) -> HashMap<String, OperationMetrics> {
        self.operations
            .read()
            .iter()
            .map(|(name, record)| (name.clone(), record.lock().clone()))
            .collect()
    }

    /// Clears all counters (tests/ops).
    pub fn reset(&self) {
        self.operations.write().clear();
        *self.global.lock() = OperationMetrics::default();
    }
}

/// Overall service health derived from circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No breaker is open
    Healthy,
    /// At least one breaker is open; fallbacks may be serving
    Degraded,
}

impl HealthStatus {
    /// Stable label for responses and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation's metrics together with its circuit state.
#[derive(Debug, Clone, Serialize)]
pub struct OperationHealth {
    /// Counter snapshot for the operation
    pub metrics: OperationMetrics,
    /// Circuit state at snapshot time
    pub circuit_state: CircuitState,
}

/// Point-in-time view of the whole resilience layer.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Degraded when any breaker is open, healthy otherwise
    pub status: HealthStatus,
    /// Per-operation metrics and circuit states
    pub operations: HashMap<String, OperationHealth>,
    /// Rollup across all operations
    pub global: OperationMetrics,
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
}

/// Combines the metrics registry and breaker registry into health snapshots.
///
/// Read-only; intended for an external health-check component. An open
/// breaker signals DEGRADED, never worse — graceful degradation is the
/// design goal, so this layer alone never reports a hard failure.
pub struct HealthReporter {
    metrics: Arc<ResilienceMetrics>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl HealthReporter {
    /// Creates a reporter over the given registries.
    pub fn new(metrics: Arc<ResilienceMetrics>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { metrics, breakers }
    }

    /// Takes a consistent per-operation snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        let per_operation = self.metrics.snapshot();
        let states = self.breakers.states();

        let mut operations: HashMap<String, OperationHealth> =
            HashMap::with_capacity(per_operation.len().max(states.len()));

        for (name, metrics) in per_operation {
            let circuit_state = states.get(&name).copied().unwrap_or(CircuitState::Closed);
            operations.insert(
                name,
                OperationHealth {
                    metrics,
                    circuit_state,
                },
            );
        }
        // Breakers can exist for operations whose counters were reset.
        for (name, state) in states {
            operations.entry(name).or_insert(OperationHealth {
                metrics: OperationMetrics::default(),
                circuit_state: state,
            });
        }

        let status = if operations
            .values()
            .any(|op| op.circuit_state == CircuitState::Open)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthSnapshot {
            status,
            operations,
            global: self.metrics.global(),
            generated_at: Utc::now(),
        }
    }
}
