//! # Resilience Orchestration Layer
//!
//! Production-ready resilience orchestration for unreliable LLM inference
//! backends (or any slow remote dependency): circuit breaking, classified
//! retries with jittered exponential backoff, per-operation strategy
//! presets, and an in-memory health snapshot.
//!
//! ## Features
//!
//! - Per-operation circuit breakers (closed / open / half-open) with a
//!   bounded probe window during recovery
//! - Failure classification driving retry decisions and backoff
//!   amplification (rate-limited failures back off hardest)
//! - Four built-in strategy presets (`aggressive`, `balanced`,
//!   `conservative`, `critical`) plus custom strategies and an
//!   operation-to-strategy routing table
//! - Caller-supplied fallbacks producing honestly-tagged degraded responses
//! - Cancellation-aware retry sleeps via `CancellationToken`
//! - Per-operation metrics and a serializable health snapshot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_resilience::{DefaultResilienceOrchestrator, ResilienceOrchestrator};
//! use integrations_resilience::{ResilienceError, StrategyRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = StrategyRegistry::builder()
//!         .route("summarize", "balanced")
//!         .route("sentiment", "aggressive")
//!         .build()?;
//!     let orchestrator = DefaultResilienceOrchestrator::new(registry);
//!
//!     let summary = orchestrator
//!         .execute("summarize", CancellationToken::new(), |_cancel| async {
//!             // call the inference backend here
//!             Ok::<_, ResilienceError>("summary".to_string())
//!         })
//!         .await?;
//!
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `orchestrator` - The execution façade driving the retry loop
//! - `circuit_breaker` - Per-operation state machines and their registry
//! - `retry` - Backoff computation with injectable jitter randomness
//! - `strategy` - Named presets and the operation routing table
//! - `metrics` - Per-operation counters and the health snapshot
//! - `errors` - Error taxonomy and the failure classifier
//! - `config` - Validated settings producing a strategy registry
//! - `observability` - `tracing` subscriber configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod retry;
pub mod strategy;


// Re-exports for convenience
pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    OpenRejection,
};
pub use config::{ResilienceSettings, ResilienceSettingsBuilder};
pub use errors::{classify, FailureCategory, ResilienceError, ResilienceResult};
pub use metrics::{
    HealthReporter, HealthSnapshot, HealthStatus, OperationHealth, OperationMetrics,
    ResilienceMetrics,
};
pub use observability::{LogFormat, LogLevel, LoggingConfig};
pub use orchestrator::{
    DefaultResilienceOrchestrator, ExecutionOutcome, ResilienceOrchestrator,
    ResilienceOrchestratorBuilder,
};
pub use retry::{RandomSource, RetryConfig, RetryDecision, RetryPolicy, ThreadRngSource};
pub use strategy::{Strategy, StrategyKind, StrategyRegistry, StrategyRegistryBuilder};

/// The default maximum number of attempts, including the first call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The default delay before the first retry, in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// The default upper bound on any backoff delay, in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// The default jitter factor applied to backoff delays
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

/// The default number of consecutive failures before a breaker opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// The default time an open breaker waits before probing, in seconds
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 30;

/// The default number of trial calls admitted while half-open
pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 2;
