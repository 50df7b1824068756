//! Observability for the resilience layer.
//!
//! The orchestrator and circuit breaker emit structured `tracing` events on
//! retries, state transitions, rejections, and fallbacks; this module
//! provides the subscriber configuration that turns those events into log
//! output. Counter aggregation lives in [`crate::metrics`].

mod logging;

pub use logging::{LogFormat, LogLevel, LoggingConfig, LOG_FORMAT_ENV, LOG_LEVEL_ENV};
