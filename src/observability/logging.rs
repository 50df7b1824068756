//! `tracing` subscriber configuration.
//!
//! The resilience layer emits its events through `tracing`; this module
//! configures the subscriber that renders them. Level and format can come
//! from the environment so deployments tune verbosity without a rebuild,
//! the same way operation routes do in [`crate::config`].

use crate::errors::{ResilienceError, ResilienceResult};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the minimum log level.
pub const LOG_LEVEL_ENV: &str = "RESILIENCE_LOG_LEVEL";

/// Environment variable naming the log output format.
pub const LOG_FORMAT_ENV: &str = "RESILIENCE_LOG_FORMAT";

/// Minimum level of events the subscriber keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Everything, including per-attempt breaker bookkeeping
    Trace,
    /// Retry scheduling and circuit state transitions
    Debug,
    /// Lifecycle events only
    Info,
    /// Opened circuits, exhausted retries, served fallbacks
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Parses a level name as it appears in the environment.
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Rendering applied to captured events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    Pretty,
    /// One JSON object per event for log pipelines
    Json,
    /// Single-line output for space-constrained environments
    Compact,
}

impl LogFormat {
    /// Parses a format name as it appears in the environment.
    pub fn parse(name: &str) -> Option<LogFormat> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

/// Subscriber configuration for the resilience layer's events.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level of events to keep
    pub level: LogLevel,
    /// Rendering applied to kept events
    pub format: LogFormat,
    /// Whether events carry their module path
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Configuration with info-level pretty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads level and format from the environment.
    ///
    /// Unset variables leave the defaults in place; unrecognized values are
    /// a configuration error rather than being silently ignored.
    pub fn from_env() -> ResilienceResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(LOG_LEVEL_ENV) {
            config.level =
                LogLevel::parse(&raw).ok_or_else(|| ResilienceError::Configuration {
                    message: format!("unrecognized log level `{raw}` in {LOG_LEVEL_ENV}"),
                })?;
        }

        if let Ok(raw) = std::env::var(LOG_FORMAT_ENV) {
            config.format =
                LogFormat::parse(&raw).ok_or_else(|| ResilienceError::Configuration {
                    message: format!("unrecognized log format `{raw}` in {LOG_FORMAT_ENV}"),
                })?;
        }

        Ok(config)
    }

    /// Sets the minimum level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether events carry their module path.
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Installs the global subscriber. Call once at process start.
    ///
    /// `RUST_LOG` directives still apply on top of the configured level, so
    /// a single module can be turned up without touching the rest.
    pub fn init(self) -> ResilienceResult<()> {
        let filter = EnvFilter::from_default_env().add_directive(self.level.filter().into());
        let base = fmt::layer().with_target(self.include_target);

        let installed = match self.format {
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(base.pretty())
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(base.json())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(filter)
                .with(base.compact())
                .try_init(),
        };

        installed.map_err(|err| ResilienceError::Configuration {
            message: format!("failed to install tracing subscriber: {err}"),
        })
    }
}
