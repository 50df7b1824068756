//! Named resilience strategies and the operation routing table.
//!
//! A strategy bundles a retry configuration, a circuit breaker
//! configuration, and a fallback policy under one name. Four built-in
//! presets cover the usual trade-offs; custom strategies can be registered
//! alongside them. Operations are routed to strategies through a table that
//! is resolved once at build time, so lookups are a single map hit and the
//! registry is read-only afterwards.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::errors::{ResilienceError, ResilienceResult};
use crate::retry::RetryConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Built-in strategy presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Fast to open, few retries; favors quick failure signaling
    Aggressive,
    /// Moderate thresholds and retries; the general-purpose default
    Balanced,
    /// Slow to open, generous retries; favors availability
    Conservative,
    /// Minimal retries, very low threshold; protects latency-sensitive paths
    Critical,
}

impl StrategyKind {
    /// All built-in presets.
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Aggressive,
        StrategyKind::Balanced,
        StrategyKind::Conservative,
        StrategyKind::Critical,
    ];

    /// Canonical name of the preset.
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Aggressive => "aggressive",
            StrategyKind::Balanced => "balanced",
            StrategyKind::Conservative => "conservative",
            StrategyKind::Critical => "critical",
        }
    }

    /// Parses a preset name; returns `None` for custom names.
    pub fn parse(name: &str) -> Option<StrategyKind> {
        match name {
            "aggressive" => Some(StrategyKind::Aggressive),
            "balanced" => Some(StrategyKind::Balanced),
            "conservative" => Some(StrategyKind::Conservative),
            "critical" => Some(StrategyKind::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named bundle of retry, circuit breaker, and fallback policy.
///
/// Immutable once constructed; the registry hands out shared references.
#[derive(Debug, Clone)]
pub struct Strategy {
    name: String,
    /// Retry configuration applied by the orchestrator's attempt loop
    pub retry: RetryConfig,
    /// Circuit breaker configuration used when the operation's breaker is created
    pub circuit_breaker: CircuitBreakerConfig,
    /// Whether a caller-supplied fallback may stand in for a failed call
    pub fallback_enabled: bool,
}

impl Strategy {
    /// Builds the named built-in preset.
    pub fn builtin(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Aggressive => Self::aggressive(),
            StrategyKind::Balanced => Self::balanced(),
            StrategyKind::Conservative => Self::conservative(),
            StrategyKind::Critical => Self::critical(),
        }
    }

    /// Low threshold, few retries, short recovery window.
    pub fn aggressive() -> Self {
        Self {
            name: StrategyKind::Aggressive.as_str().to_string(),
            retry: RetryConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(2),
                jitter_factor: 0.2,
                enabled: true,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(15),
                half_open_max_calls: 1,
                enabled: true,
            },
            fallback_enabled: true,
        }
    }

    /// General-purpose defaults; the fallback for unrouted operations.
    pub fn balanced() -> Self {
        Self {
            name: StrategyKind::Balanced.as_str().to_string(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            fallback_enabled: true,
        }
    }

    /// High threshold, generous retries, long recovery window.
    pub fn conservative() -> Self {
        Self {
            name: StrategyKind::Conservative.as_str().to_string(),
            retry: RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                jitter_factor: 0.3,
                enabled: true,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 8,
                recovery_timeout: Duration::from_secs(60),
                half_open_max_calls: 3,
                enabled: true,
            },
            fallback_enabled: true,
        }
    }

    /// No retries, very low threshold, no fallback; fail fast and loud.
    pub fn critical() -> Self {
        Self {
            name: StrategyKind::Critical.as_str().to_string(),
            retry: RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                jitter_factor: 0.1,
                enabled: true,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(10),
                half_open_max_calls: 1,
                enabled: true,
            },
            fallback_enabled: false,
        }
    }

    /// Creates a custom strategy under `name`.
    pub fn custom(
        name: impl Into<String>,
        retry: RetryConfig,
        circuit_breaker: CircuitBreakerConfig,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            name: name.into(),
            retry,
            circuit_breaker,
            fallback_enabled,
        }
    }

    /// Name this strategy is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the bundled configurations.
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.name.is_empty() {
            return Err(ResilienceError::Configuration {
                message: "strategy name must not be empty".to_string(),
            });
        }
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Read-only mapping from operation names to strategies.
///
/// Built once, never mutated in place; configuration reloads construct a
/// fresh registry and swap it wholesale.
#[derive(Debug)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<Strategy>>,
    routes: HashMap<String, Arc<Strategy>>,
    default: Arc<Strategy>,
}

impl StrategyRegistry {
    /// Creates a builder pre-loaded with the four built-in presets.
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::new()
    }

    /// Registry with the built-in presets, no routes, and `balanced` default.
    pub fn with_defaults() -> Self {
        let strategies: HashMap<String, Arc<Strategy>> = StrategyKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), Arc::new(Strategy::builtin(*kind))))
            .collect();
        let default = Arc::clone(&strategies[StrategyKind::Balanced.as_str()]);
        Self {
            strategies,
            routes: HashMap::new(),
            default,
        }
    }

    /// Resolves the strategy for an operation in O(1).
    ///
    /// Operations without an explicit route use the default strategy.
    pub fn resolve(&self, operation: &str) -> Arc<Strategy> {
        self.routes
            .get(operation)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    /// Looks up a registered strategy by name.
    pub fn strategy(&self, name: &str) -> Option<Arc<Strategy>> {
        self.strategies.get(name).map(Arc::clone)
    }

    /// The strategy used for unrouted operations.
    pub fn default_strategy(&self) -> Arc<Strategy> {
        Arc::clone(&self.default)
    }

    /// Number of explicit operation routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Builder for [`StrategyRegistry`].
pub struct StrategyRegistryBuilder {
    strategies: HashMap<String, Strategy>,
    routes: Vec<(String, String)>,
    default_name: String,
}

impl StrategyRegistryBuilder {
    /// Starts from the four built-in presets with `balanced` as default.
    pub fn new() -> Self {
        let strategies = StrategyKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), Strategy::builtin(*kind)))
            .collect();
        Self {
            strategies,
            routes: Vec::new(),
            default_name: StrategyKind::Balanced.as_str().to_string(),
        }
    }

    /// Registers a strategy, replacing any existing one with the same name.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.insert(strategy.name().to_string(), strategy);
        self
    }

    /// Routes an operation name to a strategy name.
    pub fn route(mut self, operation: impl Into<String>, strategy_name: impl Into<String>) -> Self {
        self.routes.push((operation.into(), strategy_name.into()));
        self
    }

    /// Sets the strategy used for unrouted operations.
    pub fn default_strategy(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Validates every strategy and route, then builds the registry.
    pub fn build(self) -> ResilienceResult<StrategyRegistry> {
        let mut strategies = HashMap::with_capacity(self.strategies.len());
        for (name, strategy) in self.strategies {
            strategy.validate()?;
            strategies.insert(name, Arc::new(strategy));
        }

        let default = strategies
            .get(&self.default_name)
            .map(Arc::clone)
            .ok_or_else(|| ResilienceError::Configuration {
                message: format!("default strategy `{}` is not registered", self.default_name),
            })?;

        let mut routes = HashMap::with_capacity(self.routes.len());
        for (operation, strategy_name) in self.routes {
            let strategy =
                strategies
                    .get(&strategy_name)
                    .map(Arc::clone)
                    .ok_or_else(|| ResilienceError::Configuration {
                        message: format!(
                            "operation `{operation}` routes to unknown strategy `{strategy_name}`"
                        ),
                    })?;
            routes.insert(operation, strategy);
        }

        Ok(StrategyRegistry {
            strategies,
            routes,
            default,
        })
    }
}

impl Default for StrategyRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
