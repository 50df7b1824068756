//! Configuration for the resilience layer.
//!
//! `ResilienceSettings` is the configuration collaborator: it is validated
//! up front and turned into a [`StrategyRegistry`] that the orchestrator
//! consumes. The orchestrator itself never touches the environment; only
//! [`ResilienceSettings::from_env`] does, at composition time.

use crate::errors::{ResilienceError, ResilienceResult};
use crate::strategy::{Strategy, StrategyKind, StrategyRegistry};
use std::collections::HashMap;

/// Environment variable naming the default strategy.
pub const DEFAULT_STRATEGY_ENV: &str = "RESILIENCE_DEFAULT_STRATEGY";

/// Environment variable carrying operation routes, e.g.
/// `summarize=balanced,sentiment=aggressive`.
pub const OPERATION_ROUTES_ENV: &str = "RESILIENCE_OPERATION_ROUTES";

/// Resolved resilience settings.
#[derive(Debug, Clone)]
pub struct ResilienceSettings {
    /// Strategy applied to operations without an explicit route
    pub default_strategy: String,
    /// Operation name to strategy name
    pub routes: HashMap<String, String>,
    /// Custom strategies registered alongside the built-in presets
    pub custom_strategies: Vec<Strategy>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Balanced.as_str().to_string(),
            routes: HashMap::new(),
            custom_strategies: Vec::new(),
        }
    }
}

impl ResilienceSettings {
    /// Creates settings with the built-in presets and no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a settings builder
    pub fn builder() -> ResilienceSettingsBuilder {
        ResilienceSettingsBuilder::default()
    }

    /// Creates settings from environment variables.
    ///
    /// Unset variables leave the defaults in place; malformed route entries
    /// are a configuration error rather than being silently skipped.
    pub fn from_env() -> ResilienceResult<Self> {
        let mut settings = Self::default();

        if let Ok(name) = std::env::var(DEFAULT_STRATEGY_ENV) {
            settings.default_strategy = name.trim().to_string();
        }

        if let Ok(raw) = std::env::var(OPERATION_ROUTES_ENV) {
            settings.routes = parse_routes(&raw)?;
        }

        Ok(settings)
    }

    /// Builds the read-only strategy registry the orchestrator consumes.
    pub fn build_registry(&self) -> ResilienceResult<StrategyRegistry> {
        let mut builder = StrategyRegistry::builder();
        for strategy in &self.custom_strategies {
            builder = builder.strategy(strategy.clone());
        }
        for (operation, strategy_name) in &self.routes {
            builder = builder.route(operation.clone(), strategy_name.clone());
        }
        builder.default_strategy(self.default_strategy.clone()).build()
    }
}

fn parse_routes(raw: &str) -> ResilienceResult<HashMap<String, String>> {
    let mut routes = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (operation, strategy) =
            entry
                .split_once('=')
                .ok_or_else(|| ResilienceError::Configuration {
                    message: format!(
                        "malformed route entry `{entry}` in {OPERATION_ROUTES_ENV}, expected `operation=strategy`"
                    ),
                })?;
        routes.insert(operation.trim().to_string(), strategy.trim().to_string());
    }
    Ok(routes)
}

/// Builder for [`ResilienceSettings`].
#[derive(Debug, Default)]
pub struct ResilienceSettingsBuilder {
    default_strategy: Option<String>,
    routes: HashMap<String, String>,
    custom_strategies: Vec<Strategy>,
}

impl ResilienceSettingsBuilder {
    /// Sets the default strategy name.
    pub fn default_strategy(mut self, name: impl Into<String>) -> Self {
        self.default_strategy = Some(name.into());
        self
    }

    /// Routes an operation to a strategy name.
    pub fn route(mut self, operation: impl Into<String>, strategy: impl Into<String>) -> Self {
        self.routes.insert(operation.into(), strategy.into());
        self
    }

    /// Adds a custom strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.custom_strategies.push(strategy);
        self
    }

    /// Builds the settings object.
    ///
    /// Validation of strategy parameters and route targets happens when the
    /// registry is built, so a settings object is cheap to construct and
    /// pass around.
    pub fn build(self) -> ResilienceSettings {
        ResilienceSettings {
            default_strategy: self
                .default_strategy
                .unwrap_or_else(|| StrategyKind::Balanced.as_str().to_string()),
            routes: self.routes,
            custom_strategies: self.custom_strategies,
        }
    }
}
