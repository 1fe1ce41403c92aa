//! # Coordinator Configuration
//!
//! YAML-backed configuration for the workflow coordinator. Every section has
//! defaults matching the coordinator's documented operating limits, so a config file
//! only needs to list the values it overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conductor_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let cap = manager.config().execution.max_concurrent_workflows;
//! let interval = manager.config().health.check_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::system;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring conductor-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Admission queue, concurrency cap, history and step defaults
    pub execution: ExecutionConfig,

    /// Retry backoff applied by the step executor
    pub backoff: BackoffConfig,

    /// Per-provider circuit breaker settings
    pub circuit_breakers: CircuitBreakerConfig,

    /// Provider health polling
    pub health: HealthConfig,

    /// Adaptive capacity control
    pub scaling: ScalingConfig,

    /// System metrics aggregation
    pub metrics: MetricsConfig,

    /// Lifecycle event channel
    pub events: EventsConfig,
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_concurrent_workflows: usize,
    pub max_queue_size: usize,
    pub history_capacity: usize,
    pub default_step_timeout_seconds: f64,
    pub default_max_retries: u32,
    pub default_global_timeout_seconds: f64,
    pub shutdown_timeout_seconds: u64,
}

impl ExecutionConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.default_step_timeout_seconds)
    }

    pub fn default_global_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.default_global_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: system::DEFAULT_MAX_CONCURRENT_WORKFLOWS,
            max_queue_size: system::DEFAULT_MAX_QUEUE_SIZE,
            history_capacity: system::DEFAULT_HISTORY_CAPACITY,
            default_step_timeout_seconds: system::DEFAULT_STEP_TIMEOUT_SECONDS,
            default_max_retries: system::DEFAULT_MAX_RETRIES,
            default_global_timeout_seconds: system::DEFAULT_GLOBAL_TIMEOUT_SECONDS,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Exponential retry backoff: `base_delay * multiplier^retry_count`, capped
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
}

impl BackoffConfig {
    /// Delay before retry number `retry_count` (1-based)
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry_count as i32);
        let delay_ms = (self.base_delay_ms as f64 * factor).round();
        let max_ms = self.max_backoff_seconds.saturating_mul(1000) as f64;
        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 300,
        }
    }
}

/// Circuit breaker configuration for provider calls
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Whether provider calls are routed through circuit breakers at all
    pub enabled: bool,

    /// Configuration applied to every provider without an override
    pub default_config: CircuitBreakerComponentConfig,

    /// Overrides keyed by provider id
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerConfig {
    /// Get configuration for a specific provider
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

/// Circuit breaker configuration for a single provider from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: system::DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_ms: system::DEFAULT_RECOVERY_TIMEOUT_MS,
        }
    }
}

/// Provider health polling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,
    pub check_timeout_ms: u64,
    pub max_alerts: usize,
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 30,
            check_timeout_ms: 5000,
            max_alerts: system::MAX_PROVIDER_ALERTS,
        }
    }
}

/// Additive auto-scaling of the concurrency cap
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Queue depth that must be exceeded before scaling up
    pub scale_up_queue_threshold: usize,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub min_concurrent_workflows: usize,
    pub max_concurrent_workflows: usize,
}

impl ScalingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 120,
            scale_up_queue_threshold: 5,
            scale_up_step: 2,
            scale_down_step: 1,
            min_concurrent_workflows: 5,
            max_concurrent_workflows: 50,
        }
    }
}

/// System metrics aggregation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the periodic performance sampler runs
    pub enabled: bool,
    pub collection_interval_seconds: u64,
    pub max_samples: usize,
    /// Number of most recent samples returned with system metrics
    pub trend_samples: usize,
    pub throughput_window_seconds: u64,
    /// Number of recent execution durations used for the average
    pub duration_window: usize,
}

impl MetricsConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_seconds)
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_seconds)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_seconds: 60,
            max_samples: 1000,
            trend_samples: 10,
            throughput_window_seconds: 60,
            duration_window: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl CoordinatorConfig {
    /// Validate configuration values that would otherwise fail at runtime
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.execution.max_concurrent_workflows == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_workflows",
                "0",
                "at least one concurrent workflow must be allowed",
            ));
        }

        if self.execution.max_queue_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_queue_size",
                "0",
                "queue size must be greater than 0",
            ));
        }

        if self.execution.history_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.history_capacity",
                "0",
                "history capacity must be greater than 0",
            ));
        }

        let representable = |seconds: f64| {
            seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok()
        };
        if !representable(self.execution.default_step_timeout_seconds)
            || !representable(self.execution.default_global_timeout_seconds)
        {
            return Err(ConfigurationError::invalid_value(
                "execution.default_*_timeout_seconds",
                format!(
                    "{}/{}",
                    self.execution.default_step_timeout_seconds,
                    self.execution.default_global_timeout_seconds
                ),
                "timeouts must be positive and representable as a duration",
            ));
        }

        if self.backoff.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.backoff_multiplier",
                self.backoff.backoff_multiplier.to_string(),
                "multiplier below 1.0 would shrink delays between attempts",
            ));
        }

        let breaker_configs = std::iter::once(("default_config", &self.circuit_breakers.default_config))
            .chain(
                self.circuit_breakers
                    .component_configs
                    .iter()
                    .map(|(name, config)| (name.as_str(), config)),
            );
        for (name, breaker) in breaker_configs {
            if breaker.failure_threshold == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("circuit_breakers.{name}.failure_threshold"),
                    "0",
                    "failure threshold must be greater than 0",
                ));
            }
        }

        if self.health.check_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.check_timeout_ms",
                "0",
                "health check timeout must be greater than 0",
            ));
        }

        if self.scaling.min_concurrent_workflows == 0
            || self.scaling.min_concurrent_workflows > self.scaling.max_concurrent_workflows
        {
            return Err(ConfigurationError::invalid_value(
                "scaling.min_concurrent_workflows",
                self.scaling.min_concurrent_workflows.to_string(),
                format!(
                    "must be between 1 and scaling.max_concurrent_workflows ({})",
                    self.scaling.max_concurrent_workflows
                ),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::missing_required_field(
                "events.channel_capacity",
                "events configuration",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.max_concurrent_workflows, 10);
        assert_eq!(config.circuit_breakers.default_config.failure_threshold, 5);
        assert_eq!(config.health.check_interval(), Duration::from_secs(30));
        assert_eq!(config.scaling.interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_default_backoff_is_power_of_two_seconds() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_retry(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = BackoffConfig {
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 5,
        };
        assert_eq!(backoff.delay_for_retry(10), Duration::from_secs(5));
    }

    #[test]
    fn test_component_override_lookup() {
        let mut config = CircuitBreakerConfig::default();
        config.component_configs.insert(
            "ocr".to_string(),
            CircuitBreakerComponentConfig {
                failure_threshold: 2,
                recovery_timeout_ms: 100,
            },
        );

        assert_eq!(config.config_for_component("ocr").failure_threshold, 2);
        assert_eq!(config.config_for_component("parser").failure_threshold, 5);

        let resilience = config.config_for_component("ocr").to_resilience_config();
        assert_eq!(resilience.recovery_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = CoordinatorConfig::default();
        config.execution.max_concurrent_workflows = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = CoordinatorConfig::default();
        config.scaling.min_concurrent_workflows = 60;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.backoff.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.execution.default_global_timeout_seconds = 1e30;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
