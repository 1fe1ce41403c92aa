//! Circuit breaker runtime configuration

use std::time::Duration;

use crate::constants::system;

/// Thresholds for a single circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call is admitted
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: system::DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_millis(system::DEFAULT_RECOVERY_TIMEOUT_MS),
        }
    }
}
