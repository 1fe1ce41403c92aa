//! Circuit breaker metrics snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CircuitState;

/// Lifetime counters of one circuit breaker plus derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub current_state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls refused without reaching the provider
    pub rejected_calls: u64,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub failure_rate: f64,
    pub success_rate: f64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            current_state: CircuitState::Closed,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            consecutive_failures: 0,
            last_failure_at: None,
            total_duration: Duration::ZERO,
            average_duration: Duration::ZERO,
            failure_rate: 0.0,
            success_rate: 0.0,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
