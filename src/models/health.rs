//! Provider Health
//!
//! Rolling health record kept for each registered provider. Updated by the step
//! executor after every call and by the health monitor after every check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::constants::{system, HealthStatus};

/// What a provider reports from its own health check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub status: HealthStatus,
    #[serde(default)]
    pub resource_usage: HashMap<String, f64>,
}

impl HealthCheckReport {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn unhealthy() -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            resource_usage: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Exponential moving average of call latency, in seconds
    pub response_time: f64,
    pub error_rate: f64,
    pub load: f64,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub resource_usage: HashMap<String, f64>,
    pub alerts: VecDeque<HealthAlert>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_heartbeat: None,
            response_time: 0.0,
            error_rate: 0.0,
            load: 0.0,
            total_calls: 0,
            failed_calls: 0,
            resource_usage: HashMap::new(),
            alerts: VecDeque::new(),
        }
    }
}

impl ProviderHealth {
    /// Fold one completed provider call into the rolling statistics
    pub fn record_call(&mut self, elapsed: Duration, success: bool) {
        self.total_calls += 1;
        if !success {
            self.failed_calls += 1;
        }

        self.response_time = self.response_time * system::RESPONSE_TIME_DECAY
            + elapsed.as_secs_f64() * (1.0 - system::RESPONSE_TIME_DECAY);
        self.error_rate = self.failed_calls as f64 / self.total_calls as f64;

        self.load = (self.load - system::LOAD_DECAY_PER_CALL).max(0.0);
        if !success {
            self.load += system::LOAD_PENALTY_ON_FAILURE;
        }
    }

    /// Apply a successful health check
    pub fn record_check(&mut self, report: HealthCheckReport, elapsed: Duration) {
        self.status = report.status;
        self.last_heartbeat = Some(Utc::now());
        self.response_time = elapsed.as_secs_f64();
        self.resource_usage = report.resource_usage;
    }

    /// Apply a failed or timed-out health check
    pub fn record_check_failure(&mut self, message: impl Into<String>, max_alerts: usize) {
        self.status = HealthStatus::Unhealthy;
        self.push_alert(message, max_alerts);
    }

    pub fn push_alert(&mut self, message: impl Into<String>, max_alerts: usize) {
        self.alerts.push_back(HealthAlert {
            message: message.into(),
            raised_at: Utc::now(),
        });
        while self.alerts.len() > max_alerts {
            self.alerts.pop_front();
        }
    }
}
