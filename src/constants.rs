//! # System Constants
//!
//! Closed enums for execution status, step priority and provider health, plus the
//! default operating limits of the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle events published by the coordinator
pub mod events {
    pub const EXECUTION_QUEUED: &str = "execution.queued";
    pub const EXECUTION_STARTED: &str = "execution.started";
    pub const EXECUTION_PAUSED: &str = "execution.paused";
    pub const EXECUTION_RESUMED: &str = "execution.resumed";
    pub const EXECUTION_FINISHED: &str = "execution.finished";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRYING: &str = "step.retrying";
    pub const CAPACITY_CHANGED: &str = "coordinator.capacity_changed";
    pub const PROVIDER_HEALTH_CHANGED: &str = "provider.health_changed";
}

/// Default operating limits
pub mod system {
    pub const DEFAULT_MAX_CONCURRENT_WORKFLOWS: usize = 10;
    pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
    pub const DEFAULT_STEP_TIMEOUT_SECONDS: f64 = 30.0;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_GLOBAL_TIMEOUT_SECONDS: f64 = 300.0;
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 60_000;
    pub const MAX_PROVIDER_ALERTS: usize = 10;
    /// Weight kept from the previous response-time average on each observation
    pub const RESPONSE_TIME_DECAY: f64 = 0.9;
    pub const LOAD_DECAY_PER_CALL: f64 = 0.1;
    pub const LOAD_PENALTY_ON_FAILURE: f64 = 0.5;
}

/// Status of one workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Queued, waiting for admission
    Pending,
    /// Admitted and executing waves
    Running,
    /// All steps done and success criteria met
    Completed,
    /// Aborted by a step failure, a fatal error or the global timeout
    Failed,
    /// Halted between waves until resumed
    Paused,
    /// Cancelled by a caller
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States that count as "in flight" for queries and cancellation
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Legal transitions of the execution state machine
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Failed)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

/// Ordinal priority of steps and execution requests
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            _ => Err(format!("Invalid priority level: {value}")),
        }
    }
}

/// Provider health as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}
