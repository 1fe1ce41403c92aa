//! # Error Types
//!
//! Structured errors for the coordinator. [`CoordinatorError`] is returned by the
//! management API; [`StepFailure`] describes why a single step invocation failed and
//! drives the retry and stop-on-error decisions of the execution engine.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::constants::ExecutionStatus;

/// Errors surfaced by the coordinator's management API and execution engine
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error("Workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: Uuid },

    #[error("Invalid workflow definition: {reason}")]
    InvalidWorkflow { reason: String },

    #[error("Circular dependency detected between steps: {steps:?}")]
    CircularDependency { steps: Vec<String> },

    #[error("Provider not registered: {provider_id}")]
    UnknownProvider { provider_id: String },

    #[error("Provider '{provider_id}' does not support operation '{operation}'")]
    UnknownOperation {
        provider_id: String,
        operation: String,
    },

    #[error("Execution queue is full ({capacity} pending executions)")]
    QueueFull { capacity: usize },

    #[error("Invalid execution state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Invalid coordinator state: {0}")]
    InvalidState(String),

    #[error("Workflow exceeded its global timeout of {timeout:?}")]
    GlobalTimeout { timeout: Duration },

    #[error("Step '{step_id}' failed: {failure}")]
    StepFailed { step_id: String, failure: StepFailure },

    #[error("Workflow success criteria not met: {reason}")]
    SuccessCriteriaNotMet { reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoordinatorError {
    /// Whether this error aborts an execution regardless of its error-handling policy
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CircularDependency { .. }
            | Self::UnknownProvider { .. }
            | Self::UnknownOperation { .. } => true,
            Self::StepFailed { failure, .. } => failure.is_fatal(),
            _ => false,
        }
    }
}

impl From<ConfigurationError> for CoordinatorError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Why a single step invocation failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepFailure {
    #[error("provider '{provider_id}' is not registered")]
    UnknownProvider { provider_id: String },

    #[error("provider '{provider_id}' does not support operation '{operation}'")]
    UnknownOperation {
        provider_id: String,
        operation: String,
    },

    #[error("circuit breaker is open for provider '{provider_id}'")]
    CircuitOpen { provider_id: String },

    #[error("operation '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("operation '{operation}' failed: {message}")]
    ProviderFailed { operation: String, message: String },

    #[error("operation '{operation}' rejected its input: {message}")]
    InvalidInput { operation: String, message: String },
}

impl StepFailure {
    /// Fatal failures abort the whole execution regardless of `stop_on_error`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider { .. } | Self::UnknownOperation { .. }
        )
    }

    /// Retryable failures go through the step executor's exponential backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ProviderFailed { .. })
    }

    /// Short machine-readable category used in logs and events
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Timeout { .. } => "timeout",
            Self::ProviderFailed { .. } => "provider_failed",
            Self::InvalidInput { .. } => "invalid_input",
        }
    }
}
