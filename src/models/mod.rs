pub mod execution;
pub mod health;
pub mod workflow;

// Re-export core models for easy access
pub use execution::{error_payload, ExecutionError, ExecutionResult};
pub use health::{HealthAlert, HealthCheckReport, ProviderHealth};
pub use workflow::{
    ErrorHandling, Payload, StepSpec, SuccessCriteria, WorkflowDefinition, WorkflowSpec,
    WorkflowStep,
};
