//! # Orchestration Engine
//!
//! Workflow coordination: validating workflow graphs, resolving which steps can run,
//! executing steps against providers and scheduling whole executions under a
//! concurrency cap.
//!
//! ## Core Components
//!
//! - **WorkflowCatalog**: Validates workflow specs and stores immutable definitions
//! - **DependencyResolver**: Ready-set computation and cycle detection
//! - **StepExecutor**: One step, through the provider's circuit breaker, with retries
//! - **ExecutionEngine**: Priority admission queue, waves, pause/cancel and history
//! - **MetricsCollector**: Execution counters, throughput and performance samples
//! - **WorkflowCoordinator**: Management API and owner of the background loops
//!
//! ```text
//! WorkflowCoordinator
//! ├── WorkflowCatalog ── DependencyResolver
//! ├── ExecutionEngine ── StepExecutor ── ProviderRegistry ── CircuitBreaker
//! ├── MetricsCollector
//! ├── HealthMonitor   (loop)
//! └── AutoScaler      (loop)
//! ```

pub mod catalog;
pub mod coordinator;
pub mod dependency_resolver;
pub mod execution_engine;
pub mod metrics;
pub mod step_executor;

pub use catalog::WorkflowCatalog;
pub use coordinator::monitor::{HealthCycleReport, HealthMonitor};
pub use coordinator::scaling::{AutoScaler, ScalingAction};
pub use coordinator::{SystemMetrics, WorkflowCoordinator};
pub use dependency_resolver::DependencyResolver;
pub use execution_engine::{ExecutionControl, ExecutionEngine, ShutdownReport};
pub use metrics::{MetricsCollector, MetricsSnapshot, PerformanceSample};
pub use step_executor::StepExecutor;
