#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Conductor Core
//!
//! Workflow coordination engine for fleets of independent capability providers.
//!
//! ## Overview
//!
//! A workflow is a directed acyclic graph of steps, each naming a provider, an
//! operation and an input payload. The coordinator validates workflows, admits their
//! executions through a bounded priority queue, runs each execution wave by wave with
//! a cap on concurrently running executions, and shields the system from misbehaving
//! providers with per-provider circuit breakers, retries with exponential backoff and
//! periodic health checks.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`constants`] - Execution status, priority and health enums plus defaults
//! - [`error`] - Structured error handling
//! - [`events`] - Broadcast lifecycle events
//! - [`logging`] - Structured logging setup and helpers
//! - [`models`] - Workflow definitions, execution results and provider health
//! - [`orchestration`] - Catalog, resolver, step executor, engine and coordinator
//! - [`registry`] - Provider contract and registry
//! - [`resilience`] - Circuit breaker
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use conductor_core::{
//!     CoordinatorConfig, Payload, Priority, Provider, ProviderError, StepSpec,
//!     WorkflowCoordinator, WorkflowSpec,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Provider for Echo {
//!     async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
//!         Ok(input)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = WorkflowCoordinator::new(CoordinatorConfig::default())?;
//! coordinator.register_provider("echo", Arc::new(Echo));
//!
//! let workflow_id = coordinator.create_workflow(
//!     "greeting",
//!     "echo twice",
//!     WorkflowSpec::new(vec![
//!         StepSpec::new("first", "echo", "say"),
//!         StepSpec::new("second", "echo", "say").depends_on(["first"]),
//!     ]),
//! )?;
//!
//! let execution_id = coordinator.execute_workflow(workflow_id, Payload::new(), Priority::High)?;
//! let status = coordinator.get_status(execution_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod resilience;

pub use config::{ConfigManager, CoordinatorConfig};
pub use constants::{ExecutionStatus, HealthStatus, Priority};
pub use error::{CoordinatorError, Result, StepFailure};
pub use events::{CoordinatorEvent, EventPublisher};
pub use models::{
    ExecutionResult, HealthCheckReport, Payload, StepSpec, SuccessCriteria, WorkflowDefinition,
    WorkflowSpec,
};
pub use orchestration::{SystemMetrics, WorkflowCoordinator};
pub use registry::{Provider, ProviderError};
pub use resilience::{CircuitBreaker, CircuitState};
