//! Shared fixtures for integration tests: mock providers, coordinator builders,
//! polling helpers and proptest strategies.

#![allow(dead_code)]

pub mod providers;
pub mod strategies;

use std::time::Duration;
use uuid::Uuid;

use conductor_core::{
    CoordinatorConfig, ExecutionResult, ExecutionStatus, WorkflowCoordinator,
};

pub use providers::*;

/// Configuration with background loops disabled and fast retries
pub fn test_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.execution.default_step_timeout_seconds = 2.0;
    config.execution.default_global_timeout_seconds = 10.0;
    config.execution.default_max_retries = 0;
    config.backoff.base_delay_ms = 5;
    config.backoff.backoff_multiplier = 2.0;
    config.backoff.max_backoff_seconds = 1;
    config.circuit_breakers.default_config.failure_threshold = 3;
    config.circuit_breakers.default_config.recovery_timeout_ms = 100;
    config.health.enabled = false;
    config.scaling.enabled = false;
    config.metrics.enabled = false;
    config
}

pub fn coordinator_with(config: CoordinatorConfig) -> WorkflowCoordinator {
    WorkflowCoordinator::new(config).expect("test configuration is valid")
}

pub fn test_coordinator() -> WorkflowCoordinator {
    coordinator_with(test_config())
}

/// Poll until the execution reaches a terminal state
pub async fn wait_for_terminal(coordinator: &WorkflowCoordinator, execution_id: Uuid) -> ExecutionResult {
    wait_for(coordinator, execution_id, |result| result.status.is_terminal()).await
}

/// Poll until the execution has `status`
pub async fn wait_for_status(
    coordinator: &WorkflowCoordinator,
    execution_id: Uuid,
    status: ExecutionStatus,
) -> ExecutionResult {
    wait_for(coordinator, execution_id, |result| result.status == status).await
}

pub async fn wait_for<F>(coordinator: &WorkflowCoordinator, execution_id: Uuid, predicate: F) -> ExecutionResult
where
    F: Fn(&ExecutionResult) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(result) = coordinator.get_status(execution_id) {
            if predicate(&result) {
                return result;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "execution {execution_id} did not reach the expected state in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until nothing is running or queued
pub async fn wait_until_idle(coordinator: &WorkflowCoordinator) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let metrics = coordinator.get_system_metrics();
        if metrics.active_executions == 0 && metrics.queue_size == 0 {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "coordinator did not become idle in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
