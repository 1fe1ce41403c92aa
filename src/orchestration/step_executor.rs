//! # Step Executor
//!
//! Runs one workflow step: builds its input, invokes the provider operation through
//! the provider's circuit breaker under the step timeout, retries transient failures
//! with exponential backoff and folds every completed call into the provider's
//! health record.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::BackoffConfig;
use crate::constants::events;
use crate::error::StepFailure;
use crate::events::EventPublisher;
use crate::logging::log_step_operation;
use crate::models::{Payload, WorkflowStep};
use crate::registry::{ProviderError, ProviderRegistry, RegisteredProvider};
use crate::resilience::CircuitBreakerError;

#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<ProviderRegistry>,
    backoff: BackoffConfig,
    events: EventPublisher,
}

impl StepExecutor {
    pub fn new(registry: Arc<ProviderRegistry>, backoff: BackoffConfig, events: EventPublisher) -> Self {
        Self {
            registry,
            backoff,
            events,
        }
    }

    /// Build the input of `step`: the workflow input, overlaid by the step's own
    /// input, overlaid by each dependency output under `"<dependency>_result"`
    pub fn merge_step_input(
        step: &WorkflowStep,
        accumulated: &BTreeMap<String, Value>,
        workflow_input: &Payload,
    ) -> Payload {
        let mut input = workflow_input.clone();
        input.extend(step.input.iter().map(|(k, v)| (k.clone(), v.clone())));

        for dependency in &step.dependencies {
            if let Some(result) = accumulated.get(dependency) {
                input.insert(format!("{dependency}_result"), result.clone());
            }
        }
        input
    }

    /// Execute `step` with input merged from the workflow input and prior results
    pub async fn execute(
        &self,
        execution_id: Option<Uuid>,
        step: &WorkflowStep,
        accumulated: &BTreeMap<String, Value>,
        workflow_input: &Payload,
    ) -> Result<Payload, StepFailure> {
        let input = Self::merge_step_input(step, accumulated, workflow_input);
        self.execute_with_input(execution_id, step, input).await
    }

    /// Execute `step` with an already-built input, retrying retryable failures
    #[instrument(skip(self, step, input), fields(step_id = %step.step_id, provider_id = %step.provider_id))]
    pub async fn execute_with_input(
        &self,
        execution_id: Option<Uuid>,
        step: &WorkflowStep,
        input: Payload,
    ) -> Result<Payload, StepFailure> {
        let provider = self
            .registry
            .get(&step.provider_id)
            .ok_or_else(|| StepFailure::UnknownProvider {
                provider_id: step.provider_id.clone(),
            })?;

        if !provider.supports(&step.operation) {
            return Err(StepFailure::UnknownOperation {
                provider_id: step.provider_id.clone(),
                operation: step.operation.clone(),
            });
        }

        let mut retry_count = 0u32;
        loop {
            let started = Instant::now();
            let outcome = self.attempt(&provider, step, input.clone()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    log_step_operation(
                        "invoke",
                        execution_id,
                        &step.step_id,
                        &step.provider_id,
                        "completed",
                        Some(elapsed_ms),
                    );
                    return Ok(output);
                }
                Err(failure) if failure.is_retryable() && retry_count < step.max_retries => {
                    retry_count += 1;
                    let delay = self.backoff.delay_for_retry(retry_count);
                    warn!(
                        step_id = %step.step_id,
                        retry_count = retry_count,
                        max_retries = step.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "🔄 Retrying step after failure"
                    );
                    self.events.step_event(
                        events::STEP_RETRYING,
                        execution_id,
                        &step.step_id,
                        json!({
                            "retry_count": retry_count,
                            "delay_ms": delay.as_millis() as u64,
                            "error": failure.to_string(),
                        }),
                    );
                    sleep(delay).await;
                }
                Err(failure) => {
                    log_step_operation(
                        "invoke",
                        execution_id,
                        &step.step_id,
                        &step.provider_id,
                        failure.category(),
                        Some(elapsed_ms),
                    );
                    return Err(failure);
                }
            }
        }
    }

    /// One provider call, through the breaker when breakers are enabled
    async fn attempt(
        &self,
        provider: &RegisteredProvider,
        step: &WorkflowStep,
        input: Payload,
    ) -> Result<Payload, StepFailure> {
        let started = Instant::now();
        let invocation = async {
            match timeout(step.timeout, provider.provider().invoke(&step.operation, input)).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(error)) => Err(Self::classify(step, error)),
                Err(_) => Err(StepFailure::Timeout {
                    operation: step.operation.clone(),
                    timeout: step.timeout,
                }),
            }
        };

        let result = if self.registry.breakers_enabled() {
            match provider.breaker().call(|| invocation).await {
                Ok(output) => Ok(output),
                Err(CircuitBreakerError::OperationFailed(failure)) => Err(failure),
                Err(CircuitBreakerError::CircuitOpen { .. }) => {
                    debug!(provider_id = %step.provider_id, "⛔ Provider circuit open");
                    return Err(StepFailure::CircuitOpen {
                        provider_id: step.provider_id.clone(),
                    });
                }
            }
        } else {
            invocation.await
        };

        provider.record_call(started.elapsed(), result.is_ok());
        result
    }

    fn classify(step: &WorkflowStep, error: ProviderError) -> StepFailure {
        match error {
            ProviderError::UnsupportedOperation(_) => StepFailure::UnknownOperation {
                provider_id: step.provider_id.clone(),
                operation: step.operation.clone(),
            },
            ProviderError::InvalidInput(message) => StepFailure::InvalidInput {
                operation: step.operation.clone(),
                message,
            },
            ProviderError::Failed(message) => StepFailure::ProviderFailed {
                operation: step.operation.clone(),
                message,
            },
        }
    }
}
