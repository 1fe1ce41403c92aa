//! Workflow Definitions
//!
//! [`WorkflowSpec`] is the deserializable creation payload. The catalog validates it
//! and freezes it into an immutable [`WorkflowDefinition`] that executions share
//! behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::constants::Priority;

/// A JSON object passed to and returned from provider operations
pub type Payload = serde_json::Map<String, Value>;

/// One step of a workflow: a single provider operation plus its dependencies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub provider_id: String,
    pub operation: String,
    pub input: Payload,
    pub dependencies: BTreeSet<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub priority: Priority,
    pub metadata: Payload,
}

impl WorkflowStep {
    /// Convenience constructor with default timeout, retries and priority
    pub fn new(
        step_id: impl Into<String>,
        provider_id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        let defaults = ExecutionConfig::default();
        Self {
            step_id: step_id.into(),
            provider_id: provider_id.into(),
            operation: operation.into(),
            input: Payload::new(),
            dependencies: BTreeSet::new(),
            timeout: defaults.default_step_timeout(),
            max_retries: defaults.default_max_retries,
            priority: Priority::default(),
            metadata: Payload::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// What to do when a step fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Abort the execution on the first step failure
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,

    /// Steps whose failure aborts the execution even when `stop_on_error` is off
    #[serde(default)]
    pub critical_steps: BTreeSet<String>,
}

fn default_stop_on_error() -> bool {
    true
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            critical_steps: BTreeSet::new(),
        }
    }
}

/// Conditions checked once every step is done
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub min_steps_completed: Option<usize>,

    /// Steps that must have succeeded (a tolerated failure does not count)
    #[serde(default)]
    pub required_steps: BTreeSet<String>,
}

impl SuccessCriteria {
    /// Check the criteria against the ids of steps that produced a real result
    pub fn evaluate(&self, succeeded: &BTreeSet<String>) -> Result<(), String> {
        if let Some(min) = self.min_steps_completed {
            if succeeded.len() < min {
                return Err(format!(
                    "{} steps succeeded, at least {min} required",
                    succeeded.len()
                ));
            }
        }

        let missing: Vec<&str> = self
            .required_steps
            .iter()
            .filter(|step_id| !succeeded.contains(*step_id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("required steps did not succeed: {}", missing.join(", ")));
        }

        Ok(())
    }
}

/// Step as written in a workflow spec; unset fields take the configured defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(alias = "id")]
    pub step_id: String,
    #[serde(alias = "agent_id")]
    pub provider_id: String,
    pub operation: String,
    #[serde(default)]
    pub input: Payload,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Payload,
}

impl StepSpec {
    pub fn new(
        step_id: impl Into<String>,
        provider_id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            provider_id: provider_id.into(),
            operation: operation.into(),
            input: Payload::new(),
            dependencies: Vec::new(),
            timeout_seconds: None,
            max_retries: None,
            priority: Priority::default(),
            metadata: Payload::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn into_step(self, defaults: &ExecutionConfig) -> WorkflowStep {
        WorkflowStep {
            timeout: self
                .timeout_seconds
                .map(Duration::from_secs_f64)
                .unwrap_or_else(|| defaults.default_step_timeout()),
            max_retries: self.max_retries.unwrap_or(defaults.default_max_retries),
            dependencies: self.dependencies.into_iter().collect(),
            step_id: self.step_id,
            provider_id: self.provider_id,
            operation: self.operation,
            input: self.input,
            priority: self.priority,
            metadata: self.metadata,
        }
    }
}

/// Deserializable workflow creation payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub global_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub success_criteria: SuccessCriteria,
    #[serde(default)]
    pub metadata: Payload,
}

impl WorkflowSpec {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.error_handling.stop_on_error = stop_on_error;
        self
    }

    pub fn with_critical_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_handling.critical_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_success_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.success_criteria = criteria;
        self
    }

    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout_seconds = Some(timeout.as_secs_f64());
        self
    }
}

/// Immutable, validated workflow. A changed workflow needs a new id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub workflow_id: Uuid,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub global_timeout: Duration,
    pub error_handling: ErrorHandling,
    pub success_criteria: SuccessCriteria,
    pub metadata: Payload,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Freeze a spec with a fresh id. Structural validation is the catalog's job.
    pub(crate) fn from_spec(
        name: &str,
        description: &str,
        spec: WorkflowSpec,
        defaults: &ExecutionConfig,
    ) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            steps: spec
                .steps
                .into_iter()
                .map(|step| step.into_step(defaults))
                .collect(),
            global_timeout: spec
                .global_timeout_seconds
                .map(Duration::from_secs_f64)
                .unwrap_or_else(|| defaults.default_global_timeout()),
            error_handling: spec.error_handling,
            success_criteria: spec.success_criteria,
            metadata: spec.metadata,
            created_at: Utc::now(),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    pub fn is_critical(&self, step_id: &str) -> bool {
        self.error_handling.critical_steps.contains(step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: WorkflowSpec = serde_json::from_value(json!({
            "steps": [
                { "id": "extract", "agent_id": "ocr", "operation": "scan" },
                {
                    "step_id": "summarize",
                    "provider_id": "llm",
                    "operation": "summarize",
                    "dependencies": ["extract"],
                    "timeout_seconds": 5,
                    "priority": "high"
                }
            ]
        }))
        .unwrap();

        assert!(spec.error_handling.stop_on_error);
        assert!(spec.success_criteria.required_steps.is_empty());

        let definition =
            WorkflowDefinition::from_spec("docs", "", spec, &ExecutionConfig::default());
        assert_eq!(definition.global_timeout, Duration::from_secs(300));

        let extract = definition.step("extract").unwrap();
        assert_eq!(extract.timeout, Duration::from_secs(30));
        assert_eq!(extract.max_retries, 3);
        assert_eq!(extract.priority, Priority::Medium);

        let summarize = definition.step("summarize").unwrap();
        assert_eq!(summarize.timeout, Duration::from_secs(5));
        assert_eq!(summarize.priority, Priority::High);
        assert!(summarize.dependencies.contains("extract"));
    }

    #[test]
    fn test_success_criteria_evaluation() {
        let criteria = SuccessCriteria {
            min_steps_completed: Some(2),
            required_steps: ["b".to_string()].into_iter().collect(),
        };

        let succeeded: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(criteria.evaluate(&succeeded).is_ok());

        let succeeded: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let reason = criteria.evaluate(&succeeded).unwrap_err();
        assert!(reason.contains('b'));

        let succeeded: BTreeSet<String> = ["b"].iter().map(|s| s.to_string()).collect();
        assert!(criteria.evaluate(&succeeded).is_err());
    }

    #[test]
    fn test_stop_on_error_defaults_to_true_when_section_is_partial() {
        let handling: ErrorHandling =
            serde_json::from_value(json!({ "critical_steps": ["a"] })).unwrap();
        assert!(handling.stop_on_error);
        assert!(handling.critical_steps.contains("a"));
    }
}
