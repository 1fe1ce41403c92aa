//! Execution Results
//!
//! The record of one workflow execution. Only the task driving the execution mutates
//! it; everyone else sees cloned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::constants::{ExecutionStatus, Priority};
use crate::error::{CoordinatorError, Result};

/// One error recorded against an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// `None` for workflow-level errors (timeout, cancellation, success criteria)
    pub step_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// A pause was requested and takes effect once the current wave finishes
    #[serde(default)]
    pub pause_requested: bool,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Steps that are done, including failures tolerated by the error policy
    pub steps_completed: usize,
    /// Steps that produced a real provider result
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub steps_total: usize,
    pub results: BTreeMap<String, Value>,
    pub errors: Vec<ExecutionError>,
    pub success_rate: f64,
}

impl ExecutionResult {
    pub fn pending(
        execution_id: Uuid,
        workflow_id: Uuid,
        priority: Priority,
        steps_total: usize,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            status: ExecutionStatus::Pending,
            pause_requested: false,
            priority,
            submitted_at: Utc::now(),
            start_time: None,
            end_time: None,
            duration_ms: None,
            steps_completed: 0,
            steps_succeeded: 0,
            steps_failed: 0,
            steps_total,
            results: BTreeMap::new(),
            errors: Vec::new(),
            success_rate: 0.0,
        }
    }

    /// Apply a state transition, rejecting anything the state machine forbids
    pub fn transition_to(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }

        if next == ExecutionStatus::Running && self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self.status = next;

        if next.is_terminal() {
            self.finish();
        }
        Ok(())
    }

    pub fn record_step_success(&mut self, step_id: &str, output: Value) {
        self.results.insert(step_id.to_string(), output);
        self.steps_completed += 1;
        self.steps_succeeded += 1;
        self.update_success_rate();
    }

    /// Record a failed step. A tolerated failure stores the error payload as the
    /// step's result and counts the step as done.
    pub fn record_step_failure(&mut self, step_id: &str, message: &str, tolerated: bool) {
        self.errors.push(ExecutionError {
            step_id: Some(step_id.to_string()),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        self.steps_failed += 1;

        if tolerated {
            self.results
                .insert(step_id.to_string(), error_payload(step_id, message));
            self.steps_completed += 1;
        }
        self.update_success_rate();
    }

    pub fn record_workflow_error(&mut self, message: impl Into<String>) {
        self.errors.push(ExecutionError {
            step_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn step_errors(&self) -> usize {
        self.errors.iter().filter(|e| e.step_id.is_some()).count()
    }

    fn update_success_rate(&mut self) {
        self.success_rate = if self.steps_total == 0 {
            0.0
        } else {
            self.steps_succeeded as f64 / self.steps_total as f64
        };
    }

    fn finish(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        let start = self.start_time.unwrap_or(self.submitted_at);
        self.duration_ms = Some((end - start).num_milliseconds().max(0) as u64);

        if self.status == ExecutionStatus::Completed {
            self.success_rate = if self.steps_total == 0 {
                0.0
            } else {
                1.0 - self.step_errors() as f64 / self.steps_total as f64
            };
        } else {
            self.update_success_rate();
        }
    }
}

/// Result payload recorded for a step whose failure the error policy tolerated
pub fn error_payload(step_id: &str, message: &str) -> Value {
    json!({
        "error": message,
        "status": "failed",
        "step_id": step_id,
    })
}
