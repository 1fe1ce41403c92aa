//! # Execution Engine
//!
//! Admits workflow executions from a bounded priority queue, keeps at most
//! `capacity` of them running, and drives each one wave by wave until it reaches a
//! terminal state.
//!
//! ## Architecture
//!
//! ```text
//! submit ──► priority queue ──► dispatch (running < capacity) ──► driver task
//!                                   ▲                                │
//!                                   └──── finish / capacity change ◄─┘
//! ```
//!
//! Each driver owns its [`ExecutionResult`] and publishes cloned snapshots into the
//! active map; callers steer it through a `watch` control channel (pause, resume,
//! cancel). A cancellation is written into the snapshot as soon as it is accepted
//! and a pause request is flagged there, so status queries never lag behind the
//! control channel. Terminal results move into a bounded history.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use dashmap::DashMap;

use crate::config::ExecutionConfig;
use crate::constants::{events, ExecutionStatus, Priority};
use crate::error::{CoordinatorError, Result};
use crate::events::EventPublisher;
use crate::logging::log_execution_operation;
use crate::models::{ExecutionResult, Payload, WorkflowDefinition};
use crate::orchestration::dependency_resolver::DependencyResolver;
use crate::orchestration::metrics::MetricsCollector;
use crate::orchestration::step_executor::StepExecutor;

/// Requested state of a running execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionControl {
    Run,
    Pause,
    Cancel,
}

/// Outcome of a graceful engine shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued executions cancelled before they started
    pub cancelled_queued: usize,
    /// Whether every running execution finished within the timeout
    pub drained: bool,
}

struct QueuedExecution {
    priority: Priority,
    sequence: u64,
    execution_id: Uuid,
    workflow: Arc<WorkflowDefinition>,
    input: Payload,
}

impl PartialEq for QueuedExecution {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedExecution {}

impl PartialOrd for QueuedExecution {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedExecution {
    /// Max-heap order: higher priority first, then earlier submission
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct SchedulerState {
    queue: BinaryHeap<QueuedExecution>,
    running: usize,
    capacity: usize,
    accepting: bool,
    next_sequence: u64,
}

struct ActiveExecution {
    snapshot: ExecutionResult,
    control: watch::Sender<ExecutionControl>,
}

struct ExecutionHistory {
    by_id: HashMap<Uuid, ExecutionResult>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl ExecutionHistory {
    fn new(capacity: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, result: ExecutionResult) {
        let execution_id = result.execution_id;
        if self.by_id.insert(execution_id, result).is_none() {
            self.order.push_back(execution_id);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.by_id.remove(&evicted);
            }
        }
    }
}

enum DriveOutcome {
    Finished { succeeded: BTreeSet<String> },
    Cancelled,
    Aborted,
}

struct EngineInner {
    config: ExecutionConfig,
    executor: StepExecutor,
    metrics: Arc<MetricsCollector>,
    events: EventPublisher,
    scheduler: Mutex<SchedulerState>,
    active: DashMap<Uuid, ActiveExecution>,
    history: Mutex<ExecutionHistory>,
    running_count: watch::Sender<usize>,
}

/// Bounded, priority-ordered workflow execution engine
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("queue_size", &self.queue_size())
            .field("active_count", &self.active_count())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(
        config: ExecutionConfig,
        executor: StepExecutor,
        metrics: Arc<MetricsCollector>,
        events: EventPublisher,
    ) -> Self {
        let (running_count, _) = watch::channel(0usize);
        let scheduler = SchedulerState {
            queue: BinaryHeap::new(),
            running: 0,
            capacity: config.max_concurrent_workflows.max(1),
            accepting: true,
            next_sequence: 0,
        };
        let history = ExecutionHistory::new(config.history_capacity);

        Self {
            inner: Arc::new(EngineInner {
                config,
                executor,
                metrics,
                events,
                scheduler: Mutex::new(scheduler),
                active: DashMap::new(),
                history: Mutex::new(history),
                running_count,
            }),
        }
    }

    /// Queue an execution of `workflow`. Fails with `QueueFull` when the admission
    /// queue is at capacity, and with `InvalidState` once shutdown has begun or when
    /// called outside a tokio runtime (drivers are spawned onto the current one).
    #[instrument(skip(self, workflow, input), fields(workflow_id = %workflow.workflow_id))]
    pub fn submit(
        &self,
        workflow: Arc<WorkflowDefinition>,
        input: Payload,
        priority: Priority,
    ) -> Result<Uuid> {
        if Handle::try_current().is_err() {
            return Err(CoordinatorError::InvalidState(
                "executions must be submitted from within a tokio runtime".to_string(),
            ));
        }

        let execution_id = Uuid::new_v4();
        {
            let mut scheduler = self.inner.scheduler.lock();
            if !scheduler.accepting {
                return Err(CoordinatorError::InvalidState(
                    "execution engine is shutting down".to_string(),
                ));
            }
            if scheduler.queue.len() >= self.inner.config.max_queue_size {
                warn!(
                    capacity = self.inner.config.max_queue_size,
                    "⚠️ Execution queue full, rejecting submission"
                );
                return Err(CoordinatorError::QueueFull {
                    capacity: self.inner.config.max_queue_size,
                });
            }

            // Registered before it is queued so a dispatched driver always finds it
            let (control, _) = watch::channel(ExecutionControl::Run);
            let snapshot = ExecutionResult::pending(
                execution_id,
                workflow.workflow_id,
                priority,
                workflow.steps.len(),
            );
            self.inner
                .active
                .insert(execution_id, ActiveExecution { snapshot, control });

            let sequence = scheduler.next_sequence;
            scheduler.next_sequence += 1;
            scheduler.queue.push(QueuedExecution {
                priority,
                sequence,
                execution_id,
                workflow: Arc::clone(&workflow),
                input,
            });
        }

        self.inner.metrics.record_submission();
        self.inner.events.execution_event(
            events::EXECUTION_QUEUED,
            execution_id,
            json!({ "workflow_id": workflow.workflow_id, "priority": priority }),
        );
        log_execution_operation(
            "submit",
            execution_id,
            &workflow.workflow_id.to_string(),
            "pending",
            Some(&format!("priority {priority}")),
        );

        self.inner.dispatch();
        Ok(execution_id)
    }

    /// Latest snapshot of an active execution, or its final record from history
    pub fn get_status(&self, execution_id: Uuid) -> Option<ExecutionResult> {
        if let Some(active) = self.inner.active.get(&execution_id) {
            return Some(active.snapshot.clone());
        }
        self.inner.history.lock().by_id.get(&execution_id).cloned()
    }

    /// Cancel a queued, running or paused execution. Returns `false` for unknown or
    /// already-terminal executions.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        let dequeued = {
            let mut scheduler = self.inner.scheduler.lock();
            let before = scheduler.queue.len();
            scheduler
                .queue
                .retain(|queued| queued.execution_id != execution_id);
            before != scheduler.queue.len()
        };

        if dequeued {
            info!(execution_id = %execution_id, "🛑 Cancelled queued execution");
            self.inner.cancel_pending(execution_id);
            return true;
        }

        if !self.inner.request_cancel(execution_id) {
            return false;
        }
        info!(execution_id = %execution_id, "🛑 Cancellation requested");
        true
    }

    /// Ask a running execution to pause before its next wave
    pub fn pause(&self, execution_id: Uuid) -> bool {
        let Some(mut active) = self.inner.active.get_mut(&execution_id) else {
            return false;
        };
        let requested = *active.control.borrow();
        if active.snapshot.status != ExecutionStatus::Running || requested != ExecutionControl::Run {
            return false;
        }
        active.control.send_replace(ExecutionControl::Pause);
        active.snapshot.pause_requested = true;
        info!(execution_id = %execution_id, "⏸️ Pause requested");
        true
    }

    /// Resume a paused (or pausing) execution
    pub fn resume(&self, execution_id: Uuid) -> bool {
        let Some(mut active) = self.inner.active.get_mut(&execution_id) else {
            return false;
        };
        let requested = *active.control.borrow();
        if requested != ExecutionControl::Pause {
            return false;
        }
        active.control.send_replace(ExecutionControl::Run);
        active.snapshot.pause_requested = false;
        info!(execution_id = %execution_id, "▶️ Resume requested");
        true
    }

    pub fn queue_size(&self) -> usize {
        self.inner.scheduler.lock().queue.len()
    }

    /// Executions currently admitted (running or paused)
    pub fn active_count(&self) -> usize {
        self.inner.scheduler.lock().running
    }

    pub fn capacity(&self) -> usize {
        self.inner.scheduler.lock().capacity
    }

    /// Change the concurrency cap; returns the previous value
    pub fn set_capacity(&self, capacity: usize) -> usize {
        let previous = {
            let mut scheduler = self.inner.scheduler.lock();
            std::mem::replace(&mut scheduler.capacity, capacity.max(1))
        };
        debug!(previous, current = capacity.max(1), "Concurrency cap updated");
        self.inner.dispatch();
        previous
    }

    /// Snapshots of every non-terminal execution
    pub fn active_executions(&self) -> Vec<ExecutionResult> {
        self.inner
            .active
            .iter()
            .map(|entry| entry.snapshot.clone())
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.lock().by_id.len()
    }

    /// Stop admitting work, cancel everything still queued and wait up to `timeout`
    /// for running executions to finish. Executions still running after the timeout
    /// are asked to cancel.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let queued: Vec<QueuedExecution> = {
            let mut scheduler = self.inner.scheduler.lock();
            scheduler.accepting = false;
            scheduler.queue.drain().collect()
        };
        let cancelled_queued = queued.len();
        for execution in queued {
            self.inner.cancel_pending(execution.execution_id);
        }

        let mut running = self.inner.running_count.subscribe();
        let drained = tokio::time::timeout(timeout, running.wait_for(|count| *count == 0))
            .await
            .is_ok();

        if !drained {
            warn!(
                still_running = self.active_count(),
                "⚠️ Executions still running at shutdown timeout, cancelling"
            );
            let stragglers: Vec<Uuid> = self.inner.active.iter().map(|entry| *entry.key()).collect();
            for execution_id in stragglers {
                self.inner.request_cancel(execution_id);
            }
        }

        info!(cancelled_queued, drained, "🛑 Execution engine stopped");
        ShutdownReport {
            cancelled_queued,
            drained,
        }
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.scheduler.lock().accepting
    }
}

impl EngineInner {
    /// Admit queued executions while there is capacity
    fn dispatch(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("No tokio runtime to dispatch on, queued executions stay queued");
            return;
        };

        loop {
            let next = {
                let mut scheduler = self.scheduler.lock();
                if scheduler.running >= scheduler.capacity {
                    None
                } else {
                    let next = scheduler.queue.pop();
                    if next.is_some() {
                        scheduler.running += 1;
                        self.running_count.send_replace(scheduler.running);
                    }
                    next
                }
            };

            let Some(queued) = next else { break };

            let control = self
                .active
                .get(&queued.execution_id)
                .map(|active| active.control.subscribe());
            match control {
                Some(control) => {
                    runtime.spawn(Arc::clone(self).drive(queued, control));
                }
                None => {
                    error!(execution_id = %queued.execution_id, "❌ Dispatched execution has no active record");
                    self.release_slot();
                }
            }
        }
    }

    fn release_slot(self: &Arc<Self>) {
        {
            let mut scheduler = self.scheduler.lock();
            scheduler.running = scheduler.running.saturating_sub(1);
            self.running_count.send_replace(scheduler.running);
        }
        self.dispatch();
    }

    fn cancel_pending(&self, execution_id: Uuid) {
        let snapshot = self
            .active
            .get(&execution_id)
            .map(|active| active.snapshot.clone());
        if let Some(mut result) = snapshot {
            if let Err(e) = result.transition_to(ExecutionStatus::Cancelled) {
                warn!(execution_id = %execution_id, error = %e, "Could not cancel pending execution");
                return;
            }
            self.finalize(result);
        }
    }

    /// Mark an admitted execution cancelled and signal its driver. Returns `false`
    /// for unknown or already-terminal executions.
    fn request_cancel(&self, execution_id: Uuid) -> bool {
        let Some(mut active) = self.active.get_mut(&execution_id) else {
            return false;
        };
        if active.snapshot.transition_to(ExecutionStatus::Cancelled).is_err() {
            return false;
        }
        active.snapshot.pause_requested = false;
        active.control.send_replace(ExecutionControl::Cancel);
        true
    }

    /// Copy the driver's result into the active map. An accepted cancellation is
    /// never rolled back by the driver's in-flight bookkeeping.
    fn publish(&self, result: &ExecutionResult) {
        if let Some(mut active) = self.active.get_mut(&result.execution_id) {
            let requested = *active.control.borrow();
            let mut snapshot = result.clone();
            if active.snapshot.status == ExecutionStatus::Cancelled && !snapshot.status.is_terminal() {
                snapshot.status = ExecutionStatus::Cancelled;
                snapshot.end_time = active.snapshot.end_time;
                snapshot.duration_ms = active.snapshot.duration_ms;
            }
            snapshot.pause_requested =
                requested == ExecutionControl::Pause && snapshot.status == ExecutionStatus::Running;
            active.snapshot = snapshot;
        }
    }

    /// Move a terminal result into history and account for it
    fn finalize(&self, result: ExecutionResult) {
        let execution_id = result.execution_id;
        let status = result.status;
        let duration = Duration::from_millis(result.duration_ms.unwrap_or(0));

        self.history.lock().insert(result.clone());
        self.active.remove(&execution_id);

        self.metrics.record_finished(status, duration);
        self.events.execution_event(
            events::EXECUTION_FINISHED,
            execution_id,
            json!({
                "workflow_id": result.workflow_id,
                "status": status,
                "steps_completed": result.steps_completed,
                "steps_total": result.steps_total,
                "success_rate": result.success_rate,
                "duration_ms": result.duration_ms,
            }),
        );
        log_execution_operation(
            "finalize",
            execution_id,
            &result.workflow_id.to_string(),
            &status.to_string(),
            result.errors.last().map(|e| e.message.as_str()),
        );
    }

    async fn drive(
        self: Arc<Self>,
        queued: QueuedExecution,
        mut control: watch::Receiver<ExecutionControl>,
    ) {
        let execution_id = queued.execution_id;
        let workflow = queued.workflow;

        let snapshot = self
            .active
            .get(&execution_id)
            .map(|active| active.snapshot.clone());
        let Some(mut result) = snapshot else {
            self.release_slot();
            return;
        };

        let requested = *control.borrow_and_update();
        if requested == ExecutionControl::Cancel {
            if result.status == ExecutionStatus::Cancelled
                || result.transition_to(ExecutionStatus::Cancelled).is_ok()
            {
                self.finalize(result);
            }
            self.release_slot();
            return;
        }

        if let Err(e) = result.transition_to(ExecutionStatus::Running) {
            error!(execution_id = %execution_id, error = %e, "❌ Could not start execution");
            self.release_slot();
            return;
        }
        self.publish(&result);
        self.events.execution_event(
            events::EXECUTION_STARTED,
            execution_id,
            json!({ "workflow_id": workflow.workflow_id }),
        );
        info!(
            execution_id = %execution_id,
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            "🚀 ENGINE: Execution started"
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            workflow.global_timeout,
            self.drive_waves(&workflow, &queued.input, &mut result, &mut control),
        )
        .await;

        // An accepted cancel is final even when the last wave finished meanwhile
        let cancel_accepted = *control.borrow() == ExecutionControl::Cancel;
        let final_status = match outcome {
            _ if cancel_accepted => ExecutionStatus::Cancelled,
            Ok(DriveOutcome::Finished { succeeded }) => {
                match workflow.success_criteria.evaluate(&succeeded) {
                    Ok(()) => ExecutionStatus::Completed,
                    Err(reason) => {
                        let error = CoordinatorError::SuccessCriteriaNotMet { reason };
                        result.record_workflow_error(error.to_string());
                        ExecutionStatus::Failed
                    }
                }
            }
            Ok(DriveOutcome::Cancelled) => ExecutionStatus::Cancelled,
            Ok(DriveOutcome::Aborted) => ExecutionStatus::Failed,
            Err(_) => {
                let error = CoordinatorError::GlobalTimeout {
                    timeout: workflow.global_timeout,
                };
                warn!(
                    execution_id = %execution_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "⏰ Execution exceeded global timeout"
                );
                result.record_workflow_error(error.to_string());
                ExecutionStatus::Failed
            }
        };

        if let Err(e) = result.transition_to(final_status) {
            error!(execution_id = %execution_id, error = %e, "❌ Invalid terminal transition");
        }
        self.publish(&result);
        self.finalize(result);
        self.release_slot();
    }

    /// Run waves until every step is done, the execution is cancelled, or a step
    /// failure aborts it
    async fn drive_waves(
        &self,
        workflow: &Arc<WorkflowDefinition>,
        input: &Payload,
        result: &mut ExecutionResult,
        control: &mut watch::Receiver<ExecutionControl>,
    ) -> DriveOutcome {
        let execution_id = result.execution_id;
        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut succeeded: BTreeSet<String> = BTreeSet::new();

        loop {
            if completed.len() == workflow.steps.len() {
                return DriveOutcome::Finished { succeeded };
            }

            if !self.checkpoint(result, control).await {
                return DriveOutcome::Cancelled;
            }

            let ready = match DependencyResolver::ready_steps(&workflow.steps, &completed) {
                Ok(ready) => ready,
                Err(e) => {
                    error!(execution_id = %execution_id, error = %e, "❌ Dependency resolution failed");
                    result.record_workflow_error(e.to_string());
                    self.publish(result);
                    return DriveOutcome::Aborted;
                }
            };

            let mut wave_steps: Vec<_> = ready
                .iter()
                .filter_map(|step_id| workflow.step(step_id))
                .collect();
            wave_steps.sort_by(|a, b| b.priority.cmp(&a.priority));

            debug!(
                execution_id = %execution_id,
                wave_size = wave_steps.len(),
                "🌊 Starting wave"
            );

            let mut wave = JoinSet::new();
            for step in wave_steps {
                let step = step.clone();
                let step_input =
                    StepExecutor::merge_step_input(&step, &result.results, input);
                let executor = self.executor.clone();
                wave.spawn(async move {
                    let outcome = executor
                        .execute_with_input(Some(execution_id), &step, step_input)
                        .await;
                    (step.step_id, outcome)
                });
            }

            let mut aborted = false;
            let mut cancelled = false;
            let mut control_open = true;

            loop {
                tokio::select! {
                    joined = wave.join_next() => {
                        let Some(joined) = joined else { break };
                        let (step_id, outcome) = match joined {
                            Ok(done) => done,
                            Err(join_error) if join_error.is_cancelled() => continue,
                            Err(join_error) => {
                                error!(execution_id = %execution_id, error = %join_error, "❌ Step task panicked");
                                result.record_workflow_error(format!("step task panicked: {join_error}"));
                                aborted = true;
                                wave.abort_all();
                                continue;
                            }
                        };

                        if aborted || cancelled {
                            info!(
                                execution_id = %execution_id,
                                step_id = %step_id,
                                succeeded = outcome.is_ok(),
                                "🗑️ Discarding step result of a stopped execution"
                            );
                            continue;
                        }

                        match outcome {
                            Ok(output) => {
                                result.record_step_success(&step_id, Value::Object(output));
                                completed.insert(step_id.clone());
                                succeeded.insert(step_id.clone());
                                self.events.step_event(
                                    events::STEP_COMPLETED,
                                    Some(execution_id),
                                    &step_id,
                                    json!({}),
                                );
                            }
                            Err(failure) => {
                                let message = failure.to_string();
                                let aborts = failure.is_fatal()
                                    || workflow.is_critical(&step_id)
                                    || workflow.error_handling.stop_on_error;

                                result.record_step_failure(&step_id, &message, !aborts);
                                self.events.step_event(
                                    events::STEP_FAILED,
                                    Some(execution_id),
                                    &step_id,
                                    json!({
                                        "error": message,
                                        "category": failure.category(),
                                        "aborts_execution": aborts,
                                    }),
                                );

                                if aborts {
                                    let fatal = failure.is_fatal();
                                    let error = CoordinatorError::StepFailed {
                                        step_id: step_id.clone(),
                                        failure,
                                    };
                                    warn!(
                                        execution_id = %execution_id,
                                        error = %error,
                                        fatal,
                                        "🔴 Step failure aborts execution"
                                    );
                                    aborted = true;
                                    wave.abort_all();
                                } else {
                                    warn!(
                                        execution_id = %execution_id,
                                        step_id = %step_id,
                                        error = %message,
                                        "🟠 Step failure tolerated, continuing"
                                    );
                                    completed.insert(step_id);
                                }
                            }
                        }
                        self.publish(result);
                    }
                    changed = control.changed(), if control_open && !cancelled => {
                        if changed.is_err() {
                            control_open = false;
                            continue;
                        }
                        let requested = *control.borrow_and_update();
                        if requested == ExecutionControl::Cancel {
                            info!(execution_id = %execution_id, "🛑 Cancellation observed, letting in-flight steps finish");
                            cancelled = true;
                        }
                    }
                }
            }

            if cancelled {
                return DriveOutcome::Cancelled;
            }
            if aborted {
                return DriveOutcome::Aborted;
            }
        }
    }

    /// Honour pause and cancel requests between waves. Returns `false` when the
    /// execution must stop as cancelled.
    async fn checkpoint(
        &self,
        result: &mut ExecutionResult,
        control: &mut watch::Receiver<ExecutionControl>,
    ) -> bool {
        loop {
            let requested = *control.borrow_and_update();
            match requested {
                ExecutionControl::Cancel => return false,
                ExecutionControl::Run => {
                    if result.status == ExecutionStatus::Paused {
                        if result.transition_to(ExecutionStatus::Running).is_err() {
                            return false;
                        }
                        self.publish(result);
                        self.events.execution_event(
                            events::EXECUTION_RESUMED,
                            result.execution_id,
                            json!({}),
                        );
                        info!(execution_id = %result.execution_id, "▶️ Execution resumed");
                    }
                    return true;
                }
                ExecutionControl::Pause => {
                    if result.status == ExecutionStatus::Running {
                        if result.transition_to(ExecutionStatus::Paused).is_err() {
                            return false;
                        }
                        self.publish(result);
                        self.events.execution_event(
                            events::EXECUTION_PAUSED,
                            result.execution_id,
                            json!({ "steps_completed": result.steps_completed }),
                        );
                        info!(execution_id = %result.execution_id, "⏸️ Execution paused");
                    }
                    if control.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, CircuitBreakerConfig, MetricsConfig};
    use crate::models::{StepSpec, WorkflowSpec};
    use crate::orchestration::catalog::WorkflowCatalog;
    use crate::registry::{Provider, ProviderError, ProviderRegistry};
    use async_trait::async_trait;

    struct Sleepy(Duration);

    #[async_trait]
    impl Provider for Sleepy {
        async fn invoke(&self, operation: &str, input: Payload) -> std::result::Result<Payload, ProviderError> {
            tokio::time::sleep(self.0).await;
            if operation == "fail" {
                return Err(ProviderError::failed("requested failure"));
            }
            Ok(input)
        }
    }

    fn engine(capacity: usize, queue: usize) -> (ExecutionEngine, WorkflowCatalog, Arc<ProviderRegistry>) {
        let registry = Arc::new(ProviderRegistry::new(CircuitBreakerConfig::default()));
        registry.register("sleepy", Arc::new(Sleepy(Duration::from_millis(20))));

        let config = ExecutionConfig {
            max_concurrent_workflows: capacity,
            max_queue_size: queue,
            ..ExecutionConfig::default()
        };
        let events = EventPublisher::default();
        let executor = StepExecutor::new(
            Arc::clone(&registry),
            BackoffConfig {
                base_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_backoff_seconds: 1,
            },
            events.clone(),
        );
        let metrics = Arc::new(MetricsCollector::new(MetricsConfig::default()));
        (
            ExecutionEngine::new(config.clone(), executor, metrics, events),
            WorkflowCatalog::new(config),
            registry,
        )
    }

    async fn wait_terminal(engine: &ExecutionEngine, id: Uuid) -> ExecutionResult {
        for _ in 0..500 {
            if let Some(result) = engine.get_status(id) {
                if result.status.is_terminal() {
                    return result;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("execution {id} did not finish");
    }

    #[test]
    fn test_queue_order_is_priority_then_fifo() {
        let workflow = Arc::new(WorkflowDefinition::from_spec(
            "w",
            "",
            WorkflowSpec::new(vec![StepSpec::new("a", "p", "op")]),
            &ExecutionConfig::default(),
        ));
        let mut heap = BinaryHeap::new();
        for (sequence, priority) in [Priority::Low, Priority::High, Priority::Low, Priority::Critical]
            .into_iter()
            .enumerate()
        {
            heap.push(QueuedExecution {
                priority,
                sequence: sequence as u64,
                execution_id: Uuid::new_v4(),
                workflow: Arc::clone(&workflow),
                input: Payload::new(),
            });
        }

        let order: Vec<(Priority, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|q| (q.priority, q.sequence))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::Critical, 3),
                (Priority::High, 1),
                (Priority::Low, 0),
                (Priority::Low, 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_runs_to_completion_and_moves_to_history() {
        let (engine, catalog, registry) = engine(2, 10);
        let workflow = catalog
            .create(
                "pair",
                "",
                WorkflowSpec::new(vec![
                    StepSpec::new("a", "sleepy", "op"),
                    StepSpec::new("b", "sleepy", "op").depends_on(["a"]),
                ]),
                &registry,
            )
            .unwrap();

        let id = engine.submit(workflow, Payload::new(), Priority::Medium).unwrap();
        let result = wait_terminal(&engine, id).await;

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.steps_completed, 2);
        assert!(result.results["b"].get("a_result").is_some());
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_queue_full_is_rejected() {
        let (engine, catalog, registry) = engine(1, 1);
        let workflow = catalog
            .create(
                "one",
                "",
                WorkflowSpec::new(vec![StepSpec::new("a", "sleepy", "op")]),
                &registry,
            )
            .unwrap();

        engine.submit(Arc::clone(&workflow), Payload::new(), Priority::Medium).unwrap();
        engine.submit(Arc::clone(&workflow), Payload::new(), Priority::Medium).unwrap();
        let third = engine.submit(workflow, Payload::new(), Priority::Medium);

        assert!(matches!(third, Err(CoordinatorError::QueueFull { capacity: 1 })));
    }

    #[tokio::test]
    async fn test_stop_on_error_aborts_execution() {
        let (engine, catalog, registry) = engine(1, 10);
        let workflow = catalog
            .create(
                "failing",
                "",
                WorkflowSpec::new(vec![
                    StepSpec::new("a", "sleepy", "fail").with_max_retries(0),
                    StepSpec::new("b", "sleepy", "op").depends_on(["a"]),
                ]),
                &registry,
            )
            .unwrap();

        let id = engine.submit(workflow, Payload::new(), Priority::Medium).unwrap();
        let result = wait_terminal(&engine, id).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(!result.results.contains_key("b"));
        assert_eq!(result.errors[0].step_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_queued_and_rejects_new_work() {
        let (engine, catalog, registry) = engine(1, 10);
        let workflow = catalog
            .create(
                "one",
                "",
                WorkflowSpec::new(vec![StepSpec::new("a", "sleepy", "op")]),
                &registry,
            )
            .unwrap();

        let running = engine.submit(Arc::clone(&workflow), Payload::new(), Priority::Medium).unwrap();
        let queued = engine.submit(Arc::clone(&workflow), Payload::new(), Priority::Medium).unwrap();

        let report = engine.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.cancelled_queued, 1);
        assert!(report.drained);

        assert_eq!(engine.get_status(queued).unwrap().status, ExecutionStatus::Cancelled);
        assert_eq!(engine.get_status(running).unwrap().status, ExecutionStatus::Completed);
        assert!(matches!(
            engine.submit(workflow, Payload::new(), Priority::Medium),
            Err(CoordinatorError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_and_pause_are_visible_before_wave_finishes() {
        let (engine, catalog, registry) = engine(1, 10);
        registry.register("slow", Arc::new(Sleepy(Duration::from_millis(300))));
        let workflow = catalog
            .create(
                "slow-pair",
                "",
                WorkflowSpec::new(vec![
                    StepSpec::new("a", "slow", "op"),
                    StepSpec::new("b", "slow", "op").depends_on(["a"]),
                ]),
                &registry,
            )
            .unwrap();

        let id = engine.submit(workflow, Payload::new(), Priority::Medium).unwrap();
        while engine.get_status(id).unwrap().status != ExecutionStatus::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(engine.pause(id));
        let pausing = engine.get_status(id).unwrap();
        assert_eq!(pausing.status, ExecutionStatus::Running);
        assert!(pausing.pause_requested);

        assert!(engine.cancel(id));
        let cancelled = engine.get_status(id).unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert!(!cancelled.pause_requested);
        assert!(cancelled.end_time.is_some());
        assert!(!engine.cancel(id));

        // Step "a" is still in flight; its completion must not roll the status back
        tokio::time::sleep(Duration::from_millis(400)).await;
        let settled = engine.get_status(id).unwrap();
        assert_eq!(settled.status, ExecutionStatus::Cancelled);
        assert!(!settled.results.contains_key("b"));
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.history_len(), 1);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = ExecutionHistory::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            history.insert(ExecutionResult::pending(*id, Uuid::new_v4(), Priority::Low, 1));
        }

        assert!(!history.by_id.contains_key(&ids[0]));
        assert!(history.by_id.contains_key(&ids[1]));
        assert!(history.by_id.contains_key(&ids[2]));
    }
}
