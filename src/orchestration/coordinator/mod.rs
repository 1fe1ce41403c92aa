//! # Workflow Coordinator
//!
//! The single owner of a coordinator instance: it wires the provider registry, the
//! workflow catalog, the execution engine, metrics and events together, exposes the
//! management API, and owns the lifecycle of every background loop.
//!
//! ## Key Components
//!
//! - [`WorkflowCoordinator`] - Management API and lifecycle owner
//! - [`scaling`] - Additive auto-scaling of the concurrency cap
//! - [`monitor`] - Periodic provider health polling
//!
//! Executions are accepted from construction until [`WorkflowCoordinator::stop`];
//! [`WorkflowCoordinator::start`] adds the health, scaling and sampling loops.

pub mod monitor;
pub mod scaling;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigManager, CoordinatorConfig};
use crate::constants::Priority;
use crate::error::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, EventPublisher};
use crate::models::{ExecutionResult, Payload, WorkflowDefinition, WorkflowSpec};
use crate::orchestration::catalog::WorkflowCatalog;
use crate::orchestration::execution_engine::{ExecutionEngine, ShutdownReport};
use crate::orchestration::metrics::{MetricsCollector, MetricsSnapshot, PerformanceSample};
use crate::orchestration::step_executor::StepExecutor;
use crate::registry::{Provider, ProviderRegistry, ProviderStatus};

use self::monitor::{HealthCycleReport, HealthMonitor};
use self::scaling::{AutoScaler, ScalingAction};

/// System-wide view returned by [`WorkflowCoordinator::get_system_metrics`]
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub coordinator_id: Uuid,
    pub running: bool,
    pub collected_at: DateTime<Utc>,
    pub active_executions: usize,
    pub queue_size: usize,
    pub capacity: usize,
    /// Share of the concurrency cap currently in use
    pub utilization: f64,
    pub throughput: u64,
    pub success_rate: f64,
    pub registered_workflows: usize,
    pub executions: MetricsSnapshot,
    pub providers: Vec<ProviderStatus>,
    /// Most recent performance samples, oldest first
    pub trends: Vec<PerformanceSample>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    stopped: bool,
    loops: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct WorkflowCoordinator {
    id: Uuid,
    config: CoordinatorConfig,
    registry: Arc<ProviderRegistry>,
    catalog: WorkflowCatalog,
    engine: ExecutionEngine,
    metrics: Arc<MetricsCollector>,
    events: EventPublisher,
    health_monitor: HealthMonitor,
    scaler: AutoScaler,
    shutdown: watch::Sender<bool>,
    lifecycle: Mutex<Lifecycle>,
}

impl WorkflowCoordinator {
    /// Build a coordinator from an already-loaded configuration
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        info!(
            coordinator_id = %id,
            max_concurrent = config.execution.max_concurrent_workflows,
            max_queue = config.execution.max_queue_size,
            "🏗️ COORDINATOR: Creating WorkflowCoordinator"
        );

        let events = EventPublisher::new(config.events.channel_capacity);
        let registry = Arc::new(ProviderRegistry::new(config.circuit_breakers.clone()));
        let metrics = Arc::new(MetricsCollector::new(config.metrics.clone()));
        let executor = StepExecutor::new(
            Arc::clone(&registry),
            config.backoff.clone(),
            events.clone(),
        );
        let engine = ExecutionEngine::new(
            config.execution.clone(),
            executor,
            Arc::clone(&metrics),
            events.clone(),
        );
        let health_monitor =
            HealthMonitor::new(config.health.clone(), Arc::clone(&registry), events.clone());
        let scaler = AutoScaler::new(config.scaling.clone());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            id,
            catalog: WorkflowCatalog::new(config.execution.clone()),
            config,
            registry,
            engine,
            metrics,
            events,
            health_monitor,
            scaler,
            shutdown,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Build a coordinator from the configuration held by `manager`
    pub fn from_config_manager(manager: &ConfigManager) -> Result<Self> {
        Self::new(manager.config().clone())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register a provider instance. Returns `false` if the id is already taken.
    pub fn register_provider(&self, provider_id: &str, provider: Arc<dyn Provider>) -> bool {
        self.registry.register(provider_id, provider)
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.registry.provider_ids()
    }

    /// Validate and store a workflow definition, returning its id
    pub fn create_workflow(
        &self,
        name: &str,
        description: &str,
        spec: WorkflowSpec,
    ) -> Result<Uuid> {
        self.catalog
            .create(name, description, spec, &self.registry)
            .map(|definition| definition.workflow_id)
    }

    pub fn get_workflow(&self, workflow_id: Uuid) -> Option<Arc<WorkflowDefinition>> {
        self.catalog.get(workflow_id)
    }

    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.catalog.list()
    }

    /// Queue an execution of a stored workflow
    ///
    /// The execution is driven on the caller's tokio runtime, so this must be called
    /// from within one.
    ///
    /// # Errors
    ///
    /// `WorkflowNotFound` for an unknown id, `QueueFull` when the admission queue is
    /// at capacity, and `InvalidState` after shutdown or outside a tokio runtime.
    #[instrument(skip(self, input), fields(coordinator_id = %self.id))]
    pub fn execute_workflow(
        &self,
        workflow_id: Uuid,
        input: Payload,
        priority: Priority,
    ) -> Result<Uuid> {
        let workflow = self
            .catalog
            .get(workflow_id)
            .ok_or(CoordinatorError::WorkflowNotFound { workflow_id })?;
        self.engine.submit(workflow, input, priority)
    }

    /// Latest snapshot of an execution; idempotent and side-effect free
    pub fn get_status(&self, execution_id: Uuid) -> Option<ExecutionResult> {
        self.engine.get_status(execution_id)
    }

    pub fn cancel(&self, execution_id: Uuid) -> bool {
        self.engine.cancel(execution_id)
    }

    pub fn pause(&self, execution_id: Uuid) -> bool {
        self.engine.pause(execution_id)
    }

    pub fn resume(&self, execution_id: Uuid) -> bool {
        self.engine.resume(execution_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        let active_executions = self.engine.active_count();
        let capacity = self.engine.capacity();
        let executions = self.metrics.snapshot();

        SystemMetrics {
            coordinator_id: self.id,
            running: self.is_running(),
            collected_at: Utc::now(),
            active_executions,
            queue_size: self.engine.queue_size(),
            capacity,
            utilization: utilization(active_executions, capacity),
            throughput: executions.throughput,
            success_rate: executions.success_rate,
            registered_workflows: self.catalog.len(),
            executions,
            providers: self.registry.statuses(),
            trends: self
                .metrics
                .recent_samples(self.config.metrics.trend_samples),
        }
    }

    /// Run one health check cycle over every provider
    pub async fn run_health_check(&self) -> HealthCycleReport {
        self.health_monitor.check_all().await
    }

    /// Run one auto-scaling evaluation and apply its decision
    pub fn run_scaling_cycle(&self) -> ScalingAction {
        Self::scaling_cycle(&self.scaler, &self.engine, &self.events)
    }

    /// Record one performance sample
    pub fn collect_performance_sample(&self) -> PerformanceSample {
        Self::sample_cycle(&self.engine, &self.metrics)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().running
    }

    /// Start the background health, scaling and sampling loops
    ///
    /// # Errors
    ///
    /// `InvalidState` when already running, after `stop`, or when called outside a
    /// tokio runtime.
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.running {
            return Err(CoordinatorError::InvalidState(
                "Coordinator is already running".to_string(),
            ));
        }
        if lifecycle.stopped {
            return Err(CoordinatorError::InvalidState(
                "Coordinator has been stopped".to_string(),
            ));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CoordinatorError::InvalidState(
                "Coordinator must be started from within a tokio runtime".to_string(),
            ));
        }

        info!("🚀 COORDINATOR: Starting WorkflowCoordinator");
        self.shutdown.send_replace(false);

        if self.config.health.enabled {
            lifecycle.loops.push(self.spawn_health_loop());
        }
        if self.config.scaling.enabled {
            lifecycle.loops.push(self.spawn_scaling_loop());
        }
        if self.config.metrics.enabled {
            lifecycle.loops.push(self.spawn_sampling_loop());
        }
        lifecycle.running = true;

        info!(
            loops = lifecycle.loops.len(),
            "🎉 COORDINATOR: WorkflowCoordinator started successfully"
        );
        Ok(())
    }

    /// Stop accepting work, cancel queued executions, wait up to `timeout` for
    /// running ones and shut every background loop down
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub async fn stop(&self, timeout: Duration) -> Result<ShutdownReport> {
        let loops = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.stopped {
                info!("COORDINATOR: Already stopped");
                return Ok(ShutdownReport {
                    cancelled_queued: 0,
                    drained: true,
                });
            }
            lifecycle.stopped = true;
            lifecycle.running = false;
            std::mem::take(&mut lifecycle.loops)
        };

        info!("🛑 COORDINATOR: Stopping WorkflowCoordinator");
        self.shutdown.send_replace(true);

        let report = self.engine.shutdown(timeout).await;

        for handle in loops {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "❌ COORDINATOR: Background loop ended abnormally");
                }
            }
        }

        info!(
            cancelled_queued = report.cancelled_queued,
            drained = report.drained,
            "✅ COORDINATOR: WorkflowCoordinator stopped"
        );
        Ok(report)
    }

    fn spawn_health_loop(&self) -> JoinHandle<()> {
        let monitor = self.health_monitor.clone();
        let interval = self.config.health.check_interval();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        monitor.check_all().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Health monitoring loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_scaling_loop(&self) -> JoinHandle<()> {
        let scaler = self.scaler.clone();
        let engine = self.engine.clone();
        let events = self.events.clone();
        let interval = self.config.scaling.interval();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        Self::scaling_cycle(&scaler, &engine, &events);
                    }
                    _ = shutdown.changed() => {
                        info!("Scaling loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_sampling_loop(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let metrics = Arc::clone(&self.metrics);
        let interval = self.config.metrics.collection_interval();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        Self::sample_cycle(&engine, &metrics);
                    }
                    _ = shutdown.changed() => {
                        info!("Performance sampling loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn scaling_cycle(
        scaler: &AutoScaler,
        engine: &ExecutionEngine,
        events: &EventPublisher,
    ) -> ScalingAction {
        let capacity = engine.capacity();
        let action = scaler.evaluate(engine.queue_size(), engine.active_count(), capacity);

        match &action {
            ScalingAction::ScaleUp { count } => {
                info!("🔼 COORDINATOR: Scaling up concurrency cap by {}", count);
            }
            ScalingAction::ScaleDown { count } => {
                info!("🔽 COORDINATOR: Scaling down concurrency cap by {}", count);
            }
            ScalingAction::NoChange => {
                debug!(capacity, "COORDINATOR: No scaling change");
                return action;
            }
        }

        let target = action.apply(capacity);
        let previous = engine.set_capacity(target);
        events.capacity_changed(previous, target, "auto_scaling");
        action
    }

    fn sample_cycle(engine: &ExecutionEngine, metrics: &MetricsCollector) -> PerformanceSample {
        let active_executions = engine.active_count();
        let capacity = engine.capacity();
        let sample = PerformanceSample {
            timestamp: Utc::now(),
            active_executions,
            queue_size: engine.queue_size(),
            capacity,
            utilization: utilization(active_executions, capacity),
            throughput: metrics.throughput(),
            success_rate: metrics.success_rate(),
        };
        metrics.record_sample(sample.clone());
        sample
    }
}

fn utilization(active: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        active as f64 / capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use crate::models::StepSpec;
    use crate::registry::ProviderError;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        async fn invoke(&self, _operation: &str, input: Payload) -> std::result::Result<Payload, ProviderError> {
            Ok(input)
        }
    }

    fn quiet_config() -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.health.enabled = false;
        config.scaling.enabled = false;
        config.metrics.enabled = false;
        config
    }

    #[test]
    fn test_submission_outside_runtime_is_rejected() {
        let coordinator = WorkflowCoordinator::new(quiet_config()).unwrap();
        assert!(coordinator.register_provider("echo", Arc::new(Echo)));
        let workflow_id = coordinator
            .create_workflow("echo", "", WorkflowSpec::new(vec![StepSpec::new("A", "echo", "run")]))
            .unwrap();

        let submitted = coordinator.execute_workflow(workflow_id, Payload::new(), Priority::High);
        assert!(matches!(submitted, Err(CoordinatorError::InvalidState(_))));
        assert!(matches!(coordinator.start(), Err(CoordinatorError::InvalidState(_))));

        // Nothing was queued or left half-admitted
        let metrics = coordinator.get_system_metrics();
        assert_eq!(metrics.queue_size, 0);
        assert_eq!(metrics.active_executions, 0);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_coordinator_lifecycle() {
        let mut config = CoordinatorConfig::default();
        config.health.check_interval_seconds = 3600;
        config.scaling.interval_seconds = 3600;
        config.metrics.collection_interval_seconds = 3600;
        let coordinator = WorkflowCoordinator::new(config).unwrap();
        assert!(!coordinator.is_running());

        coordinator.start().unwrap();
        assert!(coordinator.is_running());
        assert!(matches!(
            coordinator.start(),
            Err(CoordinatorError::InvalidState(_))
        ));

        let report = coordinator.stop(Duration::from_secs(1)).await.unwrap();
        assert!(report.drained);
        assert!(!coordinator.is_running());
        assert!(coordinator.start().is_err());
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_rejected() {
        let coordinator = WorkflowCoordinator::new(quiet_config()).unwrap();
        let result = coordinator.execute_workflow(Uuid::new_v4(), Payload::new(), Priority::High);
        assert!(matches!(result, Err(CoordinatorError::WorkflowNotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_provider_registration() {
        let coordinator = WorkflowCoordinator::new(quiet_config()).unwrap();
        assert!(coordinator.register_provider("echo", Arc::new(Echo)));
        assert!(!coordinator.register_provider("echo", Arc::new(Echo)));
        assert_eq!(coordinator.provider_ids(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_scaling_cycle_lowers_idle_capacity_and_publishes() {
        let mut config = quiet_config();
        config.scaling.enabled = true;
        config.execution.max_concurrent_workflows = 10;
        let coordinator = WorkflowCoordinator::new(config).unwrap();
        let mut receiver = coordinator.subscribe();

        let action = coordinator.run_scaling_cycle();
        assert_eq!(action, ScalingAction::ScaleDown { count: 1 });
        assert_eq!(coordinator.get_system_metrics().capacity, 9);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::CAPACITY_CHANGED);
        assert_eq!(event.context["current"], 9);
    }

    #[tokio::test]
    async fn test_system_metrics_include_providers_and_trends() {
        let coordinator = WorkflowCoordinator::new(quiet_config()).unwrap();
        coordinator.register_provider("echo", Arc::new(Echo));
        let workflow_id = coordinator
            .create_workflow(
                "echo",
                "",
                WorkflowSpec::new(vec![StepSpec::new("a", "echo", "say")]),
            )
            .unwrap();
        assert_eq!(coordinator.list_workflows().len(), 1);
        assert!(coordinator.get_workflow(workflow_id).is_some());

        coordinator.collect_performance_sample();
        coordinator.collect_performance_sample();

        let metrics = coordinator.get_system_metrics();
        assert_eq!(metrics.providers.len(), 1);
        assert_eq!(metrics.trends.len(), 2);
        assert_eq!(metrics.registered_workflows, 1);
        assert_eq!(metrics.utilization, 0.0);
    }
}
