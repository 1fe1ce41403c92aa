//! # Workflow Catalog
//!
//! Validates workflow specs and stores the resulting immutable definitions by id.
//! Every structural problem, including dependency cycles, is rejected here so an
//! execution never starts on a graph it cannot finish.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::error::{CoordinatorError, Result};
use crate::models::{WorkflowDefinition, WorkflowSpec};
use crate::orchestration::dependency_resolver::DependencyResolver;
use crate::registry::ProviderRegistry;

#[derive(Debug)]
pub struct WorkflowCatalog {
    workflows: DashMap<Uuid, Arc<WorkflowDefinition>>,
    defaults: ExecutionConfig,
}

impl WorkflowCatalog {
    pub fn new(defaults: ExecutionConfig) -> Self {
        Self {
            workflows: DashMap::new(),
            defaults,
        }
    }

    /// Validate `spec` and store it under a fresh workflow id
    #[instrument(skip(self, spec, registry), fields(steps = spec.steps.len()))]
    pub fn create(
        &self,
        name: &str,
        description: &str,
        spec: WorkflowSpec,
        registry: &ProviderRegistry,
    ) -> Result<Arc<WorkflowDefinition>> {
        Self::validate_spec(name, &spec)?;

        let definition = WorkflowDefinition::from_spec(name, description, spec, &self.defaults);
        DependencyResolver::validate_acyclic(&definition.steps)?;
        Self::validate_operations(&definition, registry)?;

        let definition = Arc::new(definition);
        self.workflows
            .insert(definition.workflow_id, Arc::clone(&definition));

        info!(
            workflow_id = %definition.workflow_id,
            name = %definition.name,
            steps = definition.steps.len(),
            "📝 Workflow created"
        );
        Ok(definition)
    }

    pub fn get(&self, workflow_id: Uuid) -> Option<Arc<WorkflowDefinition>> {
        self.workflows
            .get(&workflow_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All definitions, oldest first
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut workflows: Vec<_> = self
            .workflows
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        workflows.sort_by_key(|workflow| workflow.created_at);
        workflows
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    fn validate_spec(name: &str, spec: &WorkflowSpec) -> Result<()> {
        let invalid = |reason: String| Err(CoordinatorError::InvalidWorkflow { reason });

        if name.trim().is_empty() {
            return invalid("workflow name must not be empty".to_string());
        }
        if spec.steps.is_empty() {
            return invalid("workflow must contain at least one step".to_string());
        }

        let mut step_ids = BTreeSet::new();
        for step in &spec.steps {
            if step.step_id.trim().is_empty() {
                return invalid("step id must not be empty".to_string());
            }
            if !step_ids.insert(step.step_id.as_str()) {
                return invalid(format!("duplicate step id '{}'", step.step_id));
            }
            if step.provider_id.trim().is_empty() || step.operation.trim().is_empty() {
                return invalid(format!(
                    "step '{}' must name a provider and an operation",
                    step.step_id
                ));
            }
            if let Some(timeout) = step.timeout_seconds {
                if !is_valid_timeout(timeout) {
                    return invalid(format!(
                        "step '{}' timeout must be a positive, representable duration, got {timeout}",
                        step.step_id
                    ));
                }
            }
        }

        for step in &spec.steps {
            for dependency in &step.dependencies {
                if dependency == &step.step_id {
                    return Err(CoordinatorError::CircularDependency {
                        steps: vec![step.step_id.clone()],
                    });
                }
                if !step_ids.contains(dependency.as_str()) {
                    return invalid(format!(
                        "step '{}' depends on unknown step '{dependency}'",
                        step.step_id
                    ));
                }
            }
        }

        if let Some(timeout) = spec.global_timeout_seconds {
            if !is_valid_timeout(timeout) {
                return invalid(format!(
                    "global timeout must be a positive, representable duration, got {timeout}"
                ));
            }
        }

        let referenced = spec
            .error_handling
            .critical_steps
            .iter()
            .chain(spec.success_criteria.required_steps.iter());
        for step_id in referenced {
            if !step_ids.contains(step_id.as_str()) {
                return invalid(format!(
                    "error handling or success criteria reference unknown step '{step_id}'"
                ));
            }
        }

        if let Some(min) = spec.success_criteria.min_steps_completed {
            if min > spec.steps.len() {
                return invalid(format!(
                    "min_steps_completed ({min}) exceeds the number of steps ({})",
                    spec.steps.len()
                ));
            }
        }

        Ok(())
    }

    /// Operation names are checked only against registered providers that advertise
    /// their capabilities. Unregistered providers fail when the step runs.
    fn validate_operations(
        definition: &WorkflowDefinition,
        registry: &ProviderRegistry,
    ) -> Result<()> {
        for step in &definition.steps {
            match registry.get(&step.provider_id) {
                Some(provider) if !provider.supports(&step.operation) => {
                    return Err(CoordinatorError::UnknownOperation {
                        provider_id: step.provider_id.clone(),
                        operation: step.operation.clone(),
                    });
                }
                Some(_) => {}
                None => warn!(
                    step_id = %step.step_id,
                    provider_id = %step.provider_id,
                    "⚠️ Step references a provider that is not registered yet"
                ),
            }
        }
        Ok(())
    }
}

/// Positive and small enough to become a `Duration` without panicking
fn is_valid_timeout(seconds: f64) -> bool {
    seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::models::{Payload, StepSpec, SuccessCriteria};
    use crate::registry::{Provider, ProviderError};
    use async_trait::async_trait;

    struct Scanner;

    #[async_trait]
    impl Provider for Scanner {
        fn capabilities(&self) -> Option<Vec<String>> {
            Some(vec!["scan".to_string()])
        }

        async fn invoke(&self, _operation: &str, input: Payload) -> std::result::Result<Payload, ProviderError> {
            Ok(input)
        }
    }

    fn setup() -> (WorkflowCatalog, ProviderRegistry) {
        let registry = ProviderRegistry::new(CircuitBreakerConfig::default());
        registry.register("ocr", Arc::new(Scanner));
        (WorkflowCatalog::new(ExecutionConfig::default()), registry)
    }

    #[test]
    fn test_create_and_get() {
        let (catalog, registry) = setup();
        let spec = WorkflowSpec::new(vec![
            StepSpec::new("a", "ocr", "scan"),
            StepSpec::new("b", "ocr", "scan").depends_on(["a"]),
        ]);

        let definition = catalog.create("docs", "scan twice", spec, &registry).unwrap();
        let stored = catalog.get(definition.workflow_id).unwrap();

        assert!(Arc::ptr_eq(&definition, &stored));
        assert_eq!(stored.description, "scan twice");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_rejects_cycle() {
        let (catalog, registry) = setup();
        let spec = WorkflowSpec::new(vec![
            StepSpec::new("a", "ocr", "scan").depends_on(["b"]),
            StepSpec::new("b", "ocr", "scan").depends_on(["a"]),
        ]);

        let result = catalog.create("loop", "", spec, &registry);
        assert!(matches!(result, Err(CoordinatorError::CircularDependency { .. })));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_rejects_structural_problems() {
        let (catalog, registry) = setup();

        let empty = WorkflowSpec::new(vec![]);
        assert!(matches!(
            catalog.create("empty", "", empty, &registry),
            Err(CoordinatorError::InvalidWorkflow { .. })
        ));

        let duplicate = WorkflowSpec::new(vec![
            StepSpec::new("a", "ocr", "scan"),
            StepSpec::new("a", "ocr", "scan"),
        ]);
        assert!(catalog.create("dup", "", duplicate, &registry).is_err());

        let unknown_dep =
            WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "scan").depends_on(["ghost"])]);
        assert!(catalog.create("ghost", "", unknown_dep, &registry).is_err());

        let self_dep = WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "scan").depends_on(["a"])]);
        assert!(matches!(
            catalog.create("self", "", self_dep, &registry),
            Err(CoordinatorError::CircularDependency { .. })
        ));

        let bad_required = WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "scan")])
            .with_success_criteria(SuccessCriteria {
                min_steps_completed: None,
                required_steps: ["zzz".to_string()].into_iter().collect(),
            });
        assert!(catalog.create("req", "", bad_required, &registry).is_err());
    }

    #[test]
    fn test_operation_checked_against_advertised_capabilities() {
        let (catalog, registry) = setup();

        let spec = WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "translate")]);
        assert!(matches!(
            catalog.create("bad-op", "", spec, &registry),
            Err(CoordinatorError::UnknownOperation { .. })
        ));

        // Unregistered providers are resolved at execution time
        let spec = WorkflowSpec::new(vec![StepSpec::new("a", "later", "anything")]);
        assert!(catalog.create("late", "", spec, &registry).is_ok());
    }

    #[test]
    fn test_rejects_unrepresentable_timeouts() {
        let (catalog, registry) = setup();

        let oversized_step: WorkflowSpec = serde_json::from_value(serde_json::json!({
            "steps": [{
                "step_id": "a",
                "provider_id": "ocr",
                "operation": "scan",
                "timeout_seconds": 1e30
            }]
        }))
        .unwrap();
        assert!(matches!(
            catalog.create("huge-step", "", oversized_step, &registry),
            Err(CoordinatorError::InvalidWorkflow { .. })
        ));

        let oversized_global = WorkflowSpec {
            global_timeout_seconds: Some(1e30),
            ..WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "scan")])
        };
        assert!(matches!(
            catalog.create("huge-global", "", oversized_global, &registry),
            Err(CoordinatorError::InvalidWorkflow { .. })
        ));

        let zero = WorkflowSpec::new(vec![StepSpec::new("a", "ocr", "scan")])
            .with_global_timeout(Duration::ZERO);
        assert!(catalog.create("zero", "", zero, &registry).is_err());
        assert!(catalog.is_empty());
    }
}
