//! # Dependency Resolver
//!
//! Computes which steps of a workflow can run next and rejects dependency graphs
//! that contain cycles. All functions are pure: they look only at the step list and
//! the set of completed step ids.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::error::{CoordinatorError, Result};
use crate::models::WorkflowStep;

pub struct DependencyResolver;

impl DependencyResolver {
    /// Steps whose dependencies are all completed and which are not completed
    /// themselves. An empty ready set while steps remain means the remaining steps
    /// can never run, which is reported as a circular dependency.
    pub fn ready_steps(
        steps: &[WorkflowStep],
        completed: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let ready: BTreeSet<String> = steps
            .iter()
            .filter(|step| !completed.contains(&step.step_id))
            .filter(|step| step.dependencies.is_subset(completed))
            .map(|step| step.step_id.clone())
            .collect();

        if ready.is_empty() {
            let remaining: Vec<String> = steps
                .iter()
                .filter(|step| !completed.contains(&step.step_id))
                .map(|step| step.step_id.clone())
                .collect();

            if !remaining.is_empty() {
                return Err(CoordinatorError::CircularDependency { steps: remaining });
            }
        }

        debug!(ready = ready.len(), completed = completed.len(), "Resolved ready steps");
        Ok(ready)
    }

    /// Kahn's algorithm over the step graph. On failure the error lists every step
    /// that sits on a cycle or depends on one.
    pub fn validate_acyclic(steps: &[WorkflowStep]) -> Result<()> {
        let known: BTreeSet<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();

        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for step in steps {
            let known_deps = step
                .dependencies
                .iter()
                .filter(|dep| known.contains(dep.as_str()));
            let mut degree = 0;
            for dep in known_deps {
                degree += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step.step_id.as_str());
            }
            in_degree.insert(step.step_id.as_str(), degree);
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;

        while let Some(step_id) = queue.pop_front() {
            visited += 1;
            for dependent in dependents.get(step_id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited == in_degree.len() {
            return Ok(());
        }

        let cyclic: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        Err(CoordinatorError::CircularDependency { steps: cyclic })
    }

    /// The full wave plan: each wave holds the steps that become ready once every
    /// earlier wave is complete
    pub fn execution_waves(steps: &[WorkflowStep]) -> Result<Vec<BTreeSet<String>>> {
        let mut completed = BTreeSet::new();
        let mut waves = Vec::new();

        while completed.len() < steps.len() {
            let wave = Self::ready_steps(steps, &completed)?;
            completed.extend(wave.iter().cloned());
            waves.push(wave);
        }

        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep::new(id, "provider", "op").with_dependencies(deps.iter().copied())
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn diamond() -> Vec<WorkflowStep> {
        vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]
    }

    #[test]
    fn test_ready_steps_follow_dependencies() {
        let steps = diamond();

        assert_eq!(DependencyResolver::ready_steps(&steps, &ids(&[])).unwrap(), ids(&["a"]));
        assert_eq!(
            DependencyResolver::ready_steps(&steps, &ids(&["a"])).unwrap(),
            ids(&["b", "c"])
        );
        assert_eq!(
            DependencyResolver::ready_steps(&steps, &ids(&["a", "b"])).unwrap(),
            ids(&["c"])
        );
        assert!(DependencyResolver::ready_steps(&steps, &ids(&["a", "b", "c", "d"]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_ready_steps_reports_stuck_graph() {
        let steps = vec![step("a", &["b"]), step("b", &["a"]), step("c", &[])];

        let err = DependencyResolver::ready_steps(&steps, &ids(&["c"])).unwrap_err();
        match err {
            CoordinatorError::CircularDependency { steps } => {
                assert_eq!(steps, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validate_acyclic_accepts_dag() {
        assert!(DependencyResolver::validate_acyclic(&diamond()).is_ok());
    }

    #[test]
    fn test_validate_acyclic_reports_cycle_and_downstream() {
        let steps = vec![
            step("root", &[]),
            step("x", &["root", "z"]),
            step("y", &["x"]),
            step("z", &["y"]),
            step("after", &["z"]),
        ];

        match DependencyResolver::validate_acyclic(&steps) {
            Err(CoordinatorError::CircularDependency { steps }) => {
                assert_eq!(steps, vec!["after", "x", "y", "z"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step("a", &["a"])];
        assert!(DependencyResolver::validate_acyclic(&steps).is_err());
    }

    #[test]
    fn test_execution_waves_of_diamond() {
        let waves = DependencyResolver::execution_waves(&diamond()).unwrap();
        assert_eq!(waves, vec![ids(&["a"]), ids(&["b", "c"]), ids(&["d"])]);
    }
}
