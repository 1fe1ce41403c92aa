//! # Auto-Scaling Engine
//!
//! Additive control of the execution engine's concurrency cap. A deep queue with every
//! slot busy raises the cap, an idle engine with an empty queue lowers it, and the
//! cap always stays within the configured bounds.

use tracing::{debug, info};

use crate::config::ScalingConfig;

/// Scaling action recommendations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingAction {
    /// Raise the concurrency cap by `count`
    ScaleUp { count: usize },
    /// Lower the concurrency cap by `count`
    ScaleDown { count: usize },
    /// No scaling action needed
    NoChange,
}

impl ScalingAction {
    /// Apply the action to `capacity`
    pub fn apply(&self, capacity: usize) -> usize {
        match self {
            Self::ScaleUp { count } => capacity + count,
            Self::ScaleDown { count } => capacity.saturating_sub(*count),
            Self::NoChange => capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoScaler {
    config: ScalingConfig,
}

impl AutoScaler {
    pub fn new(config: ScalingConfig) -> Self {
        info!(
            "🎛️ SCALING: Creating auto-scaler (enabled: {}, bounds: {}..={})",
            config.enabled, config.min_concurrent_workflows, config.max_concurrent_workflows
        );
        Self { config }
    }

    pub fn config(&self) -> &ScalingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Decide how the cap should move given the current load
    pub fn evaluate(&self, queue_depth: usize, active: usize, capacity: usize) -> ScalingAction {
        if !self.config.enabled {
            return ScalingAction::NoChange;
        }

        let min = self.config.min_concurrent_workflows;
        let max = self.config.max_concurrent_workflows;

        if queue_depth > self.config.scale_up_queue_threshold && active >= capacity {
            let target = (capacity + self.config.scale_up_step).min(max);
            if target > capacity {
                info!(
                    "SCALING: Queue depth {} with all {} slots busy, raising cap to {}",
                    queue_depth, capacity, target
                );
                return ScalingAction::ScaleUp {
                    count: target - capacity,
                };
            }
            debug!("SCALING: At maximum capacity ({}) with queue depth {}", max, queue_depth);
        } else if queue_depth == 0 && active < capacity / 2 && capacity > min {
            let target = capacity.saturating_sub(self.config.scale_down_step).max(min);
            if target < capacity {
                info!(
                    "SCALING: Low load ({} of {} slots busy), lowering cap to {}",
                    active, capacity, target
                );
                return ScalingAction::ScaleDown {
                    count: capacity - target,
                };
            }
        }

        ScalingAction::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaler() -> AutoScaler {
        AutoScaler::new(ScalingConfig::default())
    }

    #[test]
    fn test_scale_up_on_deep_queue_at_capacity() {
        let action = scaler().evaluate(6, 10, 10);
        assert_eq!(action, ScalingAction::ScaleUp { count: 2 });
        assert_eq!(action.apply(10), 12);
    }

    #[test]
    fn test_no_scale_up_when_slots_free_or_queue_shallow() {
        assert_eq!(scaler().evaluate(6, 9, 10), ScalingAction::NoChange);
        assert_eq!(scaler().evaluate(5, 10, 10), ScalingAction::NoChange);
    }

    #[test]
    fn test_scale_up_is_capped_at_maximum() {
        assert_eq!(scaler().evaluate(20, 49, 49), ScalingAction::ScaleUp { count: 1 });
        assert_eq!(scaler().evaluate(20, 50, 50), ScalingAction::NoChange);
    }

    #[test]
    fn test_scale_down_when_idle() {
        let action = scaler().evaluate(0, 2, 10);
        assert_eq!(action, ScalingAction::ScaleDown { count: 1 });
        assert_eq!(action.apply(10), 9);
    }

    #[test]
    fn test_never_scales_below_minimum() {
        assert_eq!(scaler().evaluate(0, 0, 5), ScalingAction::NoChange);
        assert_eq!(scaler().evaluate(0, 0, 6), ScalingAction::ScaleDown { count: 1 });
    }

    #[test]
    fn test_disabled_scaler_never_acts() {
        let scaler = AutoScaler::new(ScalingConfig {
            enabled: false,
            ..ScalingConfig::default()
        });
        assert_eq!(scaler.evaluate(100, 10, 10), ScalingAction::NoChange);
    }
}
