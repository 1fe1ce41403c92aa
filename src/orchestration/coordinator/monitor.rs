//! # Health Monitoring
//!
//! Polls every registered provider's health check under a timeout and folds the
//! outcome into the provider's health record. Status changes are published as
//! events; failed or timed-out checks raise alerts on the provider.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::constants::{events, HealthStatus};
use crate::events::{CoordinatorEvent, EventPublisher};
use crate::registry::{ProviderRegistry, RegisteredProvider};

/// Result of one health check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCycleReport {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Providers whose status changed during this cycle
    pub changed: Vec<String>,
}

/// Health monitoring system for registered providers
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    config: HealthConfig,
    registry: Arc<ProviderRegistry>,
    events: EventPublisher,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, registry: Arc<ProviderRegistry>, events: EventPublisher) -> Self {
        info!(
            "🏥 HEALTH: Creating health monitor (interval: {}s, timeout: {}ms)",
            config.check_interval_seconds, config.check_timeout_ms
        );
        Self {
            config,
            registry,
            events,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Run one health check over every registered provider
    pub async fn check_all(&self) -> HealthCycleReport {
        let providers = self.registry.all();
        let checks = providers.iter().map(|provider| self.check_provider(provider));
        let outcomes = futures::future::join_all(checks).await;

        let mut report = HealthCycleReport {
            checked: outcomes.len(),
            ..HealthCycleReport::default()
        };
        for (provider, (before, after)) in providers.iter().zip(outcomes) {
            match after {
                HealthStatus::Healthy => report.healthy += 1,
                HealthStatus::Unhealthy => report.unhealthy += 1,
            }
            if before != after {
                report.changed.push(provider.id().to_string());
            }
        }

        debug!(
            checked = report.checked,
            healthy = report.healthy,
            unhealthy = report.unhealthy,
            "HEALTH: Check cycle complete"
        );
        report
    }

    async fn check_provider(&self, provider: &RegisteredProvider) -> (HealthStatus, HealthStatus) {
        let started = Instant::now();
        let outcome = match timeout(self.config.check_timeout(), provider.provider().health_check()).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(error)) => Err(format!("health check failed: {error}")),
            Err(_) => Err(format!(
                "health check timed out after {}ms",
                self.config.check_timeout_ms
            )),
        };

        if let Err(message) = &outcome {
            warn!(provider_id = %provider.id(), error = %message, "🚨 HEALTH ALERT");
        }

        let (before, after) = provider.record_check(outcome, started.elapsed(), self.config.max_alerts);
        if before != after {
            info!(
                provider_id = %provider.id(),
                from = %before,
                to = %after,
                "🏥 HEALTH: Provider status changed"
            );
            self.events.publish(CoordinatorEvent::new(
                events::PROVIDER_HEALTH_CHANGED,
                None,
                json!({ "provider_id": provider.id(), "from": before, "to": after }),
            ));
        }
        (before, after)
    }
}
