//! # Provider Registry
//!
//! Maps provider ids to the live provider instance, its circuit breaker and its
//! rolling health record. Registration is the only mutation; lookups are lock-free
//! reads of a `DashMap`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::Provider;
use crate::config::CircuitBreakerConfig;
use crate::constants::HealthStatus;
use crate::logging::log_registry_operation;
use crate::models::{HealthCheckReport, ProviderHealth};
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};

/// A provider together with the coordinator-side state kept for it
pub struct RegisteredProvider {
    id: String,
    provider: Arc<dyn Provider>,
    capabilities: Option<BTreeSet<String>>,
    breaker: CircuitBreaker,
    health: RwLock<ProviderHealth>,
    registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("circuit_state", &self.breaker.state())
            .finish()
    }
}

impl RegisteredProvider {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Whether the provider advertises `operation`. Providers without advertised
    /// capabilities accept any operation name.
    pub fn supports(&self, operation: &str) -> bool {
        self.capabilities
            .as_ref()
            .map(|ops| ops.contains(operation))
            .unwrap_or(true)
    }

    pub fn advertises_capabilities(&self) -> bool {
        self.capabilities.is_some()
    }

    /// Snapshot of the health record
    pub fn health(&self) -> ProviderHealth {
        self.health.read().clone()
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.read().status
    }

    pub fn record_call(&self, elapsed: Duration, success: bool) {
        self.health.write().record_call(elapsed, success);
    }

    /// Apply a health check outcome; returns the status before and after
    pub fn record_check(
        &self,
        outcome: Result<HealthCheckReport, String>,
        elapsed: Duration,
        max_alerts: usize,
    ) -> (HealthStatus, HealthStatus) {
        let mut health = self.health.write();
        let before = health.status;
        match outcome {
            Ok(report) => health.record_check(report, elapsed),
            Err(message) => health.record_check_failure(message, max_alerts),
        }
        (before, health.status)
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            provider_id: self.id.clone(),
            circuit_state: self.breaker.state(),
            circuit_metrics: self.breaker.metrics(),
            health: self.health(),
        }
    }
}

/// Per-provider view included in system metrics
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub circuit_state: CircuitState,
    pub circuit_metrics: CircuitBreakerMetrics,
    pub health: ProviderHealth,
}

/// Registry of live providers keyed by id
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<RegisteredProvider>>,
    breaker_config: CircuitBreakerConfig,
}

impl ProviderRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            providers: DashMap::new(),
            breaker_config,
        }
    }

    /// Whether provider calls go through circuit breakers
    pub fn breakers_enabled(&self) -> bool {
        self.breaker_config.enabled
    }

    /// Register a provider under `provider_id`. Returns `false` and leaves the
    /// existing registration untouched when the id is already taken.
    pub fn register(&self, provider_id: &str, provider: Arc<dyn Provider>) -> bool {
        if provider_id.trim().is_empty() {
            warn!("⚠️ Refusing to register provider with an empty id");
            return false;
        }

        let entry = match self.providers.entry(provider_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                log_registry_operation(
                    "register",
                    provider_id,
                    "rejected",
                    Some("provider id already registered"),
                );
                return false;
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        let capabilities = provider
            .capabilities()
            .map(|ops| ops.into_iter().collect::<BTreeSet<_>>());
        let breaker = CircuitBreaker::new(
            provider_id,
            self.breaker_config
                .config_for_component(provider_id)
                .to_resilience_config(),
        );

        let details = capabilities
            .as_ref()
            .map(|ops| format!("{} capabilities", ops.len()))
            .unwrap_or_else(|| "capabilities not advertised".to_string());

        entry.insert(Arc::new(RegisteredProvider {
            id: provider_id.to_string(),
            provider,
            capabilities,
            breaker,
            health: RwLock::new(ProviderHealth::default()),
            registered_at: Utc::now(),
        }));

        log_registry_operation("register", provider_id, "registered", Some(&details));
        true
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<RegisteredProvider>> {
        self.providers
            .get(provider_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Registered ids in sorted order
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// All registered providers, cloned out so no map shard stays locked
    pub fn all(&self) -> Vec<Arc<RegisteredProvider>> {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        let statuses: Vec<_> = self.all().iter().map(|p| p.status()).collect();
        debug!(providers = statuses.len(), "Collected provider statuses");
        statuses
    }
}
