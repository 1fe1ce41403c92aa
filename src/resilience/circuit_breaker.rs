//! # Circuit Breaker Implementation
//!
//! Fault isolation for provider calls. Three states: Closed (normal operation), Open
//! (failing fast) and Half-Open (a single trial call tests recovery).
//!
//! The open → half-open transition is evaluated lazily when the next call arrives
//! after `recovery_timeout` has passed since the last failure.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - one trial call is allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug)]
struct BreakerInner {
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker implementation with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Current circuit state; only written while `inner` is locked
    state: AtomicU8,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerInner>,
}

/// Admission decision for one call
enum Admission {
    Normal,
    Trial,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.admit() {
            Some(admission) => admission,
            None => {
                return Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                })
            }
        };

        // Re-opens the circuit if a trial call is dropped before it resolves
        let mut trial_guard = TrialGuard {
            breaker: self,
            armed: matches!(admission, Admission::Trial),
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();
        trial_guard.armed = false;

        match &result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed, performing the lazy open → half-open move
    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();

        match self.state() {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let recovered = inner
                    .last_failure_time
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);

                if recovered {
                    self.set_state(CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    info!(
                        component = %self.name,
                        "🟡 Circuit breaker half-open (testing recovery)"
                    );
                    Some(Admission::Trial)
                } else {
                    inner.metrics.rejected_calls += 1;
                    debug!(component = %self.name, "⛔ Call rejected, circuit open");
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.metrics.rejected_calls += 1;
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            }
        }
    }

    /// Record a successful operation
    fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                Self::reset(&mut inner);
                self.set_state(CircuitState::Closed);
                info!(
                    component = %self.name,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {
                // A call admitted before a forced open
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    fn record_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;
        inner.metrics.last_failure_at = Some(Utc::now());
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            failure_count = inner.failure_count,
            "🔴 Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = false;
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        self.set_state(CircuitState::Open);
        inner.trial_in_flight = false;
        error!(
            component = %self.name,
            failure_count = inner.failure_count,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn reset(inner: &mut BreakerInner) {
        inner.failure_count = 0;
        inner.trial_in_flight = false;
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if self.state() == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            self.set_state(CircuitState::Open);
            warn!(component = %self.name, "⚠️ Trial call abandoned, circuit re-opened");
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Instant::now());
        self.open(&mut inner);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        Self::reset(&mut inner);
        self.set_state(CircuitState::Closed);
    }

    /// Consecutive failures counted toward the threshold
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();

        snapshot.current_state = self.state();
        snapshot.consecutive_failures = inner.failure_count;

        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = snapshot.total_duration / snapshot.total_calls as u32;
        }

        snapshot
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}
