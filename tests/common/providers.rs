//! Mock providers used across integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use conductor_core::{HealthCheckReport, Payload, Provider, ProviderError};

/// Echoes its input after an optional delay and reports the operation it ran.
/// Operations listed in `failing_operations` always fail.
pub struct MockProvider {
    delay: Duration,
    failing_operations: HashSet<String>,
    pub calls: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            failing_operations: HashSet::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, operation: &str) -> Self {
        self.failing_operations.insert(operation.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn invoke(&self, operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_operations.contains(operation) {
            return Err(ProviderError::failed(format!("{operation} exploded")));
        }

        let mut output = input;
        output.insert("operation".to_string(), json!(operation));
        Ok(output)
    }
}

/// Fails while `failing` is set; records the instant of every call
pub struct SwitchableProvider {
    pub failing: AtomicBool,
    pub call_times: Mutex<Vec<Instant>>,
}

impl SwitchableProvider {
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.call_times.lock().len()
    }
}

#[async_trait]
impl Provider for SwitchableProvider {
    async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        self.call_times.lock().push(Instant::now());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::failed("service unavailable"));
        }
        Ok(input)
    }
}

/// Tracks how many invocations are in flight at once
pub struct ConcurrencyTracker {
    delay: Duration,
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ConcurrencyTracker {
    async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(input)
    }
}

/// One recorded invocation of a [`RecordingProvider`]
#[derive(Debug, Clone)]
pub struct Invocation {
    pub step: String,
    pub started: Instant,
    pub finished: Instant,
    pub input: Payload,
}

/// Records which step ran when; the step name comes from the `"step"` input key
pub struct RecordingProvider {
    delay: Duration,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl RecordingProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocation(&self, step: &str) -> Option<Invocation> {
        self.invocations
            .lock()
            .iter()
            .find(|invocation| invocation.step == step)
            .cloned()
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        let started = Instant::now();
        tokio::time::sleep(self.delay).await;
        let step = input
            .get("step")
            .and_then(|step| step.as_str())
            .unwrap_or_default()
            .to_string();

        self.invocations.lock().push(Invocation {
            step: step.clone(),
            started,
            finished: Instant::now(),
            input: input.clone(),
        });

        let mut output = Payload::new();
        output.insert("produced_by".to_string(), json!(step));
        Ok(output)
    }
}

/// Provider whose health check always fails
pub struct SickProvider;

#[async_trait]
impl Provider for SickProvider {
    async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        Ok(input)
    }

    async fn health_check(&self) -> Result<HealthCheckReport, ProviderError> {
        Err(ProviderError::failed("dependency down"))
    }
}
