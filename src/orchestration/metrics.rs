//! # System Metrics
//!
//! Aggregates execution outcomes into system-wide counters, a rolling window of
//! execution durations, throughput over a sliding time window, and periodic
//! performance samples used for trend reporting.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::MetricsConfig;
use crate::constants::ExecutionStatus;

/// Point-in-time view of the coordinator taken by the performance collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: DateTime<Utc>,
    pub active_executions: usize,
    pub queue_size: usize,
    pub capacity: usize,
    pub utilization: f64,
    pub throughput: u64,
    pub success_rate: f64,
}

/// Cumulative execution counters plus derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub submitted_executions: u64,
    /// Executions that reached a terminal state
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub cancelled_executions: u64,
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    /// Executions finished within the throughput window
    pub throughput: u64,
    pub throughput_window_seconds: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    started_at: Instant,

    submitted_executions: AtomicU64,
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    cancelled_executions: AtomicU64,

    durations: Mutex<VecDeque<Duration>>,
    finished_at: Mutex<VecDeque<Instant>>,
    samples: Mutex<VecDeque<PerformanceSample>>,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            submitted_executions: AtomicU64::new(0),
            total_executions: AtomicU64::new(0),
            successful_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            cancelled_executions: AtomicU64::new(0),
            durations: Mutex::new(VecDeque::new()),
            finished_at: Mutex::new(VecDeque::new()),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn record_submission(&self) {
        self.submitted_executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an execution that reached a terminal state
    pub fn record_finished(&self, status: ExecutionStatus, duration: Duration) {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        match status {
            ExecutionStatus::Completed => {
                self.successful_executions.fetch_add(1, Ordering::Relaxed);
            }
            ExecutionStatus::Cancelled => {
                self.cancelled_executions.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failed_executions.fetch_add(1, Ordering::Relaxed);
            }
        }

        {
            let mut durations = self.durations.lock();
            durations.push_back(duration);
            while durations.len() > self.config.duration_window.max(1) {
                durations.pop_front();
            }
        }

        let now = Instant::now();
        let mut finished_at = self.finished_at.lock();
        finished_at.push_back(now);
        Self::prune_window(&mut finished_at, now, self.config.throughput_window());
    }

    /// Executions finished within the last throughput window
    pub fn throughput(&self) -> u64 {
        let mut finished_at = self.finished_at.lock();
        Self::prune_window(&mut finished_at, Instant::now(), self.config.throughput_window());
        finished_at.len() as u64
    }

    fn prune_window(finished_at: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = finished_at.front() {
            if now.duration_since(*oldest) > window {
                finished_at.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_executions.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successful_executions.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn average_execution_time(&self) -> Duration {
        let durations = self.durations.lock();
        if durations.is_empty() {
            return Duration::ZERO;
        }
        durations.iter().sum::<Duration>() / durations.len() as u32
    }

    pub fn record_sample(&self, sample: PerformanceSample) {
        let mut samples = self.samples.lock();
        samples.push_back(sample);
        while samples.len() > self.config.max_samples.max(1) {
            samples.pop_front();
        }
    }

    /// The most recent `count` samples, oldest first
    pub fn recent_samples(&self, count: usize) -> Vec<PerformanceSample> {
        let samples = self.samples.lock();
        let skip = samples.len().saturating_sub(count);
        samples.iter().skip(skip).cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted_executions: self.submitted_executions.load(Ordering::Relaxed),
            total_executions: self.total_executions.load(Ordering::Relaxed),
            successful_executions: self.successful_executions.load(Ordering::Relaxed),
            failed_executions: self.failed_executions.load(Ordering::Relaxed),
            cancelled_executions: self.cancelled_executions.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
            average_execution_time_ms: self.average_execution_time().as_secs_f64() * 1000.0,
            throughput: self.throughput(),
            throughput_window_seconds: self.config.throughput_window_seconds,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}
