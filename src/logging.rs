//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging concurrent workflow executions.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Console output is always enabled. A JSON log file under `log/` is added when the
/// directory can be created. `RUST_LOG` overrides the environment's default level.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        let file_ready = log_dir.exists() || fs::create_dir_all(&log_dir).is_ok();

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let (file_layer, guard) = if file_ready {
            let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(build_filter(&log_level));
            (Some(layer), Some(guard))
        } else {
            (None, None)
        };

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        // An embedding application may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            file_output = file_ready,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CONDUCTOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for execution lifecycle operations
pub fn log_execution_operation(
    operation: &str,
    execution_id: Uuid,
    workflow_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        workflow_id = %workflow_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 EXECUTION_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    execution_id: Option<Uuid>,
    step_id: &str,
    provider_id: &str,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = execution_id.map(|id| id.to_string()),
        step_id = %step_id,
        provider_id = %provider_id,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}

/// Log structured data for provider registry operations
pub fn log_registry_operation(
    operation: &str,
    provider_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        provider_id = %provider_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_helpers_do_not_panic_without_subscriber() {
        log_execution_operation("start", Uuid::new_v4(), "wf", "running", None);
        log_step_operation("invoke", None, "a", "p", "completed", Some(5));
        log_registry_operation("register", "p", "registered", Some("2 capabilities"));
        log_error("engine", "finalize", "boom", None);
    }
}
