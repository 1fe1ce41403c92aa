//! # Conductor Demo
//!
//! Runs a small document-processing workflow against in-process mock providers and
//! prints the execution result and system metrics as JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use conductor_core::config::ConfigManager;
use conductor_core::logging::init_structured_logging;
use conductor_core::{
    CoordinatorConfig, Payload, Priority, Provider, ProviderError, StepSpec, WorkflowCoordinator,
    WorkflowSpec,
};

/// Extracts text from a document
struct OcrProvider;

#[async_trait]
impl Provider for OcrProvider {
    fn capabilities(&self) -> Option<Vec<String>> {
        Some(vec!["extract_text".to_string()])
    }

    async fn invoke(&self, _operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let document = input
            .get("document")
            .and_then(|d| d.as_str())
            .ok_or_else(|| ProviderError::InvalidInput("missing 'document'".to_string()))?;

        let mut output = Payload::new();
        output.insert("text".to_string(), json!(format!("text of {document}")));
        Ok(output)
    }
}

/// Answers for both translation and summarisation
struct LanguageProvider;

#[async_trait]
impl Provider for LanguageProvider {
    fn capabilities(&self) -> Option<Vec<String>> {
        Some(vec!["translate".to_string(), "summarize".to_string()])
    }

    async fn invoke(&self, operation: &str, input: Payload) -> Result<Payload, ProviderError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut output = Payload::new();
        match operation {
            "translate" => {
                let text = input
                    .get("extract_result")
                    .and_then(|r| r.get("text"))
                    .cloned()
                    .unwrap_or_default();
                output.insert("translated".to_string(), text);
            }
            "summarize" => {
                output.insert(
                    "summary".to_string(),
                    json!(format!("{} inputs summarised", input.len())),
                );
            }
            other => return Err(ProviderError::UnsupportedOperation(other.to_string())),
        }
        Ok(output)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let config = match ConfigManager::load() {
        Ok(manager) => manager.config().clone(),
        Err(e) => {
            info!("Using default configuration: {e}");
            CoordinatorConfig::default()
        }
    };

    let coordinator = WorkflowCoordinator::new(config).context("building coordinator")?;
    coordinator.register_provider("ocr", Arc::new(OcrProvider));
    coordinator.register_provider("language", Arc::new(LanguageProvider));
    coordinator.start().context("starting coordinator")?;

    let workflow_id = coordinator
        .create_workflow(
            "document-pipeline",
            "Extract, translate and summarise a document",
            WorkflowSpec::new(vec![
                StepSpec::new("extract", "ocr", "extract_text"),
                StepSpec::new("translate", "language", "translate").depends_on(["extract"]),
                StepSpec::new("summarize", "language", "summarize")
                    .depends_on(["extract", "translate"]),
            ]),
        )
        .context("creating workflow")?;

    let mut input = Payload::new();
    input.insert("document".to_string(), json!("invoice-42.pdf"));
    let execution_id = coordinator
        .execute_workflow(workflow_id, input, Priority::High)
        .context("submitting execution")?;

    let result = loop {
        match coordinator.get_status(execution_id) {
            Some(result) if result.status.is_terminal() => break result,
            _ => tokio::time::sleep(Duration::from_millis(25)).await,
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!(
        "{}",
        serde_json::to_string_pretty(&coordinator.get_system_metrics())?
    );

    coordinator
        .stop(coordinator.config().execution.shutdown_timeout())
        .await
        .context("stopping coordinator")?;
    Ok(())
}
