//! # Provider Contract
//!
//! The narrow interface a capability provider implements to be driven by the
//! coordinator. How a provider computes its result is entirely its own business.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use conductor_core::models::Payload;
//! use conductor_core::registry::{Provider, ProviderError};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Provider for Echo {
//!     fn capabilities(&self) -> Option<Vec<String>> {
//!         Some(vec!["echo".to_string()])
//!     }
//!
//!     async fn invoke(&self, operation: &str, input: Payload) -> Result<Payload, ProviderError> {
//!         match operation {
//!             "echo" => Ok(input),
//!             other => Err(ProviderError::UnsupportedOperation(other.to_string())),
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::models::{HealthCheckReport, Payload};

/// Errors a provider reports back from an invocation or health check
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

impl ProviderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A capability provider driven as workflow steps
#[async_trait]
pub trait Provider: Send + Sync {
    /// Operations this provider supports. When `Some`, workflow creation rejects
    /// steps naming any other operation.
    fn capabilities(&self) -> Option<Vec<String>> {
        None
    }

    /// Run one operation
    async fn invoke(&self, operation: &str, input: Payload) -> Result<Payload, ProviderError>;

    /// Report liveness. Providers without a health check are assumed healthy.
    async fn health_check(&self) -> Result<HealthCheckReport, ProviderError> {
        Ok(HealthCheckReport::healthy())
    }
}
