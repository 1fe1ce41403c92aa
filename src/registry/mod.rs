//! # Provider Registry
//!
//! The provider contract and the registry that owns every live provider instance
//! together with its circuit breaker and health record.
//!
//! ```text
//! ProviderRegistry
//! └── provider id → RegisteredProvider
//!     ├── Arc<dyn Provider>   (invocation contract)
//!     ├── CircuitBreaker      (fault isolation)
//!     └── ProviderHealth      (rolling statistics, alerts)
//! ```

pub mod provider;
pub mod provider_registry;

pub use provider::{Provider, ProviderError};
pub use provider_registry::{ProviderRegistry, ProviderStatus, RegisteredProvider};
