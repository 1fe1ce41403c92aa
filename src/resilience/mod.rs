//! # Resilience Module
//!
//! Fault isolation for provider calls. Every registered provider gets its own
//! circuit breaker so one failing provider cannot drag down executions that only
//! use healthy ones.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conductor_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     recovery_timeout: Duration::from_secs(60),
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("ocr_provider", config);
//!
//! let result = circuit_breaker.call(|| async {
//!     Ok::<&str, Box<dyn std::error::Error>>("success")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
