//! # Lifecycle Events
//!
//! Broadcast channel of execution, step, capacity and provider-health events for
//! UI or notification layers. Event names live in [`crate::constants::events`].

pub mod publisher;

pub use publisher::{CoordinatorEvent, EventPublisher};
