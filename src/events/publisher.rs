//! # Event Publisher
//!
//! Fire-and-forget broadcast of coordinator lifecycle events. Publishing never
//! blocks and never fails; subscribers that fall behind see `Lagged` errors.
//!
//! ```rust
//! use conductor_core::constants::events;
//! use conductor_core::events::EventPublisher;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::new(16);
//! let mut receiver = publisher.subscribe();
//!
//! publisher.step_event(events::STEP_COMPLETED, None, "extract", json!({}));
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.name, events::STEP_COMPLETED);
//! assert_eq!(event.context["step_id"], "extract");
//! # });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::events;

/// High-throughput event publisher for coordinator lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<CoordinatorEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorEvent {
    /// One of the names in [`crate::constants::events`]
    pub name: String,
    pub execution_id: Option<Uuid>,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl CoordinatorEvent {
    pub fn new(name: impl Into<String>, execution_id: Option<Uuid>, context: Value) -> Self {
        Self {
            name: name.into(),
            execution_id,
            context,
            published_at: Utc::now(),
        }
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event: CoordinatorEvent) {
        // send() only fails when nobody is subscribed; events are fire-and-forget
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn execution_event(&self, name: &str, execution_id: Uuid, context: Value) {
        self.publish(CoordinatorEvent::new(name, Some(execution_id), context));
    }

    pub fn step_event(&self, name: &str, execution_id: Option<Uuid>, step_id: &str, context: Value) {
        let mut context = context;
        if let Value::Object(map) = &mut context {
            map.insert("step_id".to_string(), json!(step_id));
        }
        self.publish(CoordinatorEvent::new(name, execution_id, context));
    }

    pub fn capacity_changed(&self, previous: usize, current: usize, reason: &str) {
        self.publish(CoordinatorEvent::new(
            events::CAPACITY_CHANGED,
            None,
            json!({ "previous": previous, "current": current, "reason": reason }),
        ));
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        publisher.capacity_changed(10, 12, "queue_pressure");
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::default();
        let mut receiver = publisher.subscribe();
        let execution_id = Uuid::new_v4();

        publisher.step_event(
            events::STEP_COMPLETED,
            Some(execution_id),
            "extract",
            json!({ "duration_ms": 12 }),
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::STEP_COMPLETED);
        assert_eq!(event.execution_id, Some(execution_id));
        assert_eq!(event.context["step_id"], "extract");
        assert_eq!(event.context["duration_ms"], 12);
    }
}
