//! # Event Publisher
//!
//! Broadcast feed of [`EngineEvent`]s. Publishing never blocks the engine;
//! slow subscribers lag and lose the oldest events.
//!
//! ```rust
//! use brinectl_core::constants::ControlMode;
//! use brinectl_core::events::{EngineEvent, EventPublisher};
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::new(16);
//! let mut feed = publisher.subscribe();
//!
//! publisher.publish(EngineEvent::ControlModeChanged {
//!     from: ControlMode::Manual,
//!     to: ControlMode::Automatic,
//! });
//!
//! let received = feed.recv().await.unwrap();
//! assert_eq!(received.event.name(), "engine.control_mode_changed");
//! # });
//! ```

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::types::EngineEvent;

/// Lifecycle event feed for UI and telemetry consumers
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: EngineEvent,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };
        if self.sender.send(published).is_err() {
            tracing::trace!("No lifecycle event subscribers");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
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
    use crate::constants::ControlMode;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(4);
        publisher.publish(EngineEvent::ControlModeChanged {
            from: ControlMode::Manual,
            to: ControlMode::Automatic,
        });
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribers_receive_events() {
        let publisher = EventPublisher::new(4);
        let mut rx = publisher.subscribe();
        publisher.publish(EngineEvent::ControlModeChanged {
            from: ControlMode::Manual,
            to: ControlMode::Overlap,
        });
        let received = rx.try_recv().unwrap();
        assert_eq!(received.event.name(), crate::constants::events::CONTROL_MODE_CHANGED);
    }
}
