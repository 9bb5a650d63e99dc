//! Non-blocking event bus (spec §5 "Event Bus: non-blocking broadcast of
//! operational events").
//!
//! A thin wrapper over `tokio::sync::broadcast`: publishers never block on
//! slow or absent subscribers (broadcast drops the oldest buffered event for
//! a lagging receiver rather than backpressuring the publisher).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Operational events other parts of the system may want to observe
/// (logging sinks, a future dashboard, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RunStarted {
        conversation_id: String,
        source: String,
    },
    RunCompleted {
        conversation_id: String,
        model: String,
        finish_reason: String,
    },
    ToolInvoked {
        tool_name: String,
        success: bool,
    },
    AnticipationFired {
        anticipation_id: String,
    },
    BridgeAdmissionRejected {
        source: String,
        reason: String,
    },
}

/// One bus event with a publish timestamp.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: Event,
    pub at: DateTime<Utc>,
}

/// Non-blocking broadcast bus. Clone to get an independent publisher handle;
/// call `subscribe()` for a new receiver.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// `capacity` bounds the buffer; slow subscribers miss the oldest events
    /// instead of stalling publishers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Publish an event. Never blocks; returns the number of live
    /// subscribers that received it (0 if none are listening).
    pub fn publish(&self, event: Event) -> usize {
        let envelope = Envelope { event, at: Utc::now() };
        self.tx.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::ToolInvoked {
            tool_name: "read_file".into(),
            success: true,
        });

        let envelope = rx.recv().await.unwrap();
        matches!(envelope.event, Event::ToolInvoked { .. });
    }

    #[test]
    fn test_publish_without_subscribers_does_not_error() {
        let bus = EventBus::new(4);
        let delivered = bus.publish(Event::AnticipationFired {
            anticipation_id: "a1".into(),
        });
        assert_eq!(delivered, 0);
    }
}
