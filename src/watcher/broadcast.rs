//! Side channel republishing every dispatched event.
//!
//! Consumers outside the observer set subscribe here. The channel is bounded;
//! a subscriber that falls behind by more than the capacity sees
//! `RecvError::Lagged` and skips ahead rather than stalling dispatch.

use tokio::sync::broadcast;

use super::Event;

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given channel capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn send(&self, event: Event) {
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "to {count} subscribers");
            }
            Err(_) => {
                crate::debug_event!("broadcast", "dropped", "no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
