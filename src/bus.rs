//! Event bus for publishing observable device state
//!
//! Uses tokio::sync::broadcast for pub/sub. The external control
//! surface subscribes here to mirror power, volume, mute, and input
//! state into whatever characteristic model it renders.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event types that can be published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    /// A reconciliation pass produced a fresh merged device set.
    DevicesReconciled { count: usize },
    /// Reachability / power state observed or echoed for a device.
    ActiveChanged { usn: String, active: bool },
    VolumeChanged { usn: String, volume: u8 },
    MuteChanged { usn: String, muted: bool },
    BrightnessChanged { usn: String, brightness: u8 },
    /// The externally visible "current input" indicator moved.
    InputChanged { usn: String, index: usize },
    PairingSucceeded { usn: String },
    PairingFailed { usn: String, reason: String },
    ShuttingDown,
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
