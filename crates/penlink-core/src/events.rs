//! Outward-facing agent events.
//!
//! This module provides an event-based system for receiving notifications
//! about discovered pens, connection changes and completed drawings.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use penlink_types::Drawing;

/// Device identifier for events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Hardware address.
    pub address: String,
    /// Device name if known.
    pub name: Option<String>,
}

impl DeviceId {
    /// Create a new device ID.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Create a device ID with name.
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

/// Events emitted by the agent.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AgentEvent {
    /// A vendor device was seen for the first time.
    DeviceAdded {
        device: DeviceId,
        pairing_mode: bool,
    },
    /// Connected to a device.
    DeviceConnected { device: DeviceId },
    /// Disconnected from a device.
    DeviceDisconnected { device: DeviceId },
    /// A connection attempt failed.
    ConnectionFailed { device: DeviceId, reason: String },
    /// A drawing was downloaded and reconstructed.
    DrawingReceived { device: DeviceId, drawing: Drawing },
}

impl AgentEvent {
    /// The device this event concerns.
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::DeviceAdded { device, .. }
            | Self::DeviceConnected { device }
            | Self::DeviceDisconnected { device }
            | Self::ConnectionFailed { device, .. }
            | Self::DrawingReceived { device, .. } => device,
        }
    }
}

/// Sender for agent events.
pub type EventSender = broadcast::Sender<AgentEvent>;

/// Receiver for agent events.
pub type EventReceiver = broadcast::Receiver<AgentEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: AgentEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::DeviceAdded {
            device: DeviceId::with_name("AA:BB:CC:DD:EE:FF", "Bamboo Spark"),
            pairing_mode: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"device_added\""));
        assert!(json.contains("\"pairing_mode\":true"));

        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(AgentEvent::DeviceConnected {
            device: DeviceId::new("AA"),
        });

        assert_eq!(a.recv().await.unwrap().device().address, "AA");
        assert_eq!(b.recv().await.unwrap().device().address, "AA");
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(AgentEvent::DeviceDisconnected {
            device: DeviceId::new("AA"),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
