//! Transport seam between the engine and a Bluetooth stack.
//!
//! Events flow in as [`TransportEvent`]s, delivered one at a time on the
//! agent's loop. Operations flow out through the [`Transport`] trait. Every
//! operation is fire-and-forget: it returns immediately and any completion
//! or failure is delivered later as another event on the same loop.

use bytes::Bytes;

use crate::object::{BluetoothObject, ObjectPath, PropertyMap};

/// Outgoing operation kinds, used to label asynchronous failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Device connection.
    Connect,
    /// Device disconnection.
    Disconnect,
    /// Characteristic write.
    Write,
    /// Enabling characteristic notifications.
    StartNotify,
    /// Starting device discovery on an adapter.
    StartDiscovery,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::Write => write!(f, "write"),
            Self::StartNotify => write!(f, "start-notify"),
            Self::StartDiscovery => write!(f, "start-discovery"),
        }
    }
}

/// Events reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A new object appeared.
    ObjectAdded(BluetoothObject),
    /// An object disappeared.
    ObjectRemoved(ObjectPath),
    /// Cached properties of an object changed.
    PropertiesChanged {
        /// The object whose properties changed.
        path: ObjectPath,
        /// New property values.
        changed: PropertyMap,
        /// Properties that are no longer cached.
        invalidated: Vec<String>,
    },
    /// A connect call finished.
    ConnectCompleted {
        /// The device object.
        path: ObjectPath,
        /// `Err` carries the transport's failure message.
        result: Result<(), String>,
    },
    /// Any other fire-and-forget call failed.
    CallFailed {
        /// The object the call was issued against.
        path: ObjectPath,
        /// Which operation failed.
        operation: Operation,
        /// The transport's failure message.
        error: String,
    },
}

impl TransportEvent {
    /// Convenience constructor for a single-property change.
    pub fn property_changed(
        path: ObjectPath,
        name: &str,
        value: crate::object::PropertyValue,
    ) -> Self {
        let mut changed = PropertyMap::new();
        changed.insert(name.to_string(), value);
        Self::PropertiesChanged {
            path,
            changed,
            invalidated: Vec::new(),
        }
    }
}

/// Fire-and-forget operations on a Bluetooth stack.
///
/// Implementations must not block; long-running work is spawned and its
/// outcome reported back as a [`TransportEvent`].
pub trait Transport: Send + Sync {
    /// Connect to a device. Completion arrives as
    /// [`TransportEvent::ConnectCompleted`].
    fn connect(&self, device: &ObjectPath);

    /// Disconnect from a device.
    fn disconnect(&self, device: &ObjectPath);

    /// Write a value to a characteristic.
    fn write_value(&self, characteristic: &ObjectPath, data: Bytes);

    /// Enable value-change notifications on a characteristic.
    fn start_notify(&self, characteristic: &ObjectPath);

    /// Start device discovery on an adapter.
    fn start_discovery(&self, adapter: &ObjectPath);
}
