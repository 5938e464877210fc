//! Error types for penlink-core.
//!
//! Most transport-level failures never surface as `Err` values: they arrive
//! as events, are logged, and the affected session is reset (see
//! [`crate::session`]). The variants below cover the operations that do
//! return results to their caller.
//!
//! | Error Type | Raised by | Recovery |
//! |------------|-----------|----------|
//! | [`Error::MissingAttribute`] | device/characteristic construction | Object is skipped |
//! | [`Error::CharacteristicNotFound`] | GATT access on a session | Wait for resolution |
//! | [`Error::NotResolved`] | GATT access before resolution | Resolve first |
//! | [`Error::UnknownDevice`] | manager/agent lookups | Caller bug or stale address |
//! | [`Error::Bluetooth`] | btleplug bridge | Logged, reported as event |
//! | [`Error::NoAdapter`] | btleplug bridge startup | Fatal for the daemon |

use thiserror::Error;

use crate::object::ObjectPath;

/// Errors that can occur in the device engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// A transport object lacks an attribute it must carry.
    #[error("Object {object} is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// The offending object.
        object: ObjectPath,
        /// The attribute name.
        attribute: &'static str,
    },

    /// Required GATT characteristic not (yet) resolved on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// GATT operation issued against a device that was never resolved.
    #[error("Device {0} has not been resolved")]
    NotResolved(String),

    /// No session exists for the given hardware address.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Connection failed.
    #[error("Connection to {device} failed: {reason}")]
    ConnectionFailed {
        /// The device object path.
        device: ObjectPath,
        /// The reason reported by the transport.
        reason: String,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Raw pen data could not be interpreted.
    #[error(transparent)]
    Parse(#[from] penlink_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a missing attribute error.
    pub fn missing_attribute(object: &ObjectPath, attribute: &'static str) -> Self {
        Self::MissingAttribute {
            object: object.clone(),
            attribute,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using penlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
