//! GATT characteristic endpoint.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::object::{BluetoothObject, ObjectPath, PropertyMap, PropertyValue, props};
use crate::router::NotificationRouter;
use crate::transport::Transport;

/// One GATT characteristic of a resolved device.
///
/// The characteristic refers to its device by object path only; it never
/// holds the device itself.
pub struct GattCharacteristic {
    path: ObjectPath,
    uuid: Uuid,
    device: ObjectPath,
    properties: PropertyMap,
    router: NotificationRouter,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for GattCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GattCharacteristic")
            .field("uuid", &self.uuid)
            .field("path", &self.path)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl GattCharacteristic {
    /// Build a characteristic from its transport object.
    ///
    /// Fails if the object carries no parseable `UUID`.
    pub fn from_object(
        object: &BluetoothObject,
        device: &ObjectPath,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let uuid = object
            .uuid(props::UUID)
            .ok_or_else(|| Error::missing_attribute(&object.path, props::UUID))?;

        Ok(Self {
            path: object.path.clone(),
            uuid,
            device: device.clone(),
            properties: object.properties.clone(),
            router: NotificationRouter::new(),
            transport,
        })
    }

    /// Characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Object path of the characteristic.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Object path of the owning device.
    pub fn device(&self) -> &ObjectPath {
        &self.device
    }

    /// Read a cached property.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// The cached `Value`, if any.
    pub fn value(&self) -> Option<&Bytes> {
        self.property(props::VALUE).and_then(PropertyValue::as_bytes)
    }

    /// Register the handler for property `name`. Re-registering replaces it.
    pub fn connect_property<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&str, &PropertyValue) + Send + 'static,
    {
        self.router.connect_property(name, handler);
    }

    /// Enable value notifications. Required before `Value` handlers fire.
    pub fn start_notify(&self) {
        debug!(uuid = %self.uuid, "Starting notifications");
        self.transport.start_notify(&self.path);
    }

    /// Write a value without waiting for acknowledgement.
    pub fn write_value(&self, data: impl Into<Bytes>) {
        self.transport.write_value(&self.path, data.into());
    }

    /// Update the cache and route a change batch to registered handlers.
    pub fn handle_properties_changed(&mut self, changed: &PropertyMap, invalidated: &[String]) {
        for (name, value) in changed {
            self.properties.insert(name.clone(), value.clone());
        }
        for name in invalidated {
            self.properties.remove(name);
        }
        self.router.dispatch(changed);
    }
}
