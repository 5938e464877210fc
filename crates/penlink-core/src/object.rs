//! Flat transport object model.
//!
//! The Bluetooth stack reports adapters, devices, GATT services and GATT
//! characteristics as independent objects keyed by an object path, each
//! carrying a bag of cached properties. Parent relationships are expressed
//! only as path-valued properties (`Device` on a service, `Service` on a
//! characteristic) and are resolved lazily by [`crate::topology`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known property names.
pub mod props {
    /// Hardware address of a device.
    pub const ADDRESS: &str = "Address";
    /// Human-readable device name.
    pub const NAME: &str = "Name";
    /// Advertised service UUIDs of a device.
    pub const UUIDS: &str = "UUIDs";
    /// Manufacturer data keyed by company identifier.
    pub const MANUFACTURER_DATA: &str = "ManufacturerData";
    /// Whether a device is connected.
    pub const CONNECTED: &str = "Connected";
    /// Signal strength of a device.
    pub const RSSI: &str = "RSSI";
    /// Owning device of a service.
    pub const DEVICE: &str = "Device";
    /// Owning service of a characteristic.
    pub const SERVICE: &str = "Service";
    /// UUID of a service or characteristic.
    pub const UUID: &str = "UUID";
    /// Value of a characteristic.
    pub const VALUE: &str = "Value";
    /// Whether notifications are enabled on a characteristic.
    pub const NOTIFYING: &str = "Notifying";
}

/// Identifier of a transport object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Create an object path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A path nested one level below this one.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// What an object represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A local Bluetooth radio.
    Adapter,
    /// A remote device.
    Device,
    /// A GATT service on a device.
    Service,
    /// A GATT characteristic within a service.
    Characteristic,
}

/// A cached property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// String value.
    String(String),
    /// List of strings.
    Strings(Vec<String>),
    /// Raw bytes.
    Bytes(Bytes),
    /// Reference to another object.
    Path(ObjectPath),
    /// Manufacturer data keyed by company identifier.
    ManufacturerData(BTreeMap<u16, Bytes>),
}

impl PropertyValue {
    /// The value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a string list, if it is one.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::Strings(v) => Some(v),
            _ => None,
        }
    }

    /// The value as bytes, if it is a byte array.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The value as an object path, if it is one.
    pub fn as_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// The value as manufacturer data, if it is.
    pub fn as_manufacturer_data(&self) -> Option<&BTreeMap<u16, Bytes>> {
        match self {
            Self::ManufacturerData(m) => Some(m),
            _ => None,
        }
    }
}

/// Property bag of an object.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// A single transport object with its cached properties.
#[derive(Debug, Clone, PartialEq)]
pub struct BluetoothObject {
    /// Object path.
    pub path: ObjectPath,
    /// Object kind.
    pub kind: ObjectKind,
    /// Cached properties.
    pub properties: PropertyMap,
}

impl BluetoothObject {
    /// Create an object with no properties.
    pub fn new(path: impl Into<ObjectPath>, kind: ObjectKind) -> Self {
        Self {
            path: path.into(),
            kind,
            properties: PropertyMap::new(),
        }
    }

    /// Create an adapter object.
    pub fn adapter(path: impl Into<ObjectPath>) -> Self {
        Self::new(path, ObjectKind::Adapter)
    }

    /// Create a device object with its identifying attributes.
    pub fn device(path: impl Into<ObjectPath>, address: &str, name: &str) -> Self {
        Self::new(path, ObjectKind::Device)
            .with_property(props::ADDRESS, PropertyValue::String(address.to_string()))
            .with_property(props::NAME, PropertyValue::String(name.to_string()))
            .with_property(props::UUIDS, PropertyValue::Strings(Vec::new()))
            .with_property(props::CONNECTED, PropertyValue::Bool(false))
    }

    /// Create a GATT service object owned by `device`.
    pub fn service(path: impl Into<ObjectPath>, device: &ObjectPath, uuid: Uuid) -> Self {
        Self::new(path, ObjectKind::Service)
            .with_property(props::DEVICE, PropertyValue::Path(device.clone()))
            .with_property(props::UUID, PropertyValue::String(uuid.to_string()))
    }

    /// Create a GATT characteristic object owned by `service`.
    pub fn characteristic(path: impl Into<ObjectPath>, service: &ObjectPath, uuid: Uuid) -> Self {
        Self::new(path, ObjectKind::Characteristic)
            .with_property(props::SERVICE, PropertyValue::Path(service.clone()))
            .with_property(props::UUID, PropertyValue::String(uuid.to_string()))
    }

    /// Set a property, builder style.
    #[must_use]
    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Look up a cached property.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Look up a string property.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_str)
    }

    /// Look up a boolean property.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(PropertyValue::as_bool)
    }

    /// Look up a path property.
    pub fn path_property(&self, name: &str) -> Option<&ObjectPath> {
        self.property(name).and_then(PropertyValue::as_path)
    }

    /// Look up and parse a UUID property.
    pub fn uuid(&self, name: &str) -> Option<Uuid> {
        self.string(name).and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// The flat set of currently known transport objects.
///
/// Iteration is ordered by object path, so repeated passes over an unchanged
/// store visit objects in the same order.
#[derive(Debug, Default, Clone)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectPath, BluetoothObject>,
}

impl ObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object, returning the previous one.
    pub fn insert(&mut self, object: BluetoothObject) -> Option<BluetoothObject> {
        self.objects.insert(object.path.clone(), object)
    }

    /// Remove an object.
    pub fn remove(&mut self, path: &ObjectPath) -> Option<BluetoothObject> {
        self.objects.remove(path)
    }

    /// Look up an object.
    pub fn get(&self, path: &ObjectPath) -> Option<&BluetoothObject> {
        self.objects.get(path)
    }

    /// Apply a property change batch to a cached object.
    ///
    /// Returns `false` if the object is unknown.
    pub fn update_properties(
        &mut self,
        path: &ObjectPath,
        changed: &PropertyMap,
        invalidated: &[String],
    ) -> bool {
        let Some(object) = self.objects.get_mut(path) else {
            return false;
        };
        for (name, value) in changed {
            object.properties.insert(name.clone(), value.clone());
        }
        for name in invalidated {
            object.properties.remove(name);
        }
        true
    }

    /// Iterate over all objects.
    pub fn iter(&self) -> impl Iterator<Item = &BluetoothObject> {
        self.objects.values()
    }

    /// Iterate over objects of one kind.
    pub fn of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &BluetoothObject> {
        self.objects.values().filter(move |o| o.kind == kind)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
