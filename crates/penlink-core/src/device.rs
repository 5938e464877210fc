//! Identity of a discovered smartpen.

use std::collections::BTreeMap;

use bytes::Bytes;

use penlink_types::uuids::PAIRING_MODE_DATA_LEN;

use crate::error::{Error, Result};
use crate::object::{BluetoothObject, ObjectPath, PropertyValue, props};

/// Advertised identity of a device, captured from its transport object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleDevice {
    /// Object path of the device.
    pub path: ObjectPath,
    /// Hardware address, the deduplication key.
    pub address: String,
    /// Human-readable name.
    pub name: String,
    /// Advertised service UUIDs.
    pub uuids: Vec<String>,
    /// Company identifier of the first manufacturer data entry.
    pub vendor_id: Option<u16>,
    /// Manufacturer data payloads keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Bytes>,
}

impl BleDevice {
    /// Build from a device object.
    ///
    /// `Address`, `Name` and `UUIDs` are required; construction fails
    /// without them.
    pub fn from_object(object: &BluetoothObject) -> Result<Self> {
        let address = object
            .string(props::ADDRESS)
            .ok_or_else(|| Error::missing_attribute(&object.path, props::ADDRESS))?;
        let name = object
            .string(props::NAME)
            .ok_or_else(|| Error::missing_attribute(&object.path, props::NAME))?;
        let uuids = object
            .property(props::UUIDS)
            .and_then(PropertyValue::as_strings)
            .ok_or_else(|| Error::missing_attribute(&object.path, props::UUIDS))?;

        let mut device = Self {
            path: object.path.clone(),
            address: address.to_string(),
            name: name.to_string(),
            uuids: uuids.to_vec(),
            vendor_id: None,
            manufacturer_data: BTreeMap::new(),
        };
        if let Some(data) = object
            .property(props::MANUFACTURER_DATA)
            .and_then(PropertyValue::as_manufacturer_data)
        {
            device.set_manufacturer_data(data.clone());
        }
        Ok(device)
    }

    /// Replace the manufacturer data, refreshing the vendor id.
    pub fn set_manufacturer_data(&mut self, data: BTreeMap<u16, Bytes>) {
        self.vendor_id = data.keys().next().copied();
        self.manufacturer_data = data;
    }

    /// Whether the device advertises in pairing mode.
    ///
    /// A payload of exactly four bytes under `company_id` marks pairing
    /// mode. Any other length, or no payload at all, is normal mode.
    pub fn pairing_mode(&self, company_id: u16) -> bool {
        self.manufacturer_data
            .get(&company_id)
            .is_some_and(|data| data.len() == PAIRING_MODE_DATA_LEN)
    }
}
