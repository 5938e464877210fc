//! Bluetooth identifiers for the supported smartpen devices.
//!
//! This module contains the vendor company identifier used to recognise
//! devices from their advertisements and the GATT characteristic UUIDs
//! the pen protocol talks to.

use uuid::{Uuid, uuid};

/// Vendor company identifier carried in advertisement manufacturer data.
pub const VENDOR_COMPANY_ID: u16 = 0x4755;

/// Manufacturer data length that marks a device advertising in pairing mode.
pub const PAIRING_MODE_DATA_LEN: usize = 4;

// --- Vendor pen data characteristics ---

/// Live pen data characteristic (points streamed while drawing).
pub const LIVE_PEN_DATA: Uuid = uuid!("00001524-1212-efde-1523-785feabcd123");

/// Offline pen data characteristic (stored drawings transferred on sync).
pub const OFFLINE_PEN_DATA: Uuid = uuid!("ffee0003-bbaa-9988-7766-554433221100");

// --- Nordic UART service ---

/// Nordic UART service.
pub const NORDIC_UART_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// Nordic UART TX characteristic (host to device commands).
pub const NORDIC_UART_TX: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Nordic UART RX characteristic (device to host replies).
pub const NORDIC_UART_RX: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");
