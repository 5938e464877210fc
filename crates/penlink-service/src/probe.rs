//! Fallback driver that only watches the pen's data characteristics.
//!
//! The vendor download protocol is not part of this crate. The probe keeps
//! the daemon useful without it: on retrieval it subscribes to every known
//! data characteristic the pen exposes and logs what arrives. It never
//! reports a drawing and never finishes, so the pen stays connected until
//! it drops the link itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};
use uuid::Uuid;

use penlink_core::{
    DeviceSession, Error, PenProtocol, PropertyValue, ProtocolEvent, ProtocolSink, Result,
};
use penlink_types::uuids::{LIVE_PEN_DATA, NORDIC_UART_RX, OFFLINE_PEN_DATA};

/// Characteristics the probe subscribes to.
pub const WATCHED: [Uuid; 3] = [LIVE_PEN_DATA, OFFLINE_PEN_DATA, NORDIC_UART_RX];

/// Render bytes as space-separated hex.
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Logging-only [`PenProtocol`].
#[derive(Debug)]
pub struct NotificationProbe {
    address: String,
    sink: ProtocolSink,
    working: bool,
    received: Arc<AtomicUsize>,
}

impl NotificationProbe {
    /// Create a probe for the pen at `address`.
    pub fn new(address: &str, sink: ProtocolSink) -> Self {
        Self {
            address: address.to_string(),
            sink,
            working: false,
            received: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a boxed probe. Usable directly as a
    /// [`ProtocolFactory`](penlink_core::ProtocolFactory).
    pub fn boxed(address: &str, sink: ProtocolSink) -> Box<dyn PenProtocol> {
        Box::new(Self::new(address, sink))
    }

    /// Notifications seen since creation.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }
}

impl PenProtocol for NotificationProbe {
    fn is_working(&self) -> bool {
        self.working
    }

    fn start_retrieval(&mut self, session: &mut DeviceSession) -> Result<()> {
        let mut watched = 0;
        for uuid in WATCHED {
            let address = self.address.clone();
            let received = Arc::clone(&self.received);
            let result = session.connect_gatt_value(&uuid, move |_, value| {
                received.fetch_add(1, Ordering::Relaxed);
                match value {
                    PropertyValue::Bytes(data) => {
                        info!(%address, %uuid, len = data.len(), data = %hex(data), "Notification");
                    }
                    other => debug!(%address, %uuid, ?other, "Unexpected value type"),
                }
            });
            match result {
                Ok(()) => watched += 1,
                Err(Error::CharacteristicNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if watched == 0 {
            warn!(address = %self.address, "Pen exposes none of the known data characteristics");
            return Ok(());
        }
        info!(address = %self.address, watched, "Watching pen notifications");
        self.working = true;
        Ok(())
    }

    fn start_pairing(&mut self, _session: &mut DeviceSession) -> Result<()> {
        warn!(address = %self.address, "No pairing exchange available, leaving pairing mode");
        self.sink.send(ProtocolEvent::PairingComplete);
        Ok(())
    }

    fn on_disconnected(&mut self) {
        self.working = false;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use penlink_core::object::props;
    use penlink_core::protocol::protocol_channel;
    use penlink_core::{
        BleDevice, BluetoothObject, MockTransport, ObjectPath, ObjectStore, PropertyMap,
        Transport, TransportCall,
    };

    use super::*;

    fn session(transport: &Arc<MockTransport>, with_chars: bool) -> DeviceSession {
        let mut store = ObjectStore::new();
        let device = BluetoothObject::device("/d", "AA", "Bamboo Spark");
        store.insert(device.clone());
        if with_chars {
            let service = ObjectPath::new("/d/service0010");
            store.insert(BluetoothObject::service(service.clone(), &device.path, Uuid::nil()));
            store.insert(BluetoothObject::characteristic(
                "/d/service0010/char0011",
                &service,
                LIVE_PEN_DATA,
            ));
        }

        let mut session = DeviceSession::new(
            BleDevice::from_object(&device).unwrap(),
            true,
            Arc::clone(transport) as Arc<dyn Transport>,
        );
        session.resolve(&store);
        session
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "");
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00 ab 10");
    }

    #[test]
    fn test_retrieval_subscribes_known_characteristics() {
        let transport = MockTransport::shared();
        let mut session = session(&transport, true);
        let (tx, _rx) = protocol_channel();
        let mut probe = NotificationProbe::new("AA", ProtocolSink::new("AA", tx));

        probe.start_retrieval(&mut session).unwrap();
        assert!(probe.is_working());
        assert_eq!(
            transport.calls(),
            vec![TransportCall::StartNotify(ObjectPath::new(
                "/d/service0010/char0011"
            ))]
        );

        let mut changed = PropertyMap::new();
        changed.insert(
            props::VALUE.to_string(),
            PropertyValue::Bytes(Bytes::from_static(&[1, 2])),
        );
        assert!(session.handle_characteristic_changed(&LIVE_PEN_DATA, &changed, &[]));
        assert_eq!(probe.received(), 1);

        probe.on_disconnected();
        assert!(!probe.is_working());
    }

    #[test]
    fn test_retrieval_without_characteristics() {
        let transport = MockTransport::shared();
        let mut session = session(&transport, false);
        let (tx, _rx) = protocol_channel();
        let mut probe = NotificationProbe::new("AA", ProtocolSink::new("AA", tx));

        probe.start_retrieval(&mut session).unwrap();
        assert!(!probe.is_working());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_pairing_completes_immediately() {
        let transport = MockTransport::shared();
        let mut session = session(&transport, true);
        let (tx, mut rx) = protocol_channel();
        let mut probe = NotificationProbe::boxed("AA", ProtocolSink::new("AA", tx));

        probe.start_pairing(&mut session).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ("AA".to_string(), ProtocolEvent::PairingComplete)
        );
        assert!(!probe.is_working());
    }
}
