//! Per-device connection and pairing state machine.
//!
//! ```text
//!                connect_device()
//!  Disconnected ─────────────────▶ Connecting
//!       ▲  ▲                          │   │
//!       │  └──── connect failed ──────┘   │ Connected = true
//!       │                                 ▼
//!       └──── Connected = false ───── Connected ◀──┐
//!       │                                 │        │ pairing finished
//!       │                    StartPairing │        │
//!       └──── Connected = false ──── PairingPending┘
//! ```
//!
//! Connection attempts have no timeout and are never retried here; a
//! failed attempt returns the session to `Disconnected` and the caller
//! decides whether to connect again.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::characteristic::GattCharacteristic;
use crate::device::BleDevice;
use crate::error::{Error, Result};
use crate::object::{ObjectPath, ObjectStore, PropertyMap, PropertyValue, props};
use crate::topology::{self, CharacteristicMap, Resolution};
use crate::transport::Transport;

/// Connectivity state of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// A connect call has been issued.
    Connecting,
    /// Connected; retrieval may be running.
    Connected,
    /// Connected and the pairing protocol is running.
    PairingPending,
}

impl SessionState {
    /// Whether the session has reached a connected state.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::PairingPending)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::PairingPending => write!(f, "pairing"),
        }
    }
}

/// Lifecycle events emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The link came up.
    Connected,
    /// The link went down.
    Disconnected,
    /// A connect attempt failed.
    ConnectFailed {
        /// Failure reported by the transport.
        reason: String,
    },
}

/// What to do once a connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    /// Run the pairing protocol.
    StartPairing,
    /// Run normal data retrieval.
    StartRetrieval,
}

/// Connection state and resolved GATT endpoints of one physical device.
pub struct DeviceSession {
    device: BleDevice,
    state: SessionState,
    pairing_requested: bool,
    transport_connected: bool,
    resolved: bool,
    characteristics: CharacteristicMap,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("address", &self.device.address)
            .field("name", &self.device.name)
            .field("state", &self.state)
            .field("pairing_requested", &self.pairing_requested)
            .field("characteristics", &self.characteristics.len())
            .finish()
    }
}

impl DeviceSession {
    /// Create a session for `device`.
    ///
    /// `connected` is the transport's current view of the link. The session
    /// itself starts `Disconnected`; for a device whose link is already up
    /// the first [`connect_device`](Self::connect_device) completes
    /// synchronously.
    pub fn new(device: BleDevice, connected: bool, transport: Arc<dyn Transport>) -> Self {
        Self {
            device,
            state: SessionState::Disconnected,
            pairing_requested: false,
            transport_connected: connected,
            resolved: false,
            characteristics: CharacteristicMap::new(),
            transport,
        }
    }

    /// Advertised identity.
    pub fn device(&self) -> &BleDevice {
        &self.device
    }

    /// Mutable advertised identity.
    pub fn device_mut(&mut self) -> &mut BleDevice {
        &mut self.device
    }

    /// Hardware address.
    pub fn address(&self) -> &str {
        &self.device.address
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.device.name
    }

    /// Device object path.
    pub fn path(&self) -> &ObjectPath {
        &self.device.path
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a pairing request is waiting for the next connection.
    pub fn pairing_requested(&self) -> bool {
        self.pairing_requested
    }

    /// Whether the session has been resolved at least once.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolved characteristics.
    pub fn characteristics(&self) -> &CharacteristicMap {
        &self.characteristics
    }

    /// Populate the characteristic map from the current object set.
    pub fn resolve(&mut self, store: &ObjectStore) -> Resolution {
        self.resolved = true;
        topology::resolve(
            store,
            &self.device.path,
            &mut self.characteristics,
            &self.transport,
        )
    }

    /// Request a connection.
    ///
    /// If the transport already reports the link as up the session moves
    /// straight to `Connected` and the event is returned immediately. A
    /// session that is already connected or connecting is left alone; its
    /// connected event has been reported once already.
    pub fn connect_device(&mut self) -> Option<SessionEvent> {
        if self.state.is_connected() {
            debug!(address = %self.device.address, state = %self.state, "Already connected");
            return None;
        }
        if self.transport_connected {
            info!(address = %self.device.address, "Device is already connected");
            self.state = SessionState::Connected;
            return Some(SessionEvent::Connected);
        }
        if self.state == SessionState::Connecting {
            debug!(address = %self.device.address, "Connect already in progress");
            return None;
        }

        info!(address = %self.device.address, "Connecting");
        self.state = SessionState::Connecting;
        self.transport.connect(&self.device.path);
        None
    }

    /// Set the pairing flag and connect.
    pub fn request_pairing(&mut self) -> Option<SessionEvent> {
        debug!(address = %self.device.address, "Pairing requested");
        self.pairing_requested = true;
        self.connect_device()
    }

    /// Ask the transport to drop the link.
    ///
    /// The state changes when the transport reports `Connected = false`.
    pub fn disconnect_device(&mut self) {
        info!(address = %self.device.address, "Disconnecting");
        self.transport.disconnect(&self.device.path);
    }

    /// Decide what a fresh connection should do, consuming the pairing flag.
    pub fn take_connect_action(&mut self) -> ConnectAction {
        if std::mem::take(&mut self.pairing_requested) {
            self.state = SessionState::PairingPending;
            ConnectAction::StartPairing
        } else {
            ConnectAction::StartRetrieval
        }
    }

    /// Leave `PairingPending` once the pairing protocol has finished.
    pub fn pairing_finished(&mut self) {
        if self.state == SessionState::PairingPending {
            self.state = SessionState::Connected;
        }
    }

    /// Apply a device property change batch.
    pub fn handle_properties_changed(&mut self, changed: &PropertyMap) -> Option<SessionEvent> {
        let connected = changed.get(props::CONNECTED).and_then(PropertyValue::as_bool)?;
        self.transport_connected = connected;

        if connected {
            if self.state.is_connected() {
                return None;
            }
            info!(address = %self.device.address, "Connection established");
            self.state = SessionState::Connected;
            Some(SessionEvent::Connected)
        } else {
            if self.state == SessionState::Disconnected {
                return None;
            }
            info!(address = %self.device.address, "Disconnected");
            self.state = SessionState::Disconnected;
            Some(SessionEvent::Disconnected)
        }
    }

    /// Apply the outcome of a connect call.
    pub fn handle_connect_result(&mut self, result: &std::result::Result<(), String>) -> Option<SessionEvent> {
        match result {
            Ok(()) => {
                debug!(address = %self.device.address, "Connect call completed");
                None
            }
            Err(reason) => {
                error!(address = %self.device.address, %reason, "Connection failed");
                if self.state != SessionState::Connecting {
                    return None;
                }
                self.state = SessionState::Disconnected;
                Some(SessionEvent::ConnectFailed {
                    reason: reason.clone(),
                })
            }
        }
    }

    /// Look up a resolved characteristic.
    pub fn characteristic(&self, uuid: &Uuid) -> Result<&GattCharacteristic> {
        if !self.resolved {
            return Err(Error::NotResolved(self.device.address.clone()));
        }
        self.characteristics
            .get(uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }

    fn characteristic_mut(&mut self, uuid: &Uuid) -> Result<&mut GattCharacteristic> {
        if !self.resolved {
            return Err(Error::NotResolved(self.device.address.clone()));
        }
        self.characteristics
            .get_mut(uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }

    /// Route `Value` changes of a characteristic to `handler` and enable
    /// notifications on it.
    pub fn connect_gatt_value<F>(&mut self, uuid: &Uuid, handler: F) -> Result<()>
    where
        F: FnMut(&str, &PropertyValue) + Send + 'static,
    {
        let chrc = self.characteristic_mut(uuid)?;
        chrc.connect_property(props::VALUE, handler);
        chrc.start_notify();
        Ok(())
    }

    /// Fire-and-forget write to a characteristic.
    pub fn write_value(&self, uuid: &Uuid, data: impl Into<Bytes>) -> Result<()> {
        self.characteristic(uuid)?.write_value(data);
        Ok(())
    }

    /// Forward a property change batch to one of this device's characteristics.
    ///
    /// Returns `false` if the characteristic is not resolved.
    pub fn handle_characteristic_changed(
        &mut self,
        uuid: &Uuid,
        changed: &PropertyMap,
        invalidated: &[String],
    ) -> bool {
        match self.characteristics.get_mut(uuid) {
            Some(chrc) => {
                chrc.handle_properties_changed(changed, invalidated);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::mock::{MockTransport, TransportCall};
    use crate::object::BluetoothObject;

    fn session(transport: &Arc<MockTransport>, connected: bool) -> DeviceSession {
        let object = BluetoothObject::device("/d", "AA:BB:CC:DD:EE:FF", "Pen");
        let device = BleDevice::from_object(&object).unwrap();
        DeviceSession::new(device, connected, Arc::clone(transport) as Arc<dyn Transport>)
    }

    fn connected(value: bool) -> PropertyMap {
        let mut map = PropertyMap::new();
        map.insert(props::CONNECTED.to_string(), PropertyValue::Bool(value));
        map
    }

    #[test]
    fn test_connect_then_success() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);

        assert_eq!(s.connect_device(), None);
        assert_eq!(s.state(), SessionState::Connecting);
        assert_eq!(transport.calls(), vec![TransportCall::Connect(ObjectPath::new("/d"))]);

        assert_eq!(s.handle_connect_result(&Ok(())), None);
        assert_eq!(s.handle_properties_changed(&connected(true)), Some(SessionEvent::Connected));
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn test_connect_then_failure() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        s.connect_device();

        let event = s.handle_connect_result(&Err("le-connection-abort-by-local".into()));
        assert_eq!(
            event,
            Some(SessionEvent::ConnectFailed {
                reason: "le-connection-abort-by-local".into()
            })
        );
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_second_connect_while_connecting_is_noop() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        s.connect_device();
        s.connect_device();
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_already_connected_skips_transport() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, true);
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.connect_device(), Some(SessionEvent::Connected));
        assert_eq!(s.state(), SessionState::Connected);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_connected_event_reported_once() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, true);
        assert_eq!(s.connect_device(), Some(SessionEvent::Connected));
        assert_eq!(s.connect_device(), None);
        assert_eq!(s.request_pairing(), None);
        assert_eq!(s.handle_properties_changed(&connected(true)), None);
        assert_eq!(s.state(), SessionState::Connected);
        assert!(transport.calls().is_empty());

        let mut s = session(&transport, false);
        s.connect_device();
        assert_eq!(s.handle_properties_changed(&connected(true)), Some(SessionEvent::Connected));
        assert_eq!(s.connect_device(), None);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_disconnect_event_always_resets() {
        for pairing in [false, true] {
            let transport = MockTransport::shared();
            let mut s = session(&transport, false);
            if pairing {
                s.request_pairing();
            } else {
                s.connect_device();
            }
            s.handle_properties_changed(&connected(true));
            s.take_connect_action();

            assert_eq!(
                s.handle_properties_changed(&connected(false)),
                Some(SessionEvent::Disconnected)
            );
            assert_eq!(s.state(), SessionState::Disconnected);
        }
    }

    #[test]
    fn test_connect_action_consumes_pairing_flag() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        s.request_pairing();
        assert!(s.pairing_requested());
        s.handle_properties_changed(&connected(true));

        assert_eq!(s.take_connect_action(), ConnectAction::StartPairing);
        assert_eq!(s.state(), SessionState::PairingPending);
        assert!(!s.pairing_requested());

        s.pairing_finished();
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(s.take_connect_action(), ConnectAction::StartRetrieval);
    }

    #[test]
    fn test_unrelated_properties_ignored() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        let mut map = PropertyMap::new();
        map.insert(props::RSSI.to_string(), PropertyValue::Int(-70));
        assert_eq!(s.handle_properties_changed(&map), None);
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_gatt_access_requires_resolution() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        let uuid = Uuid::from_u128(7);
        assert!(matches!(s.write_value(&uuid, vec![1]), Err(Error::NotResolved(_))));

        s.resolve(&ObjectStore::new());
        assert!(matches!(
            s.write_value(&uuid, vec![1]),
            Err(Error::CharacteristicNotFound { .. })
        ));
    }

    #[test]
    fn test_connect_gatt_value() {
        let transport = MockTransport::shared();
        let mut s = session(&transport, false);
        let uuid = Uuid::from_u128(7);
        let dev = ObjectPath::new("/d");
        let svc = dev.child("service0001");
        let chrc = svc.child("char0002");

        let mut store = ObjectStore::new();
        store.insert(BluetoothObject::service(svc.clone(), &dev, Uuid::from_u128(1)));
        store.insert(BluetoothObject::characteristic(chrc.clone(), &svc, uuid));
        s.resolve(&store);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        s.connect_gatt_value(&uuid, move |_, value| {
            if let Some(data) = value.as_bytes() {
                sink.lock().unwrap().push(data.clone());
            }
        })
        .unwrap();
        assert_eq!(transport.calls(), vec![TransportCall::StartNotify(chrc)]);

        let mut change = PropertyMap::new();
        change.insert(
            props::VALUE.to_string(),
            PropertyValue::Bytes(Bytes::from_static(&[0xa1])),
        );
        assert!(s.handle_characteristic_changed(&uuid, &change, &[]));
        assert_eq!(*received.lock().unwrap(), vec![Bytes::from_static(&[0xa1])]);
    }
}
