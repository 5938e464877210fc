//! Device deduplication and incremental topology maintenance.
//!
//! The [`DeviceManager`] owns the flat object set and one
//! [`DeviceSession`] per hardware address. It consumes transport events in
//! delivery order and reports what changed as [`ManagerEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::BleDevice;
use crate::error::{Error, Result};
use crate::object::{ObjectKind, ObjectPath, ObjectStore, PropertyMap, PropertyValue, props};
use crate::session::{DeviceSession, SessionEvent};
use crate::transport::{Transport, TransportEvent};

/// Changes reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A local adapter appeared.
    AdapterAdded {
        /// Adapter object path.
        path: ObjectPath,
    },
    /// A session was created for a new hardware address.
    DeviceAdded {
        /// Hardware address.
        address: String,
    },
    /// A known device advertised new manufacturer data.
    DeviceUpdated {
        /// Hardware address.
        address: String,
    },
    /// A session changed connectivity.
    Session {
        /// Hardware address.
        address: String,
        /// What happened.
        event: SessionEvent,
    },
}

/// Sessions for every known device, keyed by hardware address.
pub struct DeviceManager {
    store: ObjectStore,
    sessions: HashMap<String, DeviceSession>,
    device_paths: HashMap<ObjectPath, String>,
    characteristic_paths: HashMap<ObjectPath, (String, Uuid)>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("objects", &self.store.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl DeviceManager {
    /// Create a manager issuing operations through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            store: ObjectStore::new(),
            sessions: HashMap::new(),
            device_paths: HashMap::new(),
            characteristic_paths: HashMap::new(),
            transport,
        }
    }

    /// The flat object set.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Session for a hardware address.
    pub fn session(&self, address: &str) -> Option<&DeviceSession> {
        self.sessions.get(address)
    }

    /// Mutable session for a hardware address.
    pub fn session_mut(&mut self, address: &str) -> Result<&mut DeviceSession> {
        self.sessions
            .get_mut(address)
            .ok_or_else(|| Error::UnknownDevice(address.to_string()))
    }

    /// Iterate over all sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &DeviceSession> {
        self.sessions.values()
    }

    /// Number of known devices.
    pub fn device_count(&self) -> usize {
        self.sessions.len()
    }

    /// Return the address of the session for the device object at `path`,
    /// creating the session if the address is new.
    ///
    /// The boolean is `true` when a session was created. Fails if the
    /// object is unknown or lacks its identifying attributes.
    pub fn get_or_create(&mut self, path: &ObjectPath) -> Result<(String, bool)> {
        let object = self
            .store
            .get(path)
            .ok_or_else(|| Error::UnknownDevice(path.to_string()))?;
        let device = BleDevice::from_object(object)?;
        let connected = object.bool(props::CONNECTED).unwrap_or(false);
        let address = device.address.clone();

        self.device_paths.insert(path.clone(), address.clone());
        if self.sessions.contains_key(&address) {
            return Ok((address, false));
        }

        debug!(%path, %address, name = %device.name, "Device");
        let mut session = DeviceSession::new(device, connected, Arc::clone(&self.transport));
        let resolution = session.resolve(&self.store);
        for (uuid, chrc_path) in resolution.added {
            self.characteristic_paths
                .insert(chrc_path, (address.clone(), uuid));
        }
        self.sessions.insert(address.clone(), session);
        Ok((address, true))
    }

    /// Re-run resolution for every known device.
    pub fn resolve_all(&mut self) {
        for (address, session) in &mut self.sessions {
            let resolution = session.resolve(&self.store);
            for (uuid, path) in resolution.added {
                self.characteristic_paths
                    .insert(path, (address.clone(), uuid));
            }
        }
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<ManagerEvent> {
        match event {
            TransportEvent::ObjectAdded(object) => {
                debug!(path = %object.path, kind = ?object.kind, "Object added");
                let path = object.path.clone();
                let kind = object.kind;
                self.store.insert(object);
                match kind {
                    ObjectKind::Adapter => vec![ManagerEvent::AdapterAdded { path }],
                    ObjectKind::Device => self.add_device(&path),
                    ObjectKind::Service | ObjectKind::Characteristic => {
                        self.resolve_all();
                        Vec::new()
                    }
                }
            }
            TransportEvent::ObjectRemoved(path) => {
                debug!(%path, "Object removed");
                self.store.remove(&path);
                Vec::new()
            }
            TransportEvent::PropertiesChanged {
                path,
                changed,
                invalidated,
            } => self.properties_changed(&path, &changed, &invalidated),
            TransportEvent::ConnectCompleted { path, result } => {
                let Some(address) = self.device_paths.get(&path).cloned() else {
                    debug!(%path, "Connect result for unknown device");
                    return Vec::new();
                };
                self.sessions
                    .get_mut(&address)
                    .and_then(|s| s.handle_connect_result(&result))
                    .map(|event| ManagerEvent::Session { address, event })
                    .into_iter()
                    .collect()
            }
            TransportEvent::CallFailed {
                path,
                operation,
                error,
            } => {
                warn!(%path, %operation, %error, "Transport call failed");
                Vec::new()
            }
        }
    }

    fn add_device(&mut self, path: &ObjectPath) -> Vec<ManagerEvent> {
        match self.get_or_create(path) {
            Ok((address, true)) => {
                info!(%address, "Device added");
                vec![ManagerEvent::DeviceAdded { address }]
            }
            Ok((address, false)) => {
                debug!(%address, %path, "Device already known");
                Vec::new()
            }
            Err(e) => {
                warn!(%path, error = %e, "Ignoring device");
                Vec::new()
            }
        }
    }

    fn properties_changed(
        &mut self,
        path: &ObjectPath,
        changed: &PropertyMap,
        invalidated: &[String],
    ) -> Vec<ManagerEvent> {
        if !self.store.update_properties(path, changed, invalidated) {
            debug!(%path, "Properties changed on unknown object");
            return Vec::new();
        }

        if let Some((address, uuid)) = self.characteristic_paths.get(path) {
            if let Some(session) = self.sessions.get_mut(address) {
                session.handle_characteristic_changed(uuid, changed, invalidated);
            }
            return Vec::new();
        }

        let Some(address) = self.device_paths.get(path).cloned() else {
            // A device object may only become complete after a property update.
            if self
                .store
                .get(path)
                .is_some_and(|o| o.kind == ObjectKind::Device)
            {
                return self.add_device(path);
            }
            return Vec::new();
        };
        let Some(session) = self.sessions.get_mut(&address) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if let Some(data) = changed
            .get(props::MANUFACTURER_DATA)
            .and_then(PropertyValue::as_manufacturer_data)
        {
            session.device_mut().set_manufacturer_data(data.clone());
            events.push(ManagerEvent::DeviceUpdated {
                address: address.clone(),
            });
        }
        if let Some(event) = session.handle_properties_changed(changed) {
            events.push(ManagerEvent::Session { address, event });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;

    use super::*;
    use crate::mock::MockTransport;
    use crate::object::BluetoothObject;
    use crate::session::SessionState;

    fn manager() -> (DeviceManager, Arc<MockTransport>) {
        let transport = MockTransport::shared();
        (DeviceManager::new(Arc::clone(&transport) as Arc<dyn Transport>), transport)
    }

    fn added(object: BluetoothObject) -> TransportEvent {
        TransportEvent::ObjectAdded(object)
    }

    #[test]
    fn test_device_added_once_per_address() {
        let (mut mgr, _) = manager();
        let first = mgr.handle_event(added(BluetoothObject::device("/hci0/dev_AA", "AA", "Pen")));
        let second = mgr.handle_event(added(BluetoothObject::device("/hci1/dev_AA", "AA", "Pen")));

        assert_eq!(first, vec![ManagerEvent::DeviceAdded { address: "AA".into() }]);
        assert!(second.is_empty());
        assert_eq!(mgr.device_count(), 1);
    }

    #[test]
    fn test_adapter_reported() {
        let (mut mgr, _) = manager();
        let events = mgr.handle_event(added(BluetoothObject::adapter("/org/bluez/hci0")));
        assert_eq!(
            events,
            vec![ManagerEvent::AdapterAdded {
                path: ObjectPath::new("/org/bluez/hci0")
            }]
        );
    }

    #[test]
    fn test_incomplete_device_skipped_until_complete() {
        let (mut mgr, _) = manager();
        let mut object = BluetoothObject::device("/d", "AA", "Pen");
        object.properties.remove(props::NAME);

        assert!(mgr.handle_event(added(object)).is_empty());
        assert_eq!(mgr.device_count(), 0);

        let events = mgr.handle_event(TransportEvent::property_changed(
            ObjectPath::new("/d"),
            props::NAME,
            PropertyValue::String("Pen".into()),
        ));
        assert_eq!(events, vec![ManagerEvent::DeviceAdded { address: "AA".into() }]);
    }

    #[test]
    fn test_already_connected_device() {
        let (mut mgr, _) = manager();
        let object = BluetoothObject::device("/d", "AA", "Pen")
            .with_property(props::CONNECTED, PropertyValue::Bool(true));
        let events = mgr.handle_event(added(object));
        assert_eq!(events, vec![ManagerEvent::DeviceAdded { address: "AA".into() }]);

        // The connected event comes from the first connect request only.
        let session = mgr.session_mut("AA").unwrap();
        assert_eq!(session.connect_device(), Some(SessionEvent::Connected));
        assert_eq!(session.connect_device(), None);
    }

    #[test]
    fn test_late_characteristic_resolves_all_devices() {
        let (mut mgr, _) = manager();
        let dev_a = ObjectPath::new("/a");
        let dev_b = ObjectPath::new("/b");
        mgr.handle_event(added(BluetoothObject::device(dev_a.clone(), "AA", "A")));
        mgr.handle_event(added(BluetoothObject::device(dev_b.clone(), "BB", "B")));

        let svc_a = dev_a.child("s");
        let svc_b = dev_b.child("s");
        mgr.handle_event(added(BluetoothObject::characteristic(
            svc_a.child("c"),
            &svc_a,
            Uuid::from_u128(1),
        )));
        mgr.handle_event(added(BluetoothObject::characteristic(
            svc_b.child("c"),
            &svc_b,
            Uuid::from_u128(2),
        )));
        assert!(mgr.session("AA").unwrap().characteristics().is_empty());

        mgr.handle_event(added(BluetoothObject::service(svc_a.clone(), &dev_a, Uuid::nil())));
        mgr.handle_event(added(BluetoothObject::service(svc_b.clone(), &dev_b, Uuid::nil())));

        assert_eq!(mgr.session("AA").unwrap().characteristics().len(), 1);
        assert_eq!(mgr.session("BB").unwrap().characteristics().len(), 1);
    }

    #[test]
    fn test_connection_lifecycle_events() {
        let (mut mgr, _) = manager();
        let dev = ObjectPath::new("/d");
        mgr.handle_event(added(BluetoothObject::device(dev.clone(), "AA", "Pen")));
        mgr.session_mut("AA").unwrap().connect_device();

        let up = mgr.handle_event(TransportEvent::property_changed(
            dev.clone(),
            props::CONNECTED,
            PropertyValue::Bool(true),
        ));
        assert_eq!(
            up,
            vec![ManagerEvent::Session {
                address: "AA".into(),
                event: SessionEvent::Connected
            }]
        );

        let down = mgr.handle_event(TransportEvent::property_changed(
            dev,
            props::CONNECTED,
            PropertyValue::Bool(false),
        ));
        assert_eq!(
            down,
            vec![ManagerEvent::Session {
                address: "AA".into(),
                event: SessionEvent::Disconnected
            }]
        );
        assert_eq!(mgr.session("AA").unwrap().state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_reported() {
        let (mut mgr, _) = manager();
        let dev = ObjectPath::new("/d");
        mgr.handle_event(added(BluetoothObject::device(dev.clone(), "AA", "Pen")));
        mgr.session_mut("AA").unwrap().connect_device();

        let events = mgr.handle_event(TransportEvent::ConnectCompleted {
            path: dev,
            result: Err("timeout".into()),
        });
        assert_eq!(
            events,
            vec![ManagerEvent::Session {
                address: "AA".into(),
                event: SessionEvent::ConnectFailed {
                    reason: "timeout".into()
                }
            }]
        );
    }

    #[test]
    fn test_manufacturer_data_update() {
        let (mut mgr, _) = manager();
        let dev = ObjectPath::new("/d");
        mgr.handle_event(added(BluetoothObject::device(dev.clone(), "AA", "Pen")));

        let mut data = BTreeMap::new();
        data.insert(0x4755, Bytes::from_static(&[1, 2, 3, 4]));
        let events = mgr.handle_event(TransportEvent::property_changed(
            dev,
            props::MANUFACTURER_DATA,
            PropertyValue::ManufacturerData(data),
        ));

        assert_eq!(events, vec![ManagerEvent::DeviceUpdated { address: "AA".into() }]);
        let device = mgr.session("AA").unwrap().device();
        assert_eq!(device.vendor_id, Some(0x4755));
        assert!(device.pairing_mode(0x4755));
    }

    #[test]
    fn test_object_removed_keeps_session() {
        let (mut mgr, _) = manager();
        let dev = ObjectPath::new("/d");
        mgr.handle_event(added(BluetoothObject::device(dev.clone(), "AA", "Pen")));
        mgr.handle_event(TransportEvent::ObjectRemoved(dev.clone()));

        assert!(mgr.store().get(&dev).is_none());
        assert!(mgr.session("AA").is_some());
    }

    #[test]
    fn test_unknown_session_lookup() {
        let (mut mgr, _) = manager();
        assert!(matches!(mgr.session_mut("ZZ"), Err(Error::UnknownDevice(_))));
    }
}
