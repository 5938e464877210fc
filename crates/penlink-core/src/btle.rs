//! btleplug-backed transport.
//!
//! Bridges btleplug's adapter event streams onto [`TransportEvent`]s and
//! implements [`Transport`] by spawning one task per operation. Objects are
//! given BlueZ-style paths (see [`crate::util`]):
//!
//! | btleplug | transport object |
//! |----------|------------------|
//! | adapter | `/org/bluez/hciN` |
//! | peripheral | `/org/bluez/hciN/dev_AA_BB_CC_DD_EE_FF` |
//! | service | `.../dev_.../serviceNNNN` |
//! | characteristic | `.../serviceNNNN/charNNNN` |
//!
//! Services and characteristics are announced after a connection once
//! discovery has finished, followed by `Connected = true`. Notifications
//! arrive as `Value` property changes on the characteristic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::object::{BluetoothObject, ObjectKind, ObjectPath, PropertyMap, PropertyValue, props};
use crate::transport::{Operation, Transport, TransportEvent};
use crate::util::{
    adapter_path, characteristic_path, create_identifier, device_path, service_path,
};

/// Receiver of events produced by [`BtleplugTransport`].
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// A [`Transport`] driving the platform Bluetooth stack through btleplug.
#[derive(Clone)]
pub struct BtleplugTransport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BtleplugTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugTransport")
            .field("adapters", &self.inner.adapters.len())
            .finish_non_exhaustive()
    }
}

struct Inner {
    runtime: Handle,
    events: mpsc::UnboundedSender<TransportEvent>,
    adapters: Vec<(ObjectPath, Adapter)>,
    devices: RwLock<HashMap<ObjectPath, Peripheral>>,
    ids: RwLock<HashMap<PeripheralId, ObjectPath>>,
    characteristics: RwLock<HashMap<ObjectPath, (ObjectPath, Characteristic)>>,
    notifiers: RwLock<HashMap<ObjectPath, JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Open every available adapter.
    ///
    /// Must be called from within a tokio runtime. Returns the transport
    /// and the stream of events it will produce once [`start`](Self::start)
    /// is called.
    pub async fn new() -> Result<(Self, TransportEventReceiver)> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(Error::NoAdapter);
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            runtime: Handle::current(),
            events,
            adapters: adapters
                .into_iter()
                .enumerate()
                .map(|(i, adapter)| (adapter_path(i), adapter))
                .collect(),
            devices: RwLock::new(HashMap::new()),
            ids: RwLock::new(HashMap::new()),
            characteristics: RwLock::new(HashMap::new()),
            notifiers: RwLock::new(HashMap::new()),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        ))
    }

    /// This transport as a shareable trait object.
    pub fn shared(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Announce the adapters and start pumping their events until `cancel`
    /// fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        for (path, adapter) in &self.inner.adapters {
            match adapter.adapter_info().await {
                Ok(info) => info!(%path, %info, "Adapter"),
                Err(e) => debug!(%path, error = %e, "Adapter info unavailable"),
            }
            self.inner
                .emit(TransportEvent::ObjectAdded(BluetoothObject::adapter(path.clone())));

            let events = adapter.events().await?;
            let inner = Arc::clone(&self.inner);
            let path = path.clone();
            let adapter = adapter.clone();
            let cancel = cancel.clone();
            self.inner.runtime.spawn(async move {
                let mut events = events;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(%path, "Adapter event pump cancelled");
                            break;
                        }
                        event = events.next() => match event {
                            Some(event) => {
                                if let Err(e) = inner.handle_central_event(&path, &adapter, event).await {
                                    warn!(%path, error = %e, "Failed to handle adapter event");
                                }
                            }
                            None => break,
                        },
                    }
                }
            });
        }
        Ok(())
    }
}

impl Inner {
    fn emit(&self, event: TransportEvent) {
        // Ignore error if the agent has stopped
        let _ = self.events.send(event);
    }

    fn report_failure(&self, path: ObjectPath, operation: Operation, error: &Error) {
        warn!(%path, %operation, %error, "Operation failed");
        self.emit(TransportEvent::CallFailed {
            path,
            operation,
            error: error.to_string(),
        });
    }

    async fn peripheral(&self, path: &ObjectPath) -> Option<Peripheral> {
        self.devices.read().await.get(path).cloned()
    }

    async fn path_of(&self, id: &PeripheralId) -> Option<ObjectPath> {
        self.ids.read().await.get(id).cloned()
    }

    async fn handle_central_event(
        self: &Arc<Self>,
        adapter_path: &ObjectPath,
        adapter: &Adapter,
        event: CentralEvent,
    ) -> Result<()> {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                self.device_discovered(adapter_path, adapter, id).await
            }
            CentralEvent::DeviceUpdated(id) => self.device_updated(adapter, &id).await,
            CentralEvent::DeviceConnected(id) => {
                self.spawn_device_connected(id);
                Ok(())
            }
            CentralEvent::DeviceDisconnected(id) => {
                if let Some(path) = self.path_of(&id).await {
                    if let Some(handle) = self.notifiers.write().await.remove(&path) {
                        handle.abort();
                    }
                    self.emit(TransportEvent::property_changed(
                        path,
                        props::CONNECTED,
                        PropertyValue::Bool(false),
                    ));
                }
                Ok(())
            }
            CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } => {
                if let Some(path) = self.path_of(&id).await {
                    self.emit(TransportEvent::property_changed(
                        path,
                        props::MANUFACTURER_DATA,
                        manufacturer_data_value(&manufacturer_data),
                    ));
                }
                Ok(())
            }
            CentralEvent::ServicesAdvertisement { id, services } => {
                if let Some(path) = self.path_of(&id).await {
                    self.emit(TransportEvent::property_changed(
                        path,
                        props::UUIDS,
                        PropertyValue::Strings(services.iter().map(ToString::to_string).collect()),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn device_discovered(
        self: &Arc<Self>,
        adapter_path: &ObjectPath,
        adapter: &Adapter,
        id: PeripheralId,
    ) -> Result<()> {
        let peripheral = adapter.peripheral(&id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(());
        };

        let identifier = create_identifier(&properties.address.to_string(), &id);
        let path = device_path(adapter_path, &identifier);
        let connected = peripheral.is_connected().await.unwrap_or(false);

        let mut object = BluetoothObject::new(path.clone(), ObjectKind::Device)
            .with_property(props::ADDRESS, PropertyValue::String(identifier))
            .with_property(
                props::UUIDS,
                PropertyValue::Strings(properties.services.iter().map(ToString::to_string).collect()),
            )
            // A live link is reported by `device_connected` once the GATT
            // tree has been announced.
            .with_property(props::CONNECTED, PropertyValue::Bool(false))
            .with_property(
                props::MANUFACTURER_DATA,
                manufacturer_data_value(&properties.manufacturer_data),
            );
        if let Some(name) = properties.local_name {
            object = object.with_property(props::NAME, PropertyValue::String(name));
        }
        if let Some(rssi) = properties.rssi {
            object = object.with_property(props::RSSI, PropertyValue::Int(rssi.into()));
        }

        self.ids.write().await.insert(id.clone(), path.clone());
        self.devices.write().await.insert(path, peripheral);
        self.emit(TransportEvent::ObjectAdded(object));

        if connected {
            self.spawn_device_connected(id);
        }
        Ok(())
    }

    async fn device_updated(&self, adapter: &Adapter, id: &PeripheralId) -> Result<()> {
        let Some(path) = self.path_of(id).await else {
            return Ok(());
        };
        let peripheral = adapter.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(());
        };

        let mut changed = PropertyMap::new();
        if let Some(name) = properties.local_name {
            changed.insert(props::NAME.to_string(), PropertyValue::String(name));
        }
        if let Some(rssi) = properties.rssi {
            changed.insert(props::RSSI.to_string(), PropertyValue::Int(rssi.into()));
        }
        if !changed.is_empty() {
            self.emit(TransportEvent::PropertiesChanged {
                path,
                changed,
                invalidated: Vec::new(),
            });
        }
        Ok(())
    }

    fn spawn_device_connected(self: &Arc<Self>, id: PeripheralId) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move { inner.device_connected(&id).await });
    }

    /// Announce the GATT tree of a connected peripheral, then report the
    /// link as up. If discovery fails the link is dropped again.
    async fn device_connected(&self, id: &PeripheralId) {
        let Some(path) = self.path_of(id).await else {
            return;
        };
        let Some(peripheral) = self.peripheral(&path).await else {
            return;
        };

        if let Err(e) = self.announce_services(&path, &peripheral).await {
            error!(%path, error = %e, "Service discovery failed, dropping connection");
            self.emit(discovery_failed(path.clone(), &e));
            if let Err(e) = peripheral.disconnect().await {
                self.report_failure(path, Operation::Disconnect, &e.into());
            }
            return;
        }

        self.emit(TransportEvent::property_changed(
            path,
            props::CONNECTED,
            PropertyValue::Bool(true),
        ));
    }

    async fn announce_services(&self, path: &ObjectPath, peripheral: &Peripheral) -> Result<()> {
        peripheral.discover_services().await?;

        let mut by_uuid = HashMap::new();
        for (si, service) in peripheral.services().iter().enumerate() {
            let spath = service_path(path, si);
            self.emit(TransportEvent::ObjectAdded(BluetoothObject::service(
                spath.clone(),
                path,
                service.uuid,
            )));

            for (ci, chrc) in service.characteristics.iter().enumerate() {
                let cpath = characteristic_path(&spath, ci);
                self.characteristics
                    .write()
                    .await
                    .insert(cpath.clone(), (path.clone(), chrc.clone()));
                by_uuid.entry(chrc.uuid).or_insert_with(|| cpath.clone());
                self.emit(TransportEvent::ObjectAdded(BluetoothObject::characteristic(
                    cpath, &spath, chrc.uuid,
                )));
            }
        }
        debug!(%path, characteristics = by_uuid.len(), "Services discovered");

        let mut notifications = peripheral.notifications().await?;
        let events = self.events.clone();
        let handle = self.runtime.spawn(async move {
            while let Some(notification) = notifications.next().await {
                if let Some(cpath) = by_uuid.get(&notification.uuid) {
                    let _ = events.send(TransportEvent::property_changed(
                        cpath.clone(),
                        props::VALUE,
                        PropertyValue::Bytes(Bytes::from(notification.value)),
                    ));
                }
            }
        });
        if let Some(previous) = self.notifiers.write().await.insert(path.clone(), handle) {
            previous.abort();
        }
        Ok(())
    }
}

/// A connection whose GATT tree could not be read counts as a failed connect.
fn discovery_failed(path: ObjectPath, error: &Error) -> TransportEvent {
    TransportEvent::ConnectCompleted {
        path,
        result: Err(format!("service discovery failed: {error}")),
    }
}

fn manufacturer_data_value(data: &HashMap<u16, Vec<u8>>) -> PropertyValue {
    let map: BTreeMap<u16, Bytes> = data
        .iter()
        .map(|(id, bytes)| (*id, Bytes::copy_from_slice(bytes)))
        .collect();
    PropertyValue::ManufacturerData(map)
}

impl Transport for BtleplugTransport {
    fn connect(&self, device: &ObjectPath) {
        let inner = Arc::clone(&self.inner);
        let path = device.clone();
        self.inner.runtime.spawn(async move {
            let result = match inner.peripheral(&path).await {
                Some(peripheral) => peripheral.connect().await.map_err(|e| {
                    Error::ConnectionFailed {
                        device: path.clone(),
                        reason: e.to_string(),
                    }
                    .to_string()
                }),
                None => Err(Error::UnknownDevice(path.to_string()).to_string()),
            };
            inner.emit(TransportEvent::ConnectCompleted { path, result });
        });
    }

    fn disconnect(&self, device: &ObjectPath) {
        let inner = Arc::clone(&self.inner);
        let path = device.clone();
        self.inner.runtime.spawn(async move {
            let Some(peripheral) = inner.peripheral(&path).await else {
                return;
            };
            if let Err(e) = peripheral.disconnect().await {
                inner.report_failure(path, Operation::Disconnect, &e.into());
            }
        });
    }

    fn write_value(&self, characteristic: &ObjectPath, data: Bytes) {
        let inner = Arc::clone(&self.inner);
        let path = characteristic.clone();
        self.inner.runtime.spawn(async move {
            let Some((device, chrc)) = inner.characteristics.read().await.get(&path).cloned() else {
                inner.report_failure(path.clone(), Operation::Write, &Error::characteristic_not_found(&path));
                return;
            };
            let Some(peripheral) = inner.peripheral(&device).await else {
                return;
            };
            if let Err(e) = peripheral.write(&chrc, &data, WriteType::WithResponse).await {
                let error = Error::WriteFailed {
                    uuid: chrc.uuid.to_string(),
                    reason: e.to_string(),
                };
                inner.report_failure(path, Operation::Write, &error);
            }
        });
    }

    fn start_notify(&self, characteristic: &ObjectPath) {
        let inner = Arc::clone(&self.inner);
        let path = characteristic.clone();
        self.inner.runtime.spawn(async move {
            let Some((device, chrc)) = inner.characteristics.read().await.get(&path).cloned() else {
                inner.report_failure(
                    path.clone(),
                    Operation::StartNotify,
                    &Error::characteristic_not_found(&path),
                );
                return;
            };
            let Some(peripheral) = inner.peripheral(&device).await else {
                return;
            };
            match peripheral.subscribe(&chrc).await {
                Ok(()) => inner.emit(TransportEvent::property_changed(
                    path,
                    props::NOTIFYING,
                    PropertyValue::Bool(true),
                )),
                Err(e) => inner.report_failure(path, Operation::StartNotify, &e.into()),
            }
        });
    }

    fn start_discovery(&self, adapter: &ObjectPath) {
        let inner = Arc::clone(&self.inner);
        let path = adapter.clone();
        self.inner.runtime.spawn(async move {
            let Some((_, adapter)) = inner.adapters.iter().find(|(p, _)| *p == path) else {
                return;
            };
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                inner.report_failure(path, Operation::StartDiscovery, &e.into());
            }
        });
    }
}
