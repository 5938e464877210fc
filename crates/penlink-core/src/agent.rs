//! The agent: one event loop owning every device.
//!
//! All state lives in [`Agent`] and is only touched from its loop, one
//! event at a time. Transport events, protocol driver reports and external
//! commands are the three inputs; [`AgentEvent`]s are the output.
//!
//! # Example
//!
//! ```no_run
//! use penlink_core::{Agent, AgentConfig, BtleplugTransport, ScriptedFactory};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, transport_events) = BtleplugTransport::new().await?;
//!     let agent = Agent::new(AgentConfig::default(), transport.shared(), ScriptedFactory::new())?;
//!     let mut events = agent.subscribe();
//!
//!     let cancel = CancellationToken::new();
//!     transport.start(cancel.clone()).await?;
//!     let (_commands_tx, commands) = mpsc::channel(16);
//!     tokio::spawn(agent.run(transport_events, commands, cancel));
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use penlink_types::uuids::VENDOR_COMPANY_ID;

use crate::error::{Error, Result};
use crate::events::{AgentEvent, DeviceId, EventDispatcher, EventReceiver};
use crate::manager::{DeviceManager, ManagerEvent};
use crate::object::{ObjectKind, ObjectPath};
use crate::orchestrator::SessionOrchestrator;
use crate::protocol::{
    ProtocolEvent, ProtocolFactory, ProtocolReceiver, ProtocolSender, ProtocolSink,
    protocol_channel,
};
use crate::session::SessionEvent;
use crate::transport::{Transport, TransportEvent};

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Company identifier a device must advertise to be handled.
    pub vendor_id: u16,
    /// Start discovery on every adapter as soon as it appears.
    pub listen: bool,
    /// Capacity of the outward event channel.
    pub event_capacity: usize,
    /// Page dimensions stamped onto reconstructed drawings.
    pub dimensions: (u32, u32),
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_COMPANY_ID,
            listen: false,
            event_capacity: 100,
            dimensions: (0, 0),
        }
    }
}

impl AgentConfig {
    /// Set the vendor identifier.
    #[must_use]
    pub fn vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Enable or disable listen mode.
    #[must_use]
    pub fn listen(mut self, listen: bool) -> Self {
        self.listen = listen;
        self
    }

    /// Set the placeholder page dimensions.
    #[must_use]
    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = (width, height);
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Requests from outside the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Connect to a device and run the pairing protocol.
    RequestPairing(String),
    /// Connect to a device and download stored drawings.
    RetrieveData(String),
    /// Start discovery on every known adapter.
    Listen,
}

/// Owns the device manager and one orchestrator per vendor device.
pub struct Agent {
    config: AgentConfig,
    manager: DeviceManager,
    orchestrators: HashMap<String, SessionOrchestrator>,
    factory: Box<dyn ProtocolFactory>,
    transport: Arc<dyn Transport>,
    events: EventDispatcher,
    protocol_tx: ProtocolSender,
    protocol_rx: ProtocolReceiver,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("orchestrators", &self.orchestrators.len())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent.
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        factory: impl ProtocolFactory + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let (protocol_tx, protocol_rx) = protocol_channel();
        Ok(Self {
            manager: DeviceManager::new(Arc::clone(&transport)),
            orchestrators: HashMap::new(),
            factory: Box::new(factory),
            transport,
            events: EventDispatcher::new(config.event_capacity),
            config,
            protocol_tx,
            protocol_rx,
        })
    }

    /// Agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The device manager.
    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    /// The outward event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to outward events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Whether a vendor device with this address is being handled.
    pub fn is_handled(&self, address: &str) -> bool {
        self.orchestrators.contains_key(address)
    }

    /// Apply one transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        for change in self.manager.handle_event(event) {
            self.dispatch(change);
        }
    }

    /// Apply one protocol driver report.
    pub fn handle_protocol_event(&mut self, address: &str, event: ProtocolEvent) {
        let Some(orchestrator) = self.orchestrators.get_mut(address) else {
            debug!(%address, "Protocol event for unknown device");
            return;
        };
        let Ok(session) = self.manager.session_mut(address) else {
            return;
        };
        orchestrator.on_protocol_event(session, event, &mut self.events);
    }

    /// Handle every protocol report queued so far.
    pub fn drain_protocol_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((address, event)) = self.protocol_rx.try_recv() {
            self.handle_protocol_event(&address, event);
            handled += 1;
        }
        handled
    }

    /// Apply an external command.
    pub fn handle_command(&mut self, command: AgentCommand) -> Result<()> {
        match command {
            AgentCommand::Listen => {
                let adapters: Vec<ObjectPath> = self
                    .manager
                    .store()
                    .of_kind(ObjectKind::Adapter)
                    .map(|a| a.path.clone())
                    .collect();
                for adapter in adapters {
                    self.start_discovery(&adapter);
                }
                Ok(())
            }
            AgentCommand::RequestPairing(address) => {
                let orchestrator = self
                    .orchestrators
                    .get_mut(&address)
                    .ok_or_else(|| Error::UnknownDevice(address.clone()))?;
                let session = self.manager.session_mut(&address)?;
                if let Some(event) = orchestrator.request_pairing(session) {
                    self.session_event(address, event);
                }
                Ok(())
            }
            AgentCommand::RetrieveData(address) => {
                let orchestrator = self
                    .orchestrators
                    .get_mut(&address)
                    .ok_or_else(|| Error::UnknownDevice(address.clone()))?;
                let session = self.manager.session_mut(&address)?;
                if let Some(event) = orchestrator.retrieve_data(session) {
                    self.session_event(address, event);
                }
                Ok(())
            }
        }
    }

    /// Run the loop until `cancel` fires or the transport goes away.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::Receiver<AgentCommand>,
        cancel: CancellationToken,
    ) {
        let (_, idle) = protocol_channel();
        let mut protocol_events = std::mem::replace(&mut self.protocol_rx, idle);

        info!("Agent started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Agent cancelled");
                    break;
                }
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        info!("Transport closed, stopping agent");
                        break;
                    }
                },
                Some((address, event)) = protocol_events.recv() => {
                    self.handle_protocol_event(&address, event);
                }
                Some(command) = commands.recv() => {
                    if let Err(e) = self.handle_command(command) {
                        warn!(error = %e, "Command failed");
                    }
                }
            }
        }
    }

    fn start_discovery(&self, adapter: &ObjectPath) {
        info!(%adapter, "Starting discovery");
        self.transport.start_discovery(adapter);
    }

    fn dispatch(&mut self, change: ManagerEvent) {
        match change {
            ManagerEvent::AdapterAdded { path } => {
                debug!(%path, "Adapter");
                if self.config.listen {
                    self.start_discovery(&path);
                }
            }
            ManagerEvent::DeviceAdded { address } | ManagerEvent::DeviceUpdated { address } => {
                self.device_updated(address);
            }
            ManagerEvent::Session { address, event } => self.session_event(address, event),
        }
    }

    fn device_updated(&mut self, address: String) {
        let Some(session) = self.manager.session(&address) else {
            return;
        };
        if session.device().vendor_id != Some(self.config.vendor_id) {
            debug!(%address, vendor_id = ?session.device().vendor_id, "Ignoring non-vendor device");
            return;
        }
        let pairing_mode = session.device().pairing_mode(self.config.vendor_id);
        let name = session.name().to_string();

        if !self.orchestrators.contains_key(&address) {
            info!(%address, %name, pairing_mode, "New pen");
            let sink = ProtocolSink::new(address.clone(), self.protocol_tx.clone());
            let protocol = self.factory.create(&address, sink);
            self.orchestrators.insert(
                address.clone(),
                SessionOrchestrator::new(address.clone(), protocol, self.config.dimensions),
            );
            self.events.send(AgentEvent::DeviceAdded {
                device: DeviceId::with_name(address.clone(), name),
                pairing_mode,
            });
        }

        // In pairing mode the pen waits for an explicit pairing request.
        if pairing_mode {
            return;
        }
        if let Err(e) = self.handle_command(AgentCommand::RetrieveData(address)) {
            warn!(error = %e, "Failed to start retrieval");
        }
    }

    fn session_event(&mut self, address: String, event: SessionEvent) {
        let Some(orchestrator) = self.orchestrators.get_mut(&address) else {
            debug!(%address, ?event, "Session event for unhandled device");
            return;
        };
        let Ok(session) = self.manager.session_mut(&address) else {
            return;
        };
        let device = DeviceId::with_name(address.clone(), session.name());

        match event {
            SessionEvent::Connected => {
                self.events.send(AgentEvent::DeviceConnected { device });
                orchestrator.on_connected_logged(session);
            }
            SessionEvent::Disconnected => {
                orchestrator.on_disconnected();
                self.events.send(AgentEvent::DeviceDisconnected { device });
            }
            SessionEvent::ConnectFailed { reason } => {
                self.events
                    .send(AgentEvent::ConnectionFailed { device, reason });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;

    use super::*;
    use crate::mock::{MockTransport, ProtocolCall, ScriptedFactory, TransportCall};
    use crate::object::{BluetoothObject, PropertyValue, props};

    fn pen(path: &str, address: &str, data_len: usize) -> BluetoothObject {
        let mut data = BTreeMap::new();
        data.insert(VENDOR_COMPANY_ID, Bytes::from(vec![0u8; data_len]));
        BluetoothObject::device(path, address, "Bamboo Spark")
            .with_property(props::MANUFACTURER_DATA, PropertyValue::ManufacturerData(data))
    }

    fn agent(factory: ScriptedFactory) -> (Agent, Arc<MockTransport>) {
        let transport = MockTransport::shared();
        let agent = Agent::new(AgentConfig::default(), transport.clone(), factory).unwrap();
        (agent, transport)
    }

    #[test]
    fn test_config_validation() {
        let config = AgentConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(AgentConfig::default().vendor_id(1).dimensions(2, 3).validate().is_ok());
    }

    #[test]
    fn test_normal_mode_device_connects() {
        let (mut agent, transport) = agent(ScriptedFactory::new());
        let mut rx = agent.subscribe();

        agent.handle_transport_event(TransportEvent::ObjectAdded(pen("/d", "AA", 6)));

        assert!(agent.is_handled("AA"));
        assert_eq!(transport.calls(), vec![TransportCall::Connect(ObjectPath::new("/d"))]);
        assert!(matches!(
            rx.try_recv().unwrap(),
            AgentEvent::DeviceAdded { pairing_mode: false, .. }
        ));
    }

    #[test]
    fn test_pairing_mode_device_waits() {
        let (mut agent, transport) = agent(ScriptedFactory::new());
        agent.handle_transport_event(TransportEvent::ObjectAdded(pen("/d", "AA", 4)));

        assert!(agent.is_handled("AA"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_foreign_vendor_ignored() {
        let (mut agent, transport) = agent(ScriptedFactory::new());
        let mut data = BTreeMap::new();
        data.insert(0x004c, Bytes::from_static(&[1, 2]));
        let object = BluetoothObject::device("/d", "AA", "Phone")
            .with_property(props::MANUFACTURER_DATA, PropertyValue::ManufacturerData(data));

        agent.handle_transport_event(TransportEvent::ObjectAdded(object));
        assert!(!agent.is_handled("AA"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_pairing_request_flow() {
        let factory = ScriptedFactory::new();
        let (mut agent, _) = agent(factory.clone());
        agent.handle_transport_event(TransportEvent::ObjectAdded(pen("/d", "AA", 4)));

        agent
            .handle_command(AgentCommand::RequestPairing("AA".into()))
            .unwrap();
        agent.handle_transport_event(TransportEvent::property_changed(
            ObjectPath::new("/d"),
            props::CONNECTED,
            PropertyValue::Bool(true),
        ));

        assert_eq!(factory.calls(), vec![ProtocolCall::Pairing("AA".into())]);
        assert_eq!(agent.drain_protocol_events(), 1);
    }

    #[test]
    fn test_unknown_device_command() {
        let (mut agent, _) = agent(ScriptedFactory::new());
        assert!(matches!(
            agent.handle_command(AgentCommand::RetrieveData("ZZ".into())),
            Err(Error::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_listen_mode_starts_discovery() {
        let transport = MockTransport::shared();
        let mut agent = Agent::new(
            AgentConfig::default().listen(true),
            transport.clone(),
            ScriptedFactory::new(),
        )
        .unwrap();

        agent.handle_transport_event(TransportEvent::ObjectAdded(BluetoothObject::adapter(
            "/org/bluez/hci0",
        )));
        assert_eq!(
            transport.calls(),
            vec![TransportCall::StartDiscovery(ObjectPath::new("/org/bluez/hci0"))]
        );
    }
}
