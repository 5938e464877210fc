//! Per-device glue between a session, its protocol driver and the
//! drawing publisher.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::DeviceId;
use crate::protocol::{PenProtocol, ProtocolEvent};
use crate::publish::DrawingPublisher;
use crate::reconstruct::reconstruct;
use crate::session::{ConnectAction, DeviceSession, SessionEvent};

/// Drives one device through pairing or retrieval.
pub struct SessionOrchestrator {
    address: String,
    protocol: Box<dyn PenProtocol>,
    dimensions: (u32, u32),
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("address", &self.address)
            .field("working", &self.protocol.is_working())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl SessionOrchestrator {
    /// Create an orchestrator around `protocol`.
    ///
    /// `dimensions` is stamped onto every reconstructed drawing.
    pub fn new(
        address: impl Into<String>,
        protocol: Box<dyn PenProtocol>,
        dimensions: (u32, u32),
    ) -> Self {
        Self {
            address: address.into(),
            protocol,
            dimensions,
        }
    }

    /// Hardware address of the orchestrated device.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the protocol driver is busy.
    pub fn is_working(&self) -> bool {
        self.protocol.is_working()
    }

    /// Connect in order to download stored drawings.
    pub fn retrieve_data(&mut self, session: &mut DeviceSession) -> Option<SessionEvent> {
        session.connect_device()
    }

    /// Connect in order to pair.
    pub fn request_pairing(&mut self, session: &mut DeviceSession) -> Option<SessionEvent> {
        session.request_pairing()
    }

    /// Start pairing or retrieval on a fresh connection.
    ///
    /// Does nothing while the driver is still busy with an earlier sequence.
    pub fn on_connected(&mut self, session: &mut DeviceSession) -> Result<()> {
        debug!(address = %self.address, "Connected");
        if self.protocol.is_working() {
            debug!(address = %self.address, "Protocol already working, ignoring connection");
            return Ok(());
        }
        match session.take_connect_action() {
            ConnectAction::StartPairing => {
                info!(address = %self.address, "Starting pairing");
                self.protocol.start_pairing(session)
            }
            ConnectAction::StartRetrieval => {
                info!(address = %self.address, "Starting data retrieval");
                self.protocol.start_retrieval(session)
            }
        }
    }

    /// The link went down.
    pub fn on_disconnected(&mut self) {
        debug!(address = %self.address, "Disconnected");
        self.protocol.on_disconnected();
    }

    /// Handle a report from the protocol driver.
    pub fn on_protocol_event(
        &mut self,
        session: &mut DeviceSession,
        event: ProtocolEvent,
        publisher: &mut dyn DrawingPublisher,
    ) {
        match event {
            ProtocolEvent::Drawing(raw) => {
                debug!(address = %self.address, strokes = raw.strokes.len(), "Drawing downloaded");
                let drawing = reconstruct(&raw, session.name(), self.dimensions);
                let device = DeviceId::with_name(session.address(), session.name());
                publisher.publish(&device, drawing);
            }
            ProtocolEvent::Done => {
                info!(address = %self.address, "Retrieval finished");
                session.disconnect_device();
            }
            ProtocolEvent::PairingComplete => {
                info!(address = %self.address, "Pairing finished");
                session.pairing_finished();
            }
        }
    }

    /// Start a sequence, logging instead of propagating driver errors.
    pub(crate) fn on_connected_logged(&mut self, session: &mut DeviceSession) {
        if let Err(e) = self.on_connected(session) {
            warn!(address = %self.address, error = %e, "Protocol failed to start");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use penlink_types::{PointEncoding, RawDrawing, RawPoint, RawStroke};

    use super::*;
    use crate::device::BleDevice;
    use crate::mock::{MockTransport, ProtocolCall, ScriptedFactory, TransportCall};
    use crate::object::{BluetoothObject, ObjectPath};
    use crate::protocol::{ProtocolFactory, ProtocolSink, protocol_channel};
    use crate::publish::CollectingPublisher;
    use crate::session::SessionState;

    fn setup(factory: &ScriptedFactory) -> (SessionOrchestrator, DeviceSession, Arc<MockTransport>) {
        let transport = MockTransport::shared();
        let device =
            BleDevice::from_object(&BluetoothObject::device("/d", "AA", "Bamboo Spark")).unwrap();
        let session = DeviceSession::new(device, true, Arc::clone(&transport) as Arc<dyn crate::Transport>);
        let (tx, _rx) = protocol_channel();
        let protocol = factory.create("AA", ProtocolSink::new("AA", tx));
        (
            SessionOrchestrator::new("AA", protocol, (100, 50)),
            session,
            transport,
        )
    }

    #[test]
    fn test_connected_starts_retrieval() {
        let factory = ScriptedFactory::new();
        let (mut orch, mut session, _) = setup(&factory);

        orch.on_connected(&mut session).unwrap();
        assert_eq!(factory.calls(), vec![ProtocolCall::Retrieval("AA".into())]);
    }

    #[test]
    fn test_connected_starts_pairing_when_requested() {
        let factory = ScriptedFactory::new().hold();
        let (mut orch, mut session, _) = setup(&factory);

        orch.request_pairing(&mut session);
        orch.on_connected(&mut session).unwrap();
        assert_eq!(factory.calls(), vec![ProtocolCall::Pairing("AA".into())]);
        assert_eq!(session.state(), SessionState::PairingPending);
    }

    #[test]
    fn test_busy_protocol_ignores_connection() {
        let factory = ScriptedFactory::new().hold();
        let (mut orch, mut session, _) = setup(&factory);

        orch.on_connected(&mut session).unwrap();
        orch.on_connected(&mut session).unwrap();
        assert_eq!(factory.calls().len(), 1);

        orch.on_disconnected();
        orch.on_connected(&mut session).unwrap();
        let calls = factory.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], ProtocolCall::Retrieval("AA".into()));
    }

    #[test]
    fn test_drawing_reconstructed_and_published() {
        let factory = ScriptedFactory::new();
        let (mut orch, mut session, _) = setup(&factory);
        let mut publisher = CollectingPublisher::default();

        let raw = RawDrawing {
            timestamp: 42,
            strokes: vec![RawStroke::new(vec![
                RawPoint::absolute(Some(1), Some(2), Some(3)),
                RawPoint::from((PointEncoding::Relative, Some(1), None, None)),
            ])],
        };
        orch.on_protocol_event(&mut session, ProtocolEvent::Drawing(raw), &mut publisher);

        assert_eq!(publisher.drawings.len(), 1);
        let (device, drawing) = &publisher.drawings[0];
        assert_eq!(device.address, "AA");
        assert_eq!(drawing.device_name, "Bamboo Spark");
        assert_eq!(drawing.dimensions, (100, 50));
        assert_eq!(drawing.strokes[0].points[1].position, Some((2, 2)));
    }

    #[test]
    fn test_done_disconnects() {
        let factory = ScriptedFactory::new();
        let (mut orch, mut session, transport) = setup(&factory);
        let mut publisher = CollectingPublisher::default();

        orch.on_protocol_event(&mut session, ProtocolEvent::Done, &mut publisher);
        assert_eq!(
            transport.calls(),
            vec![TransportCall::Disconnect(ObjectPath::new("/d"))]
        );
    }
}
