//! Seam to the vendor pen protocol.
//!
//! The wire protocol spoken over the vendor characteristics lives outside
//! this crate. A driver implements [`PenProtocol`]: it is started on a
//! connected [`DeviceSession`], registers its own characteristic handlers,
//! and reports results asynchronously through its [`ProtocolSink`]. Those
//! reports are fed back into the agent loop as [`ProtocolEvent`]s.

use tokio::sync::mpsc;

use penlink_types::RawDrawing;

use crate::error::Result;
use crate::session::DeviceSession;

/// Results reported by a protocol driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A complete capture was downloaded.
    Drawing(RawDrawing),
    /// Retrieval finished; the link can be dropped.
    Done,
    /// The pairing exchange finished.
    PairingComplete,
}

/// Sender half used by the agent to collect driver reports.
pub type ProtocolSender = mpsc::UnboundedSender<(String, ProtocolEvent)>;

/// Receiver half consumed by the agent loop.
pub type ProtocolReceiver = mpsc::UnboundedReceiver<(String, ProtocolEvent)>;

/// Create the channel carrying driver reports.
pub fn protocol_channel() -> (ProtocolSender, ProtocolReceiver) {
    mpsc::unbounded_channel()
}

/// Report handle given to one driver, tagged with its device address.
#[derive(Debug, Clone)]
pub struct ProtocolSink {
    address: String,
    sender: ProtocolSender,
}

impl ProtocolSink {
    /// Create a sink for the device at `address`.
    pub fn new(address: impl Into<String>, sender: ProtocolSender) -> Self {
        Self {
            address: address.into(),
            sender,
        }
    }

    /// Device address this sink reports for.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Report an event. Returns `false` once the agent has shut down.
    pub fn send(&self, event: ProtocolEvent) -> bool {
        self.sender.send((self.address.clone(), event)).is_ok()
    }
}

/// A vendor protocol driver bound to one device.
pub trait PenProtocol: Send {
    /// Whether a retrieval or pairing sequence is in progress.
    fn is_working(&self) -> bool;

    /// Begin downloading stored drawings.
    fn start_retrieval(&mut self, session: &mut DeviceSession) -> Result<()>;

    /// Begin the pairing exchange.
    fn start_pairing(&mut self, session: &mut DeviceSession) -> Result<()>;

    /// The link went down; abandon any running sequence.
    fn on_disconnected(&mut self) {}
}

/// Creates one driver per device.
pub trait ProtocolFactory: Send {
    /// Create a driver reporting through `sink`.
    fn create(&self, address: &str, sink: ProtocolSink) -> Box<dyn PenProtocol>;
}

impl<F> ProtocolFactory for F
where
    F: Fn(&str, ProtocolSink) -> Box<dyn PenProtocol> + Send,
{
    fn create(&self, address: &str, sink: ProtocolSink) -> Box<dyn PenProtocol> {
        self(address, sink)
    }
}
