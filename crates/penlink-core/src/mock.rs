//! Test doubles for the transport and the protocol driver.
//!
//! [`MockTransport`] records every operation instead of talking to a radio;
//! tests feed the corresponding [`TransportEvent`](crate::TransportEvent)s
//! by hand. [`ScriptedFactory`] creates drivers that replay a fixed set of
//! drawings when retrieval starts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use penlink_types::RawDrawing;

use crate::error::Result;
use crate::object::ObjectPath;
use crate::protocol::{PenProtocol, ProtocolEvent, ProtocolFactory, ProtocolSink};
use crate::session::DeviceSession;
use crate::transport::Transport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An operation issued against the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `connect`
    Connect(ObjectPath),
    /// `disconnect`
    Disconnect(ObjectPath),
    /// `write_value`
    Write(ObjectPath, Bytes),
    /// `start_notify`
    StartNotify(ObjectPath),
    /// `start_discovery`
    StartDiscovery(ObjectPath),
}

/// A transport that only records calls.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shareable mock transport.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// All calls so far, in issue order.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: TransportCall) {
        lock(&self.calls).push(call);
    }
}

impl Transport for MockTransport {
    fn connect(&self, device: &ObjectPath) {
        self.record(TransportCall::Connect(device.clone()));
    }

    fn disconnect(&self, device: &ObjectPath) {
        self.record(TransportCall::Disconnect(device.clone()));
    }

    fn write_value(&self, characteristic: &ObjectPath, data: Bytes) {
        self.record(TransportCall::Write(characteristic.clone(), data));
    }

    fn start_notify(&self, characteristic: &ObjectPath) {
        self.record(TransportCall::StartNotify(characteristic.clone()));
    }

    fn start_discovery(&self, adapter: &ObjectPath) {
        self.record(TransportCall::StartDiscovery(adapter.clone()));
    }
}

/// A sequence started on a scripted driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolCall {
    /// Retrieval started for the address.
    Retrieval(String),
    /// Pairing started for the address.
    Pairing(String),
}

/// Creates [`ScriptedProtocol`] drivers sharing one call log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    drawings: Vec<RawDrawing>,
    hold: bool,
    calls: Arc<Mutex<Vec<ProtocolCall>>>,
}

impl ScriptedFactory {
    /// Drivers that finish immediately without drawings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drawings every driver reports on retrieval.
    #[must_use]
    pub fn with_drawings(mut self, drawings: Vec<RawDrawing>) -> Self {
        self.drawings = drawings;
        self
    }

    /// Keep drivers busy until disconnect instead of finishing.
    #[must_use]
    pub fn hold(mut self) -> Self {
        self.hold = true;
        self
    }

    /// Sequences started so far across all drivers.
    pub fn calls(&self) -> Vec<ProtocolCall> {
        lock(&self.calls).clone()
    }
}

impl ProtocolFactory for ScriptedFactory {
    fn create(&self, address: &str, sink: ProtocolSink) -> Box<dyn PenProtocol> {
        Box::new(ScriptedProtocol {
            address: address.to_string(),
            sink,
            drawings: self.drawings.clone(),
            hold: self.hold,
            working: false,
            calls: Arc::clone(&self.calls),
        })
    }
}

/// Driver that replays scripted results.
#[derive(Debug)]
pub struct ScriptedProtocol {
    address: String,
    sink: ProtocolSink,
    drawings: Vec<RawDrawing>,
    hold: bool,
    working: bool,
    calls: Arc<Mutex<Vec<ProtocolCall>>>,
}

impl PenProtocol for ScriptedProtocol {
    fn is_working(&self) -> bool {
        self.working
    }

    fn start_retrieval(&mut self, _session: &mut DeviceSession) -> Result<()> {
        lock(&self.calls).push(ProtocolCall::Retrieval(self.address.clone()));
        self.working = true;
        if !self.hold {
            for drawing in &self.drawings {
                self.sink.send(ProtocolEvent::Drawing(drawing.clone()));
            }
            self.sink.send(ProtocolEvent::Done);
            self.working = false;
        }
        Ok(())
    }

    fn start_pairing(&mut self, _session: &mut DeviceSession) -> Result<()> {
        lock(&self.calls).push(ProtocolCall::Pairing(self.address.clone()));
        self.working = true;
        if !self.hold {
            self.sink.send(ProtocolEvent::PairingComplete);
            self.working = false;
        }
        Ok(())
    }

    fn on_disconnected(&mut self) {
        self.working = false;
    }
}
