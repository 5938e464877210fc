//! Topology resolution and device-session engine for BLE smartpens.
//!
//! This crate turns the flat, asynchronously arriving set of Bluetooth
//! objects reported by the platform stack into per-device sessions, drives
//! each session through pairing or data retrieval, and reconstructs the
//! downloaded pen strokes into [`Drawing`](penlink_types::Drawing) records.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`object`] | Flat transport object model and object store |
//! | [`router`] | Per-characteristic property change dispatch |
//! | [`characteristic`] | One GATT characteristic endpoint |
//! | [`topology`] | Incremental Device → Service → Characteristic resolution |
//! | [`session`] | Per-device connection and pairing state machine |
//! | [`manager`] | Deduplication by hardware address, re-resolution |
//! | [`reconstruct`] | Delta decoding of raw strokes |
//! | [`orchestrator`] | Pairing/retrieval decisions and drawing hand-off |
//! | [`agent`] | The event loop tying everything together |
//! | [`btle`] | btleplug-backed [`Transport`] |
//!
//! # Concurrency
//!
//! All engine state is owned by one [`Agent`] and mutated from a single
//! loop, one event at a time. Transport operations never block: they
//! return immediately and their outcome arrives later as a
//! [`TransportEvent`].
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use penlink_core::{Agent, AgentConfig, BluetoothObject, MockTransport, ScriptedFactory, TransportEvent};
//!
//! let transport = MockTransport::shared();
//! let mut agent = Agent::new(AgentConfig::default(), transport.clone(), ScriptedFactory::new())?;
//! let mut events = agent.subscribe();
//!
//! agent.handle_transport_event(TransportEvent::ObjectAdded(
//!     BluetoothObject::adapter("/org/bluez/hci0"),
//! ));
//! assert_eq!(agent.manager().device_count(), 0);
//! assert!(events.try_recv().is_err());
//! # Ok::<(), penlink_core::Error>(())
//! ```

pub mod agent;
pub mod btle;
pub mod characteristic;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod mock;
pub mod object;
pub mod orchestrator;
pub mod protocol;
pub mod publish;
pub mod reconstruct;
pub mod router;
pub mod session;
pub mod topology;
pub mod transport;
pub mod util;

// Re-export types and uuid modules from penlink-types
pub use penlink_types::types;
pub use penlink_types::uuid;

pub use agent::{Agent, AgentCommand, AgentConfig};
pub use btle::{BtleplugTransport, TransportEventReceiver};
pub use characteristic::GattCharacteristic;
pub use device::BleDevice;
pub use error::{Error, Result};
pub use events::{AgentEvent, DeviceId, EventDispatcher, EventReceiver, EventSender};
pub use manager::{DeviceManager, ManagerEvent};
pub use mock::{MockTransport, ProtocolCall, ScriptedFactory, ScriptedProtocol, TransportCall};
pub use object::{BluetoothObject, ObjectKind, ObjectPath, ObjectStore, PropertyMap, PropertyValue};
pub use orchestrator::SessionOrchestrator;
pub use protocol::{PenProtocol, ProtocolEvent, ProtocolFactory, ProtocolSink};
pub use publish::{CollectingPublisher, DrawingPublisher};
pub use reconstruct::{reconstruct, reconstruct_stroke};
pub use router::{NotificationRouter, PropertyHandler};
pub use session::{ConnectAction, DeviceSession, SessionEvent, SessionState};
pub use topology::{CharacteristicMap, Resolution, resolve};
pub use transport::{Operation, Transport, TransportEvent};
