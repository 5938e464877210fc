//! Topology resolution.
//!
//! Transport objects arrive flat and in no particular order: a
//! characteristic may be announced before its service, a service before
//! its device. [`resolve`] rebuilds the Device → Service → Characteristic
//! relation for one device from whatever is currently known, and is safe
//! to re-run as more objects arrive:
//!
//! - services are matched by their `Device` property,
//! - characteristics by their `Service` property,
//! - characteristics are keyed by UUID and an existing entry is never
//!   replaced, so repeated passes only add what was missing.
//!
//! Objects whose parent is not known yet are simply left for a later pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::characteristic::GattCharacteristic;
use crate::object::{ObjectKind, ObjectPath, ObjectStore, props};
use crate::transport::Transport;

/// Characteristics of one device, keyed by UUID.
pub type CharacteristicMap = HashMap<Uuid, GattCharacteristic>;

/// Characteristics added by a single resolution pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Services currently owned by the device.
    pub services: Vec<ObjectPath>,
    /// Newly added characteristics as `(uuid, path)`.
    pub added: Vec<(Uuid, ObjectPath)>,
}

impl Resolution {
    /// Whether this pass added anything.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}

/// Resolve the services and characteristics of `device` into `characteristics`.
pub fn resolve(
    store: &ObjectStore,
    device: &ObjectPath,
    characteristics: &mut CharacteristicMap,
    transport: &Arc<dyn Transport>,
) -> Resolution {
    let services: Vec<ObjectPath> = store
        .of_kind(ObjectKind::Service)
        .filter(|s| s.path_property(props::DEVICE) == Some(device))
        .map(|s| s.path.clone())
        .collect();

    let owned: HashSet<&ObjectPath> = services.iter().collect();
    let mut added = Vec::new();

    for object in store.of_kind(ObjectKind::Characteristic) {
        let Some(service) = object.path_property(props::SERVICE) else {
            continue;
        };
        if !owned.contains(service) {
            continue;
        }

        let Some(uuid) = object.uuid(props::UUID) else {
            warn!(path = %object.path, "Characteristic without UUID, skipping");
            continue;
        };
        if characteristics.contains_key(&uuid) {
            continue;
        }

        match GattCharacteristic::from_object(object, device, Arc::clone(transport)) {
            Ok(chrc) => {
                debug!(device = %device, %uuid, path = %object.path, "Resolved characteristic");
                characteristics.insert(uuid, chrc);
                added.push((uuid, object.path.clone()));
            }
            Err(e) => warn!(path = %object.path, error = %e, "Skipping characteristic"),
        }
    }

    Resolution { services, added }
}
