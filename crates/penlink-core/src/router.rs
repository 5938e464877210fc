//! Per-characteristic property change dispatch.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::object::{PropertyMap, PropertyValue};

/// Callback invoked with the changed property's name and new value.
pub type PropertyHandler = Box<dyn FnMut(&str, &PropertyValue) + Send>;

/// Routes property changes to at most one handler per property name.
#[derive(Default)]
pub struct NotificationRouter {
    handlers: HashMap<String, PropertyHandler>,
}

impl fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("properties", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NotificationRouter {
    /// Create a router with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `name`, replacing any previous one.
    pub fn connect_property<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&str, &PropertyValue) + Send + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// Whether a handler is registered for `name`.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Deliver a change batch. Returns the number of handlers invoked.
    ///
    /// Names without a handler are skipped silently.
    pub fn dispatch(&mut self, changed: &PropertyMap) -> usize {
        let mut delivered = 0;
        for (name, value) in changed {
            match self.handlers.get_mut(name) {
                Some(handler) => {
                    handler(name, value);
                    delivered += 1;
                }
                None => trace!(property = %name, "No handler registered, ignoring"),
            }
        }
        delivered
    }
}
