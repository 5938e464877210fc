//! Hand-off of completed drawings to external consumers.

use tracing::info;

use penlink_types::Drawing;

use crate::events::{AgentEvent, DeviceId, EventDispatcher};

/// Accepts completed drawings.
pub trait DrawingPublisher: Send {
    /// Publish a drawing captured by `device`.
    fn publish(&mut self, device: &DeviceId, drawing: Drawing);
}

impl DrawingPublisher for EventDispatcher {
    fn publish(&mut self, device: &DeviceId, drawing: Drawing) {
        info!(
            address = %device.address,
            strokes = drawing.strokes.len(),
            points = drawing.point_count(),
            "Drawing received"
        );
        self.send(AgentEvent::DrawingReceived {
            device: device.clone(),
            drawing,
        });
    }
}

/// Publisher that keeps every drawing in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingPublisher {
    /// Published drawings in arrival order.
    pub drawings: Vec<(DeviceId, Drawing)>,
}

impl DrawingPublisher for CollectingPublisher {
    fn publish(&mut self, device: &DeviceId, drawing: Drawing) {
        self.drawings.push((device.clone(), drawing));
    }
}
