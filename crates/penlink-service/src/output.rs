//! Printing drawings and agent events.
//!
//! Every downloaded drawing is written to stdout as one JSON document.
//! Other events only go to the log.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use penlink_core::{AgentEvent, EventReceiver};
use penlink_types::Drawing;

/// How drawings are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One compact JSON document per line.
    #[default]
    Json,
    /// Indented JSON.
    Pretty,
}

impl OutputFormat {
    /// Render a drawing in this format.
    pub fn render(self, drawing: &Drawing) -> serde_json::Result<String> {
        match self {
            Self::Json => serde_json::to_string(drawing),
            Self::Pretty => serde_json::to_string_pretty(drawing),
        }
    }
}

/// Write one event to `out`. Returns whether anything was written.
pub fn write_event<W: Write>(
    out: &mut W,
    format: OutputFormat,
    event: &AgentEvent,
) -> anyhow::Result<bool> {
    match event {
        AgentEvent::DrawingReceived { device, drawing } => {
            info!(
                address = %device.address,
                strokes = drawing.strokes.len(),
                "Drawing received"
            );
            writeln!(out, "{}", format.render(drawing)?)?;
            out.flush()?;
            return Ok(true);
        }
        AgentEvent::DeviceAdded {
            device,
            pairing_mode,
        } => {
            if *pairing_mode {
                info!(address = %device.address, name = ?device.name, "Pen in pairing mode");
            } else {
                info!(address = %device.address, name = ?device.name, "Pen found");
            }
        }
        AgentEvent::DeviceConnected { device } => {
            info!(address = %device.address, "Pen connected");
        }
        AgentEvent::DeviceDisconnected { device } => {
            info!(address = %device.address, "Pen disconnected");
        }
        AgentEvent::ConnectionFailed { device, reason } => {
            warn!(address = %device.address, %reason, "Connection failed");
        }
        other => {
            info!(event = ?other, "Agent event");
        }
    }
    Ok(false)
}

/// Consume agent events until the channel closes.
pub async fn print_events(mut events: EventReceiver, format: OutputFormat) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = write_event(&mut stdout, format, &event) {
                    warn!(error = %e, "Failed to print event");
                }
            }
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "Output fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use penlink_core::{DeviceId, EventDispatcher};
    use penlink_types::{Point, Stroke};

    use super::*;

    fn drawing() -> Drawing {
        let mut drawing = Drawing::new("Bamboo Spark", (0, 0), 1234);
        drawing.strokes.push(Stroke {
            points: vec![Point {
                position: Some((1, 2)),
                ..Default::default()
            }],
        });
        drawing
    }

    #[test]
    fn test_format_deserialize() {
        let format: OutputFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(format, OutputFormat::Pretty);
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }

    #[test]
    fn test_render_json_single_line() {
        let text = OutputFormat::Json.render(&drawing()).unwrap();
        assert!(!text.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["devicename"], "Bamboo Spark");

        let pretty = OutputFormat::Pretty.render(&drawing()).unwrap();
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn test_write_event_only_prints_drawings() {
        let mut out = Vec::new();
        let connected = AgentEvent::DeviceConnected {
            device: DeviceId::new("AA"),
        };
        assert!(!write_event(&mut out, OutputFormat::Json, &connected).unwrap());
        assert!(out.is_empty());

        let received = AgentEvent::DrawingReceived {
            device: DeviceId::new("AA"),
            drawing: drawing(),
        };
        assert!(write_event(&mut out, OutputFormat::Json, &received).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_print_events_stops_when_closed() {
        let dispatcher = EventDispatcher::new(4);
        let rx = dispatcher.subscribe();
        dispatcher.send(AgentEvent::DeviceDisconnected {
            device: DeviceId::new("AA"),
        });
        drop(dispatcher);

        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            print_events(rx, OutputFormat::Json),
        )
        .await
        .unwrap();
    }
}
