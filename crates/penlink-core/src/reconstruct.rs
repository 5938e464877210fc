//! Delta decoding of raw pen strokes into absolute drawings.
//!
//! Each channel (x, y, pressure) keeps its own running value, which starts
//! unknown at the beginning of every stroke:
//!
//! - an `Absolute` value replaces the running value,
//! - a `Relative` value is added to it,
//! - an absent value leaves it untouched.
//!
//! The decoded channel is the running value after the update, so a point
//! that omits a channel repeats the last known value for it. A relative
//! offset arriving before any absolute value has nothing to apply to and
//! is dropped.

use tracing::trace;

use penlink_types::{Drawing, Point, PointEncoding, RawDrawing, RawPoint, RawStroke, Stroke};

/// Running value of one coordinate channel.
#[derive(Debug, Clone, Copy, Default)]
struct Channel(Option<i32>);

impl Channel {
    fn apply(&mut self, encoding: PointEncoding, raw: Option<i32>) -> Option<i32> {
        if let Some(value) = raw {
            self.0 = match encoding {
                PointEncoding::Absolute => Some(value),
                PointEncoding::Relative => match self.0 {
                    Some(last) => Some(last.saturating_add(value)),
                    None => {
                        trace!(offset = value, "Relative offset without base, dropping");
                        None
                    }
                },
            };
        }
        self.0
    }
}

/// Per-stroke decoder state.
#[derive(Debug, Default)]
struct StrokeDecoder {
    x: Channel,
    y: Channel,
    pressure: Channel,
}

impl StrokeDecoder {
    fn decode(&mut self, raw: &RawPoint) -> Point {
        let x = self.x.apply(raw.encoding, raw.x);
        let y = self.y.apply(raw.encoding, raw.y);
        let pressure = self.pressure.apply(raw.encoding, raw.pressure);

        Point {
            toffset: None,
            position: x.zip(y),
            pressure,
        }
    }
}

/// Decode one stroke. Point order is preserved.
pub fn reconstruct_stroke(raw: &RawStroke) -> Stroke {
    let mut decoder = StrokeDecoder::default();
    Stroke {
        points: raw.points.iter().map(|p| decoder.decode(p)).collect(),
    }
}

/// Decode a raw capture into a [`Drawing`].
///
/// `dimensions` is supplied by the caller since page size is a property of
/// the device rather than of the point data.
pub fn reconstruct(raw: &RawDrawing, device_name: &str, dimensions: (u32, u32)) -> Drawing {
    let mut drawing = Drawing::new(device_name, dimensions, raw.timestamp);
    drawing.strokes = raw.strokes.iter().map(reconstruct_stroke).collect();
    drawing
}
