//! Platform-agnostic types for BLE smartpen devices.
//!
//! This crate provides the data shared between the device engine
//! (penlink-core) and its consumers: raw point tuples as framed by the pen
//! protocol, the reconstructed [`Drawing`] record, and vendor Bluetooth
//! identifiers.
//!
//! # Example
//!
//! ```
//! use penlink_types::{Drawing, Point, Stroke};
//!
//! let mut drawing = Drawing::new("Bamboo Slate", (21000, 14800), 1_500_000_000);
//! drawing.strokes.push(Stroke {
//!     points: vec![Point { position: Some((10, 20)), ..Default::default() }],
//! });
//! assert_eq!(drawing.point_count(), 1);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    DRAWING_FORMAT_VERSION, Drawing, Point, PointEncoding, RawDrawing, RawPoint, RawStroke, Stroke,
};
pub use uuid as uuids;
