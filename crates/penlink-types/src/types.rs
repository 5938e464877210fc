//! Core types for smartpen drawing data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Version of the published drawing record format.
pub const DRAWING_FORMAT_VERSION: u32 = 1;

/// How the coordinates of a raw point relate to the previous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum PointEncoding {
    /// Values are absolute positions/pressures.
    Absolute = 0,
    /// Values are offsets from the last known value in the same stroke.
    Relative = 1,
}

impl TryFrom<u8> for PointEncoding {
    type Error = ParseError;

    /// Convert a protocol tag byte to a `PointEncoding`.
    ///
    /// # Examples
    ///
    /// ```
    /// use penlink_types::PointEncoding;
    ///
    /// assert_eq!(PointEncoding::try_from(0), Ok(PointEncoding::Absolute));
    /// assert_eq!(PointEncoding::try_from(1), Ok(PointEncoding::Relative));
    /// assert!(PointEncoding::try_from(7).is_err());
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PointEncoding::Absolute),
            1 => Ok(PointEncoding::Relative),
            other => Err(ParseError::UnknownPointEncoding(other)),
        }
    }
}

impl fmt::Display for PointEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointEncoding::Absolute => write!(f, "absolute"),
            PointEncoding::Relative => write!(f, "relative"),
        }
    }
}

/// A point as framed by the protocol codec, before delta decoding.
///
/// Each channel is independently optional since not every protocol frame
/// reports every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawPoint {
    /// Absolute or relative.
    pub encoding: PointEncoding,
    /// X coordinate or offset.
    pub x: Option<i32>,
    /// Y coordinate or offset.
    pub y: Option<i32>,
    /// Pressure value or offset.
    pub pressure: Option<i32>,
}

impl RawPoint {
    /// Create an absolute raw point.
    pub fn absolute(x: Option<i32>, y: Option<i32>, pressure: Option<i32>) -> Self {
        Self {
            encoding: PointEncoding::Absolute,
            x,
            y,
            pressure,
        }
    }

    /// Create a relative raw point.
    pub fn relative(x: Option<i32>, y: Option<i32>, pressure: Option<i32>) -> Self {
        Self {
            encoding: PointEncoding::Relative,
            x,
            y,
            pressure,
        }
    }
}

impl From<(PointEncoding, Option<i32>, Option<i32>, Option<i32>)> for RawPoint {
    fn from((encoding, x, y, pressure): (PointEncoding, Option<i32>, Option<i32>, Option<i32>)) -> Self {
        Self {
            encoding,
            x,
            y,
            pressure,
        }
    }
}

/// One stroke of raw points, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawStroke {
    /// Raw points in drawing order.
    pub points: Vec<RawPoint>,
}

impl RawStroke {
    /// Create a stroke from raw points.
    pub fn new(points: Vec<RawPoint>) -> Self {
        Self { points }
    }
}

/// A complete capture as delivered by the protocol driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawDrawing {
    /// Capture timestamp in seconds since the Unix epoch.
    pub timestamp: u64,
    /// Strokes in capture order.
    pub strokes: Vec<RawStroke>,
}

/// A decoded point with absolute values.
///
/// Absent fields are omitted from the serialized record entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    /// Time offset within the drawing, if the device reported one.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub toffset: Option<u32>,
    /// Absolute `(x, y)` position.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub position: Option<(i32, i32)>,
    /// Absolute pressure.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub pressure: Option<i32>,
}

/// An ordered sequence of points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stroke {
    /// Points in drawing order.
    pub points: Vec<Point>,
}

/// A reconstructed drawing ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Drawing {
    /// Record format version, always [`DRAWING_FORMAT_VERSION`] for new drawings.
    pub version: u32,
    /// Name of the device that captured the drawing.
    #[cfg_attr(feature = "serde", serde(rename = "devicename"))]
    pub device_name: String,
    /// Page dimensions `(width, height)`.
    pub dimensions: (u32, u32),
    /// Capture timestamp in seconds since the Unix epoch.
    pub timestamp: u64,
    /// Strokes in capture order.
    pub strokes: Vec<Stroke>,
}

impl Drawing {
    /// Create an empty drawing.
    pub fn new(device_name: impl Into<String>, dimensions: (u32, u32), timestamp: u64) -> Self {
        Self {
            version: DRAWING_FORMAT_VERSION,
            device_name: device_name.into(),
            dimensions,
            timestamp,
            strokes: Vec::new(),
        }
    }

    /// Total number of points across all strokes.
    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(|s| s.points.len()).sum()
    }

    /// The capture time, if the timestamp is representable.
    pub fn captured_at(&self) -> Option<time::OffsetDateTime> {
        let secs = i64::try_from(self.timestamp).ok()?;
        time::OffsetDateTime::from_unix_timestamp(secs).ok()
    }

    /// Serialize the drawing as a JSON record.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize the drawing as an indented JSON record.
    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
