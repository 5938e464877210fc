//! Error types for data parsing in penlink-types.

use thiserror::Error;

/// Errors that can occur when interpreting raw pen data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in penlink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A raw point carried an encoding tag that is neither absolute nor relative.
    #[error("Unknown point encoding: 0x{0:02X}")]
    UnknownPointEncoding(u8),

    /// Generic invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using penlink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
