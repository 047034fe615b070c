//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from frame parsing, validation, and payload (de)serialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short to contain a header.
    #[error("buffer too short for header: {len} bytes, need {need}")]
    HeaderTooShort {
        /// Bytes available.
        len: usize,
        /// Bytes required.
        need: usize,
    },

    /// Payload shorter than the header claims.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size from the header.
        expected: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// Magic number mismatch.
    #[error("invalid magic number: {magic:#010x}")]
    InvalidMagic {
        /// Magic value found on the wire.
        magic: u32,
    },

    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the wire limit.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Opcode not known to this protocol version.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failure.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failure.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
