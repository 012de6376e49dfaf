//! Wire codec error types.

use thiserror::Error;

/// Errors raised while encoding or decoding MQTT packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The remaining-length varint used more than four bytes.
    #[error("malformed remaining length")]
    MalformedRemainingLength,

    /// The fixed header carried a packet type this codec does not handle.
    #[error("unsupported packet type: {0}")]
    UnsupportedPacketType(u8),

    /// The packet body ended before a field was fully read.
    #[error("packet truncated while reading {0}")]
    Truncated(&'static str),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The QoS bits were set to the reserved value 3.
    #[error("invalid QoS level: {0}")]
    InvalidQoS(u8),

    /// The packet exceeds the protocol's maximum remaining length.
    #[error("packet too large: {size} bytes, max {max} bytes")]
    PacketTooLarge { size: usize, max: usize },

    /// A string field is longer than a u16 length prefix allows.
    #[error("string field too long: {0} bytes")]
    StringTooLong(usize),
}

/// Result type alias using PacketError.
pub type PacketResult<T> = Result<T, PacketError>;
