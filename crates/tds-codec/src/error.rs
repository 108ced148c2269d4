//! Codec error types.

use thiserror::Error;

/// Errors raised by packet framing and transport I/O.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Socket read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet header or payload failed protocol validation.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// Packet length below the header size.
    #[error("invalid packet header")]
    InvalidHeader,

    /// Packet exceeds the configured maximum.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Declared packet size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// A message mixed packet types before end of message.
    #[error("packet type changed mid-message: {first:?} then {next:?}")]
    MixedPacketTypes {
        /// Type of the first packet.
        first: tds_protocol::PacketType,
        /// Type of the offending packet.
        next: tds_protocol::PacketType,
    },

    /// The peer closed the socket while a message was expected.
    #[error("connection closed by server")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the error came from the socket rather than the byte stream.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
