//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding TDS wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Fewer bytes are buffered than the structure requires.
    #[error("incomplete packet: expected {expected} bytes, have {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The stream ended in the middle of a structure.
    #[error("unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),

    /// Unknown packet type byte in a packet header.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Packet status byte with undefined bits set.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// Packet length outside the legal range.
    #[error("invalid packet length: {0}")]
    InvalidPacketLength(usize),

    /// Unknown token type in a tabular result stream.
    #[error("invalid token type: 0x{0:02X}")]
    InvalidTokenType(u8),

    /// Column data type the decoder does not understand.
    #[error("unsupported data type: 0x{0:02X}")]
    UnsupportedDataType(u8),

    /// A length or enumeration field holds an illegal value.
    #[error("invalid value {value} for {field}")]
    InvalidField {
        /// Field being decoded.
        field: &'static str,
        /// Offending value.
        value: u64,
    },

    /// A row token arrived before any column metadata.
    #[error("row data received without column metadata")]
    MissingColumnMetadata,

    /// Text could not be decoded.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// A PRELOGIN option table is malformed.
    #[error("malformed PRELOGIN option 0x{0:02X}")]
    InvalidPreloginOption(u8),
}
