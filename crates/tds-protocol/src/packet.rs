//! TDS packet header definitions.
//!
//! Every message on the wire is split into packets. Each packet carries an
//! 8-byte header; the multi-byte header fields are big-endian, unlike the
//! little-endian payloads they frame.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Largest packet the length field can describe.
pub const MAX_PACKET_SIZE: usize = 32767;

/// Packet size requested at login and used until the server says otherwise.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Smallest packet size a server may negotiate.
pub const MIN_PACKET_SIZE: usize = 512;

/// TDS packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Tabular response from the server.
    TabularResult = 0x04,
    /// Attention (cancel) signal.
    Attention = 0x06,
    /// TDS 7.x login request.
    Tds7Login = 0x10,
    /// Pre-login negotiation.
    PreLogin = 0x12,
}

impl PacketType {
    /// Create a packet type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::SqlBatch),
            0x04 => Ok(Self::TabularResult),
            0x06 => Ok(Self::Attention),
            0x10 => Ok(Self::Tds7Login),
            0x12 => Ok(Self::PreLogin),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// More packets follow.
        const NORMAL = 0x00;
        /// Last packet of the message.
        const END_OF_MESSAGE = 0x01;
        /// Ignore this event (attention acknowledgment).
        const IGNORE_EVENT = 0x02;
        /// Reset the session before processing.
        const RESET_CONNECTION = 0x08;
        /// Reset the session but keep the transaction.
        const RESET_CONNECTION_KEEP_TRANSACTION = 0x10;
    }
}

/// TDS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Type of packet.
    pub packet_type: PacketType,
    /// Status flags.
    pub status: PacketStatus,
    /// Total packet length including the header.
    pub length: u16,
    /// Server process id.
    pub spid: u16,
    /// Sequence number, wrapping at 255.
    pub packet_id: u8,
    /// Unused, always 0.
    pub window: u8,
}

impl PacketHeader {
    /// Create a header for a packet of `length` total bytes.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Parse a packet header, validating type, status and length.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let packet_type = PacketType::from_u8(src.get_u8())?;
        let status_byte = src.get_u8();
        let status = PacketStatus::from_bits(status_byte)
            .ok_or(ProtocolError::InvalidPacketStatus(status_byte))?;
        let length = src.get_u16();
        if (length as usize) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::InvalidPacketLength(length as usize));
        }

        Ok(Self {
            packet_type,
            status,
            length,
            spid: src.get_u16(),
            packet_id: src.get_u8(),
            window: src.get_u8(),
        })
    }

    /// Encode the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Encode the header into a fresh buffer.
    #[must_use]
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Payload length (total length minus header).
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Whether this packet ends its message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }

    /// Set the sequence number.
    #[must_use]
    pub const fn with_packet_id(mut self, id: u8) -> Self {
        self.packet_id = id;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields_are_big_endian() {
        let header = PacketHeader {
            packet_type: PacketType::SqlBatch,
            status: PacketStatus::END_OF_MESSAGE,
            length: 0x0126,
            spid: 0x0035,
            packet_id: 1,
            window: 0,
        };

        let bytes = header.encode_to_bytes();
        assert_eq!(bytes.as_ref(), &[0x01, 0x01, 0x01, 0x26, 0x00, 0x35, 0x01, 0x00]);

        let mut cursor = bytes.as_ref();
        assert_eq!(PacketHeader::decode(&mut cursor).unwrap(), header);
    }

    #[test]
    fn test_payload_length() {
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::NORMAL, 100);
        assert_eq!(header.payload_length(), 92);
        assert!(!header.is_end_of_message());
    }

    #[test]
    fn test_short_header_is_incomplete() {
        let mut cursor = &[0x04u8, 0x01, 0x00][..];
        assert!(matches!(
            PacketHeader::decode(&mut cursor),
            Err(ProtocolError::IncompletePacket { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_length_below_header_size_rejected() {
        let mut cursor = &[0x04u8, 0x01, 0x00, 0x04, 0x00, 0x00, 0x01, 0x00][..];
        assert_eq!(
            PacketHeader::decode(&mut cursor),
            Err(ProtocolError::InvalidPacketLength(4))
        );
    }

    #[test]
    fn test_packet_type_from_u8() {
        assert_eq!(PacketType::from_u8(0x04).unwrap(), PacketType::TabularResult);
        assert_eq!(PacketType::from_u8(0x12).unwrap(), PacketType::PreLogin);
        assert!(PacketType::from_u8(0xFF).is_err());
    }
}
