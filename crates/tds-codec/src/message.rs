//! Message reassembly.
//!
//! A request or response may span several packets; the last one carries
//! `END_OF_MESSAGE`.

use bytes::{Bytes, BytesMut};
use tds_protocol::packet::PacketType;

use crate::error::CodecError;
use crate::packet_codec::Packet;

/// A complete message reassembled from one or more packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Packet type shared by all packets of the message.
    pub packet_type: PacketType,
    /// Concatenated payloads.
    pub payload: Bytes,
}

impl Message {
    /// Payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Buffers packet payloads until a message is complete.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
    packet_count: usize,
}

impl MessageAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a packet. Returns the message once its final packet arrives.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>, CodecError> {
        let packet_type = *self.packet_type.get_or_insert(packet.header.packet_type);
        if packet_type != packet.header.packet_type {
            let next = packet.header.packet_type;
            self.clear();
            return Err(CodecError::MixedPacketTypes {
                first: packet_type,
                next,
            });
        }

        self.buffer.extend_from_slice(&packet.payload);
        self.packet_count += 1;

        tracing::trace!(
            packet_type = ?packet_type,
            packet_count = self.packet_count,
            buffer_len = self.buffer.len(),
            "assembling message"
        );

        if !packet.is_end_of_message() {
            return Ok(None);
        }

        self.packet_type = None;
        self.packet_count = 0;
        Ok(Some(Message {
            packet_type,
            payload: self.buffer.split().freeze(),
        }))
    }

    /// Whether a message is partially buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Packets buffered for the current message.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Drop any partial message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.packet_count = 0;
    }
}
