//! Message-level transport over a byte stream.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_protocol::packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{CodecError, Result};
use crate::message::{Message, MessageAssembler};
use crate::packet_codec::{Packet, TdsCodec};

/// Open a TCP connection with Nagle's algorithm disabled.
///
/// No deadline is applied here; callers wrap this in their own timeout.
pub async fn connect(host: &str, port: u16) -> Result<Transport<TcpStream>> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(host, port, "TCP connection established");
    Ok(Transport::new(stream))
}

/// Sends and receives whole TDS messages.
///
/// Outgoing payloads are split into packets no larger than the current
/// packet size. Incoming packets are reassembled until end of message.
pub struct Transport<T> {
    reader: FramedRead<ReadHalf<T>, TdsCodec>,
    writer: FramedWrite<WriteHalf<T>, TdsCodec>,
    assembler: MessageAssembler,
    packet_size: usize,
}

impl<T> Transport<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap a connected stream using the default 4096-byte packet size.
    pub fn new(io: T) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        Self {
            reader: FramedRead::new(read_half, TdsCodec::new()),
            writer: FramedWrite::new(
                write_half,
                TdsCodec::new().with_max_packet_size(DEFAULT_PACKET_SIZE),
            ),
            assembler: MessageAssembler::new(),
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Current outgoing packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Apply a negotiated packet size to outgoing messages.
    pub fn set_packet_size(&mut self, size: usize) {
        let size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        if size != self.packet_size {
            tracing::debug!(packet_size = size, "packet size changed");
        }
        self.packet_size = size;
        let codec = self.writer.encoder_mut();
        *codec = TdsCodec::new().with_max_packet_size(size);
    }

    /// Send `payload` as one message of `packet_type`.
    pub async fn send_message(&mut self, packet_type: PacketType, payload: Bytes) -> Result<()> {
        self.writer.encoder_mut().reset_packet_id();
        let max_payload = self.packet_size - PACKET_HEADER_SIZE;
        let mut remaining = payload;

        loop {
            let chunk = remaining.split_to(remaining.len().min(max_payload));
            let last = remaining.is_empty();
            let status = if last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            let header = PacketHeader::new(packet_type, status, 0);
            self.writer.feed(Packet::new(header, chunk)).await?;
            if last {
                break;
            }
        }

        self.writer.flush().await
    }

    /// Read the next complete message.
    ///
    /// End of stream is always an error: a message is only read when the
    /// server owes one.
    pub async fn read_message(&mut self) -> Result<Message> {
        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet)? {
                        tracing::trace!(
                            packet_type = ?message.packet_type,
                            len = message.len(),
                            "received message"
                        );
                        return Ok(message);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    tracing::debug!(
                        partial = self.assembler.has_partial(),
                        "server closed the connection"
                    );
                    self.assembler.clear();
                    return Err(CodecError::ConnectionClosed);
                }
            }
        }
    }

    /// Flush pending output and shut down the write half.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}

impl<T> std::fmt::Debug for Transport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("packet_size", &self.packet_size)
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use tokio::io::AsyncReadExt;

    fn wire_packet(eom: bool, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::TabularResult as u8);
        buf.put_u8(if eom { 0x01 } else { 0x00 });
        buf.put_u16((PACKET_HEADER_SIZE + payload.len()) as u16);
        buf.put_u16(0);
        buf.put_u8(1);
        buf.put_u8(0);
        buf.put_slice(payload);
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_read_message_reassembles_packets() {
        let io = tokio_test::io::Builder::new()
            .read(&wire_packet(false, b"hello "))
            .read(&wire_packet(true, b"world"))
            .build();
        let mut transport = Transport::new(io);

        let message = transport.read_message().await.unwrap();
        assert_eq!(message.packet_type, PacketType::TabularResult);
        assert_eq!(&message.payload[..], b"hello world");
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let io = tokio_test::io::Builder::new()
            .read(&wire_packet(false, b"partial"))
            .build();
        let mut transport = Transport::new(io);

        let err = transport.read_message().await.unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_send_message_splits_at_packet_size() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut transport = Transport::new(client);
        transport.set_packet_size(MIN_PACKET_SIZE);

        let payload = Bytes::from(vec![0x5Au8; 1200]);
        transport
            .send_message(PacketType::SqlBatch, payload)
            .await
            .unwrap();
        transport.close().await.unwrap();

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();

        // 504 + 504 + 192 payload bytes
        assert_eq!(wire.len(), 1200 + 3 * PACKET_HEADER_SIZE);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 512);
        assert_eq!(wire[1], 0x00);
        assert_eq!(wire[6], 1);
        let last = 2 * 512;
        assert_eq!(wire[last + 1], 0x01);
        assert_eq!(wire[last + 6], 3);
    }

    #[tokio::test]
    async fn test_empty_payload_is_one_packet() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut transport = Transport::new(client);
        transport
            .send_message(PacketType::Attention, Bytes::new())
            .await
            .unwrap();
        transport.close().await.unwrap();

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire.len(), PACKET_HEADER_SIZE);
        assert_eq!(wire[1], 0x01);
    }
}
