//! # tds-codec
//!
//! Async framing layer between a TCP stream and the TDS client.
//!
//! ```text
//! TcpStream → TdsCodec (packet framing) → MessageAssembler → Transport
//! ```
//!
//! [`TdsCodec`] plugs into `tokio_util` framed readers and writers. It
//! buffers partial reads until a packet's declared length has arrived and
//! rejects headers whose length is out of range. [`Transport`] works in
//! whole messages: it splits outgoing payloads at the negotiated packet size
//! and reassembles incoming packets until end of message.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod message;
pub mod packet_codec;
pub mod transport;

pub use error::{CodecError, Result};
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, TdsCodec};
pub use transport::{Transport, connect};
