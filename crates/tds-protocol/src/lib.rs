//! # tds-protocol
//!
//! Wire structures of the Tabular Data Stream protocol spoken by Microsoft
//! SQL Server and Sybase-derived servers, for TDS versions 7.0 through 7.4.
//!
//! This crate is IO-agnostic: it encodes requests (PRELOGIN, LOGIN7,
//! SQL_BATCH), frames packets and decodes the token stream of a response.
//! Sockets and async runtimes live in higher-level crates.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use tds_protocol::{Token, TokenParser, TdsVersion};
//!
//! // DONE with a row count of 1
//! let data = Bytes::from_static(&[0xFD, 0x10, 0x00, 0xC1, 0x00, 1, 0, 0, 0, 0, 0, 0, 0]);
//! let mut parser = TokenParser::new(data, TdsVersion::V7_4);
//! match parser.next_token().unwrap() {
//!     Some(Token::Done(done)) => assert_eq!(done.count(), Some(1)),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod collation;
pub mod error;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod sql_batch;
pub mod token;
pub mod types;
pub mod version;

pub use collation::Collation;
pub use error::ProtocolError;
pub use login7::{Login7, OptionFlags1, OptionFlags2, OptionFlags3};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin, PreLoginOption};
pub use sql_batch::SqlBatch;
pub use token::{
    ColMetaData, ColumnData, Done, DoneStatus, EnvChange, LoginAck, RawRow, ServerMessage, Token,
    TokenParser, TokenType, TypeInfo,
};
pub use types::{ColumnFlags, TypeId, ValueLength};
pub use version::{ServerVersion, TdsVersion};
