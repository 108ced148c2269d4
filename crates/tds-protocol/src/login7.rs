//! LOGIN7 request.
//!
//! A 94-byte fixed header followed by UTF-16LE variable data. Each variable
//! field is located by an `(offset, length)` pair in the header, where the
//! offset is from the start of the LOGIN7 payload and the length counts
//! characters. The password travels obfuscated, not encrypted.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16, utf16_len, write_utf16};
use crate::error::ProtocolError;
use crate::version::TdsVersion;

/// Size of the fixed LOGIN7 header.
pub const LOGIN7_HEADER_SIZE: usize = 94;

bitflags! {
    /// `OptionFlags1` byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags1: u8 {
        /// Big-endian integers.
        const BYTE_ORDER_BE = 0x01;
        /// EBCDIC characters.
        const CHAR_EBCDIC = 0x02;
        /// Dump/load and BCP disabled.
        const DUMP_LOAD_OFF = 0x10;
        /// Report database changes through ENVCHANGE.
        const USE_DB_NOTIFY = 0x20;
        /// Fail the login if the initial database cannot be opened.
        const DATABASE_FATAL = 0x40;
        /// Report language changes through ENVCHANGE.
        const SET_LANG_NOTIFY = 0x80;
    }
}

bitflags! {
    /// `OptionFlags2` byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags2: u8 {
        /// Fail the login if the language cannot be set.
        const LANGUAGE_FATAL = 0x01;
        /// Client is an ODBC driver.
        const ODBC = 0x02;
        /// Integrated (SSPI) authentication.
        const INTEGRATED_SECURITY = 0x80;
    }
}

bitflags! {
    /// `OptionFlags3` byte (TDS 7.2+).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags3: u8 {
        /// Request a password change.
        const CHANGE_PASSWORD = 0x01;
        /// Accept collations the client does not know.
        const UNKNOWN_COLLATION_HANDLING = 0x08;
    }
}

/// LOGIN7 request.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// Highest TDS version the client speaks.
    pub tds_version: TdsVersion,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process id.
    pub client_pid: u32,
    /// First option byte.
    pub option_flags1: OptionFlags1,
    /// Second option byte.
    pub option_flags2: OptionFlags2,
    /// Third option byte.
    pub option_flags3: OptionFlags3,
    /// Client locale id.
    pub client_lcid: u32,
    /// Client machine name.
    pub hostname: String,
    /// Login name.
    pub username: String,
    /// Login password, obfuscated on the wire.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name as known to the client.
    pub server_name: String,
    /// Client interface library name.
    pub library_name: String,
    /// Initial language.
    pub language: String,
    /// Initial database.
    pub database: String,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: crate::packet::DEFAULT_PACKET_SIZE as u32,
            client_prog_version: 0x0700_0000,
            client_pid: std::process::id(),
            option_flags1: OptionFlags1::USE_DB_NOTIFY
                | OptionFlags1::DATABASE_FATAL
                | OptionFlags1::SET_LANG_NOTIFY,
            option_flags2: OptionFlags2::LANGUAGE_FATAL | OptionFlags2::ODBC,
            option_flags3: OptionFlags3::UNKNOWN_COLLATION_HANDLING,
            client_lcid: 0x0409,
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::new(),
            server_name: String::new(),
            library_name: String::from("tds-client"),
            language: String::new(),
            database: String::new(),
        }
    }
}

impl Login7 {
    /// Create a request with default flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TDS version.
    #[must_use]
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }

    /// Set SQL Server authentication credentials.
    #[must_use]
    pub fn with_sql_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the client machine name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Encode the request payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Order of the (offset, length) pairs in the fixed header.
        let fields: [(&str, bool); 9] = [
            (&self.hostname, false),
            (&self.username, false),
            (&self.password, true),
            (&self.app_name, false),
            (&self.server_name, false),
            ("", false),
            (&self.library_name, false),
            (&self.language, false),
            (&self.database, false),
        ];

        let mut pointers = BytesMut::with_capacity(fields.len() * 4);
        let mut data = BytesMut::new();
        for (value, obfuscate) in fields {
            pointers.put_u16_le((LOGIN7_HEADER_SIZE + data.len()) as u16);
            pointers.put_u16_le(utf16_len(value) as u16);
            if obfuscate {
                write_obfuscated_password(&mut data, value);
            } else {
                write_utf16(&mut data, value);
            }
        }
        let tail = (LOGIN7_HEADER_SIZE + data.len()) as u16;

        let mut buf = BytesMut::with_capacity(LOGIN7_HEADER_SIZE + data.len());
        buf.put_u32_le((LOGIN7_HEADER_SIZE + data.len()) as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id
        buf.put_u8(self.option_flags1.bits());
        buf.put_u8(self.option_flags2.bits());
        buf.put_u8(0); // type flags: default SQL
        buf.put_u8(self.option_flags3.bits());
        buf.put_i32_le(0); // client time zone
        buf.put_u32_le(self.client_lcid);
        buf.put_slice(&pointers);
        buf.put_slice(&[0u8; 6]); // client id
        // SSPI, attach-db file and new password are all empty.
        for _ in 0..3 {
            buf.put_u16_le(tail);
            buf.put_u16_le(0);
        }
        buf.put_u32_le(0); // long SSPI length
        debug_assert_eq!(buf.len(), LOGIN7_HEADER_SIZE);

        buf.put_slice(&data);
        buf.freeze()
    }

    /// Decode a request payload, recovering the clear-text password.
    pub fn decode(src: &[u8]) -> Result<Self, ProtocolError> {
        if src.len() < LOGIN7_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: LOGIN7_HEADER_SIZE,
                actual: src.len(),
            });
        }

        let mut header = &src[4..];
        let tds_version = TdsVersion::new(header.get_u32_le());
        let packet_size = header.get_u32_le();
        let client_prog_version = header.get_u32_le();
        let client_pid = header.get_u32_le();
        header.advance(4);
        let option_flags1 = OptionFlags1::from_bits_retain(header.get_u8());
        let option_flags2 = OptionFlags2::from_bits_retain(header.get_u8());
        header.advance(1);
        let option_flags3 = OptionFlags3::from_bits_retain(header.get_u8());
        header.advance(4);
        let client_lcid = header.get_u32_le();

        let mut read_field = |obfuscated: bool| -> Result<String, ProtocolError> {
            let offset = header.get_u16_le() as usize;
            let chars = header.get_u16_le() as usize;
            let end = offset + chars * 2;
            let raw = src
                .get(offset..end)
                .ok_or(ProtocolError::UnexpectedEof("LOGIN7 variable data"))?;
            if obfuscated {
                let clear: Vec<u8> = raw.iter().map(|b| (b ^ 0xA5).rotate_left(4)).collect();
                decode_utf16(&clear)
            } else {
                decode_utf16(raw)
            }
        };

        let hostname = read_field(false)?;
        let username = read_field(false)?;
        let password = read_field(true)?;
        let app_name = read_field(false)?;
        let server_name = read_field(false)?;
        read_field(false)?;
        let library_name = read_field(false)?;
        let language = read_field(false)?;
        let database = read_field(false)?;

        Ok(Self {
            tds_version,
            packet_size,
            client_prog_version,
            client_pid,
            option_flags1,
            option_flags2,
            option_flags3,
            client_lcid,
            hostname,
            username,
            password,
            app_name,
            server_name,
            library_name,
            language,
            database,
        })
    }
}

/// Obfuscate a password: swap the nibbles of every byte, then XOR with `0xA5`.
fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        for byte in unit.to_le_bytes() {
            dst.put_u8(byte.rotate_right(4) ^ 0xA5);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_obfuscation() {
        let mut buf = BytesMut::new();
        write_obfuscated_password(&mut buf, "a");
        // 0x61 -> 0x16 -> 0xB3, 0x00 -> 0x00 -> 0xA5
        assert_eq!(buf.as_ref(), &[0xB3, 0xA5]);
    }

    #[test]
    fn test_fixed_header_fields() {
        let encoded = Login7::new()
            .with_tds_version(TdsVersion::V7_1)
            .with_sql_auth("sa", "sa")
            .with_packet_size(8192)
            .encode();

        assert_eq!(
            u32::from_le_bytes(encoded[0..4].try_into().unwrap()) as usize,
            encoded.len()
        );
        assert_eq!(
            u32::from_le_bytes(encoded[4..8].try_into().unwrap()),
            TdsVersion::V7_1.raw()
        );
        assert_eq!(u32::from_le_bytes(encoded[8..12].try_into().unwrap()), 8192);

        // username pointer: offset 94, 2 characters
        assert_eq!(u16::from_le_bytes([encoded[40], encoded[41]]), 94);
        assert_eq!(u16::from_le_bytes([encoded[42], encoded[43]]), 2);
        assert_eq!(&encoded[94..98], &[b's', 0, b'a', 0]);
    }

    #[test]
    fn test_password_never_sent_in_clear() {
        let encoded = Login7::new().with_sql_auth("sa", "secret").encode();
        let clear: Vec<u8> = "secret".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert!(!encoded.windows(clear.len()).any(|w| w == clear.as_slice()));
    }

    #[test]
    fn test_decode_recovers_fields() {
        let login = Login7::new()
            .with_hostname("workstation")
            .with_sql_auth("sa", "pässword")
            .with_app_name("billing")
            .with_server_name("beast")
            .with_database("eCareDev");

        let decoded = Login7::decode(&login.encode()).unwrap();
        assert_eq!(decoded.hostname, "workstation");
        assert_eq!(decoded.username, "sa");
        assert_eq!(decoded.password, "pässword");
        assert_eq!(decoded.app_name, "billing");
        assert_eq!(decoded.server_name, "beast");
        assert_eq!(decoded.database, "eCareDev");
        assert_eq!(decoded.tds_version, TdsVersion::V7_4);
        assert!(decoded.option_flags2.contains(OptionFlags2::ODBC));
    }

    #[test]
    fn test_decode_short_payload() {
        assert!(matches!(
            Login7::decode(&[0u8; 20]),
            Err(ProtocolError::IncompletePacket { expected: 94, actual: 20 })
        ));
    }
}
