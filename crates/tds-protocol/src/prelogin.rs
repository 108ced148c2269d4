//! PRELOGIN negotiation message.
//!
//! The first message of every TDS 7.x session. The payload is a table of
//! `(option, offset, length)` entries terminated by `0xFF`, followed by the
//! option data. Offsets are absolute from the start of the payload and the
//! table fields are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::version::{ServerVersion, TdsVersion};

/// PRELOGIN option tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PreLoginOption {
    /// Version information.
    Version = 0x00,
    /// Encryption negotiation.
    Encryption = 0x01,
    /// Instance name.
    Instance = 0x02,
    /// Client thread id.
    ThreadId = 0x03,
    /// MARS support.
    Mars = 0x04,
    /// End of the option table.
    Terminator = 0xFF,
}

/// Encryption setting exchanged during PRELOGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encrypt the login packet only.
    Off = 0x00,
    /// Encrypt the whole session.
    On = 0x01,
    /// No encryption available.
    #[default]
    NotSupported = 0x02,
    /// Encryption is mandatory.
    Required = 0x03,
}

impl EncryptionLevel {
    /// Decode the option byte. Unknown values are treated as `Required`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Off,
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            _ => Self::Required,
        }
    }

    /// Whether a client that cannot encrypt may continue with this server answer.
    #[must_use]
    pub const fn allows_plaintext(self) -> bool {
        matches!(self, Self::NotSupported)
    }
}

/// PRELOGIN request or response.
#[derive(Debug, Clone, Default)]
pub struct PreLogin {
    /// Client TDS version (request direction).
    pub version: TdsVersion,
    /// Server product version (response direction).
    pub server_version: Option<ServerVersion>,
    /// Encryption setting.
    pub encryption: EncryptionLevel,
    /// Instance name to validate, if any.
    pub instance: Option<String>,
    /// Client thread id.
    pub thread_id: Option<u32>,
    /// MARS requested or granted.
    pub mars: bool,
}

impl PreLogin {
    /// Request for a client that does not encrypt.
    #[must_use]
    pub fn new(version: TdsVersion) -> Self {
        Self {
            version,
            encryption: EncryptionLevel::NotSupported,
            thread_id: Some(std::process::id()),
            ..Self::default()
        }
    }

    /// Set the encryption level.
    #[must_use]
    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.encryption = level;
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Encode the message payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut data = BytesMut::new();
        let mut entries: Vec<(PreLoginOption, usize, usize)> = Vec::with_capacity(5);

        let mut push = |option, data: &mut BytesMut, write: &dyn Fn(&mut BytesMut)| {
            let start = data.len();
            write(data);
            entries.push((option, start, data.len() - start));
        };

        let version = self.version.raw();
        push(PreLoginOption::Version, &mut data, &|d| {
            d.put_u32(version);
            d.put_u16_le(0);
        });
        let encryption = self.encryption as u8;
        push(PreLoginOption::Encryption, &mut data, &|d| d.put_u8(encryption));
        let instance = self.instance.clone().unwrap_or_default();
        push(PreLoginOption::Instance, &mut data, &|d| {
            d.put_slice(instance.as_bytes());
            d.put_u8(0);
        });
        if let Some(thread_id) = self.thread_id {
            push(PreLoginOption::ThreadId, &mut data, &|d| d.put_u32(thread_id));
        }
        let mars = u8::from(self.mars);
        push(PreLoginOption::Mars, &mut data, &|d| d.put_u8(mars));

        let table_len = entries.len() * 5 + 1;
        let mut buf = BytesMut::with_capacity(table_len + data.len());
        for (option, start, len) in entries {
            buf.put_u8(option as u8);
            buf.put_u16((table_len + start) as u16);
            buf.put_u16(len as u16);
        }
        buf.put_u8(PreLoginOption::Terminator as u8);
        buf.put_slice(&data);
        buf.freeze()
    }

    /// Decode a PRELOGIN payload. Unknown options are skipped.
    pub fn decode(src: &[u8]) -> Result<Self, ProtocolError> {
        let mut table = src;
        let mut entries = Vec::new();
        loop {
            if !table.has_remaining() {
                return Err(ProtocolError::UnexpectedEof("PRELOGIN option table"));
            }
            let option = table.get_u8();
            if option == PreLoginOption::Terminator as u8 {
                break;
            }
            if table.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof("PRELOGIN option entry"));
            }
            let offset = table.get_u16() as usize;
            let len = table.get_u16() as usize;
            if offset + len > src.len() {
                return Err(ProtocolError::InvalidPreloginOption(option));
            }
            entries.push((option, &src[offset..offset + len]));
        }

        let mut prelogin = Self::default();
        for (option, value) in entries {
            match option {
                0x00 if value.len() >= 4 => {
                    let raw = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                    prelogin.server_version = Some(ServerVersion::from_prelogin(raw));
                }
                0x01 if !value.is_empty() => {
                    prelogin.encryption = EncryptionLevel::from_u8(value[0]);
                }
                0x02 => {
                    let name = value.split(|&b| b == 0).next().unwrap_or_default();
                    if !name.is_empty() {
                        prelogin.instance = Some(String::from_utf8_lossy(name).into_owned());
                    }
                }
                0x03 if value.len() >= 4 => {
                    prelogin.thread_id =
                        Some(u32::from_be_bytes([value[0], value[1], value[2], value[3]]));
                }
                0x04 if !value.is_empty() => prelogin.mars = value[0] != 0,
                _ => {}
            }
        }
        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let encoded = PreLogin::new(TdsVersion::V7_1).encode();

        // 5 options * 5 bytes + terminator
        assert_eq!(encoded[0], PreLoginOption::Version as u8);
        assert_eq!(u16::from_be_bytes([encoded[1], encoded[2]]), 26);
        assert_eq!(encoded[25], PreLoginOption::Terminator as u8);
        assert_eq!(&encoded[26..30], &[0x71, 0x00, 0x00, 0x00]);
        // encryption byte follows the 6 version bytes
        assert_eq!(encoded[32], EncryptionLevel::NotSupported as u8);
    }

    #[test]
    fn test_decode_reads_absolute_offsets() {
        use bytes::BufMut;

        let mut buf = BytesMut::new();
        // ENCRYPTION listed before VERSION, data in reverse order
        buf.put_u8(0x01);
        buf.put_u16(11);
        buf.put_u16(1);
        buf.put_u8(0x00);
        buf.put_u16(12);
        buf.put_u16(6);
        buf.put_u8(0xFF);
        buf.put_u8(0x02);
        buf.put_slice(&[0x08, 0x00, 0x07, 0xF7, 0x00, 0x00]);

        let decoded = PreLogin::decode(&buf).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::NotSupported);
        assert!(decoded.encryption.allows_plaintext());
        assert_eq!(decoded.server_version.unwrap().to_string(), "8.0.2039");
    }

    #[test]
    fn test_decode_roundtrips_request_fields() {
        let request = PreLogin::new(TdsVersion::V7_4).with_instance("SQLEXPRESS");
        let decoded = PreLogin::decode(&request.encode()).unwrap();
        assert_eq!(decoded.instance.as_deref(), Some("SQLEXPRESS"));
        assert_eq!(decoded.thread_id, request.thread_id);
        assert!(!decoded.mars);
    }

    #[test]
    fn test_offset_past_payload_is_rejected() {
        let data = [0x01u8, 0x00, 0x40, 0x00, 0x01, 0xFF];
        assert_eq!(
            PreLogin::decode(&data).unwrap_err(),
            ProtocolError::InvalidPreloginOption(0x01)
        );
    }

    #[test]
    fn test_missing_terminator_is_eof() {
        assert!(matches!(
            PreLogin::decode(&[0x00, 0x00]),
            Err(ProtocolError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn test_required_encryption_blocks_plaintext() {
        assert!(!EncryptionLevel::from_u8(0x03).allows_plaintext());
        assert!(!EncryptionLevel::On.allows_plaintext());
        assert!(!EncryptionLevel::Off.allows_plaintext());
    }
}
