//! SQL_BATCH request.
//!
//! From TDS 7.2 the UTF-16LE SQL text is preceded by an ALL_HEADERS block
//! holding the transaction descriptor header. Older versions send bare text.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16, write_utf16};
use crate::error::ProtocolError;
use crate::version::TdsVersion;

/// Total ALL_HEADERS length with a single transaction descriptor header.
pub const ALL_HEADERS_LEN: usize = 22;

const TRANSACTION_DESCRIPTOR_HEADER: u16 = 0x0002;

/// A SQL batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlBatch {
    /// SQL text.
    pub sql: String,
    /// Descriptor of the open transaction, 0 in auto-commit mode.
    pub transaction_descriptor: u64,
}

impl SqlBatch {
    /// Batch in auto-commit mode.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            transaction_descriptor: 0,
        }
    }

    /// Run inside the transaction identified by `descriptor`.
    #[must_use]
    pub fn with_transaction(mut self, descriptor: u64) -> Self {
        self.transaction_descriptor = descriptor;
        self
    }

    /// Encode the payload for a session speaking `version`.
    #[must_use]
    pub fn encode(&self, version: TdsVersion) -> Bytes {
        let mut buf = BytesMut::with_capacity(ALL_HEADERS_LEN + self.sql.len() * 2);
        if version.requires_all_headers() {
            buf.put_u32_le(ALL_HEADERS_LEN as u32);
            buf.put_u32_le(18);
            buf.put_u16_le(TRANSACTION_DESCRIPTOR_HEADER);
            buf.put_u64_le(self.transaction_descriptor);
            buf.put_u32_le(1); // outstanding requests
        }
        write_utf16(&mut buf, &self.sql);
        buf.freeze()
    }

    /// Decode a payload, with or without ALL_HEADERS.
    pub fn decode(payload: &[u8], version: TdsVersion) -> Result<Self, ProtocolError> {
        let mut src = payload;
        let mut transaction_descriptor = 0;
        if version.requires_all_headers() {
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof("ALL_HEADERS length"));
            }
            let total = src.get_u32_le() as usize;
            if total < 4 || total > payload.len() {
                return Err(ProtocolError::InvalidField {
                    field: "ALL_HEADERS length",
                    value: total as u64,
                });
            }
            let mut headers = &payload[4..total];
            while headers.remaining() >= 6 {
                let len = headers.get_u32_le() as usize;
                let kind = headers.get_u16_le();
                if kind == TRANSACTION_DESCRIPTOR_HEADER && headers.remaining() >= 8 {
                    transaction_descriptor = headers.get_u64_le();
                }
                headers.advance(len.saturating_sub(6).min(headers.remaining()));
            }
            src = &payload[total..];
        }
        Ok(Self {
            sql: decode_utf16(src)?,
            transaction_descriptor,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_all_headers_layout() {
        let payload = SqlBatch::new("SELECT 1").encode(TdsVersion::V7_4);

        // 22 header bytes + 8 chars * 2
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &22u32.to_le_bytes());
        assert_eq!(&payload[4..8], &18u32.to_le_bytes());
        assert_eq!(&payload[8..10], &[0x02, 0x00]);
        assert_eq!(&payload[18..22], &1u32.to_le_bytes());
        assert_eq!(&payload[22..24], &[b'S', 0x00]);
    }

    #[test]
    fn test_legacy_versions_send_bare_text() {
        let payload = SqlBatch::new("use eCareDev").encode(TdsVersion::V7_1);
        assert_eq!(payload.len(), 24);
        assert_eq!(&payload[0..2], &[b'u', 0x00]);
    }

    #[test]
    fn test_decode_recovers_text_and_descriptor() {
        let batch = SqlBatch::new("select * from Patient").with_transaction(0x0102_0304_0506_0708);
        let decoded = SqlBatch::decode(&batch.encode(TdsVersion::V7_3A), TdsVersion::V7_3A).unwrap();
        assert_eq!(decoded, batch);

        let bare = SqlBatch::new("SET TEXTSIZE 1073741824");
        assert_eq!(
            SqlBatch::decode(&bare.encode(TdsVersion::V7_0), TdsVersion::V7_0).unwrap(),
            bare
        );
    }

    #[test]
    fn test_decode_rejects_oversized_header_length() {
        let mut payload = SqlBatch::new("x").encode(TdsVersion::V7_4).to_vec();
        payload[0] = 0xFF;
        assert!(matches!(
            SqlBatch::decode(&payload, TdsVersion::V7_4),
            Err(ProtocolError::InvalidField { .. })
        ));
    }
}
