//! Primitive readers and writers shared by the protocol structures.
//!
//! TDS strings are UTF-16LE and prefixed with their length in characters:
//! one byte for `B_VARCHAR`, two bytes for `US_VARCHAR`.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Ensure `src` holds at least `needed` bytes.
#[inline]
pub fn ensure(src: &impl Buf, needed: usize, what: &'static str) -> Result<(), ProtocolError> {
    if src.remaining() < needed {
        Err(ProtocolError::UnexpectedEof(what))
    } else {
        Ok(())
    }
}

/// Read a `B_VARCHAR`: one length byte (characters) then UTF-16LE text.
pub fn read_b_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(src, 1, "B_VARCHAR length")?;
    let chars = src.get_u8() as usize;
    read_utf16(src, chars * 2)
}

/// Read a `US_VARCHAR`: two length bytes (characters) then UTF-16LE text.
pub fn read_us_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(src, 2, "US_VARCHAR length")?;
    let chars = src.get_u16_le() as usize;
    read_utf16(src, chars * 2)
}

/// Read `byte_len` bytes of UTF-16LE text.
pub fn read_utf16(src: &mut impl Buf, byte_len: usize) -> Result<String, ProtocolError> {
    if byte_len % 2 != 0 {
        return Err(ProtocolError::InvalidField {
            field: "UTF-16 byte length",
            value: byte_len as u64,
        });
    }
    ensure(src, byte_len, "UTF-16 text")?;
    let units: Vec<u16> = (0..byte_len / 2).map(|_| src.get_u16_le()).collect();
    String::from_utf16(&units).map_err(|e| ProtocolError::StringEncoding(e.to_string()))
}

/// Decode a complete UTF-16LE byte slice.
pub fn decode_utf16(bytes: &[u8]) -> Result<String, ProtocolError> {
    let mut src = bytes;
    read_utf16(&mut src, bytes.len())
}

/// Write a `B_VARCHAR`, truncating to 255 characters.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(u8::MAX as usize).collect();
    dst.put_u8(units.len() as u8);
    units.iter().for_each(|&u| dst.put_u16_le(u));
}

/// Write a `US_VARCHAR`, truncating to 65535 characters.
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().take(u16::MAX as usize).collect();
    dst.put_u16_le(units.len() as u16);
    units.iter().for_each(|&u| dst.put_u16_le(u));
}

/// Write UTF-16LE text with no length prefix.
pub fn write_utf16(dst: &mut impl BufMut, s: &str) {
    s.encode_utf16().for_each(|u| dst.put_u16_le(u));
}

/// Number of UTF-16 code units in `s`.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn b_varchar_handles_non_bmp_text() {
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, "Patient 🏥");
        assert_eq!(buf[0] as usize, utf16_len("Patient 🏥"));

        let mut src = buf.freeze();
        assert_eq!(read_b_varchar(&mut src).unwrap(), "Patient 🏥");
        assert!(src.is_empty());
    }

    #[test]
    fn us_varchar_reads_declared_length_only() {
        let mut buf = BytesMut::new();
        write_us_varchar(&mut buf, "eCareDev");
        buf.extend_from_slice(&[0xAA, 0xBB]);

        let mut src = buf.freeze();
        assert_eq!(read_us_varchar(&mut src).unwrap(), "eCareDev");
        assert_eq!(src.as_ref(), &[0xAA, 0xBB]);
    }

    #[test]
    fn truncated_text_is_an_eof_error() {
        let data = [0x04u8, b'a', 0x00];
        let mut src = &data[..];
        assert!(matches!(
            read_b_varchar(&mut src),
            Err(ProtocolError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn odd_byte_length_is_rejected() {
        assert!(matches!(
            decode_utf16(&[0x41, 0x00, 0x42]),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn b_varchar_truncates_long_input() {
        let long = "x".repeat(300);
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, &long);
        assert_eq!(buf[0], 255);
        assert_eq!(buf.len(), 1 + 255 * 2);
    }
}
