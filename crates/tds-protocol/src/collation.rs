//! Collations and the code pages they imply.
//!
//! Non-Unicode character data (CHAR, VARCHAR, TEXT) arrives in the code page
//! of its column collation. The five-byte collation in COLMETADATA carries a
//! Windows locale id plus flags and, for SQL collations, a sort id.

use bytes::{Buf, BufMut};
use encoding_rs::Encoding;

use crate::codec::ensure;
use crate::error::ProtocolError;

/// Wire size of a collation.
pub const COLLATION_LEN: usize = 5;

const LCID_MASK: u32 = 0x000F_FFFF;
const UTF8_FLAG: u32 = 0x0400_0000;

/// Collation attached to character columns and ENVCHANGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collation {
    /// Locale id plus comparison flags and version bits.
    pub info: u32,
    /// SQL collation sort id, 0 for Windows collations.
    pub sort_id: u8,
}

impl Collation {
    /// Decode the five wire bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure(src, COLLATION_LEN, "collation")?;
        Ok(Self {
            info: src.get_u32_le(),
            sort_id: src.get_u8(),
        })
    }

    /// Encode the five wire bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.info);
        dst.put_u8(self.sort_id);
    }

    /// Decode from a byte slice of at least five bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut src = bytes;
        Self::decode(&mut src).ok()
    }

    /// Windows locale id.
    #[must_use]
    pub const fn lcid(&self) -> u32 {
        self.info & LCID_MASK
    }

    /// Whether this is a `_UTF8` collation.
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.info & UTF8_FLAG != 0
    }

    /// Encoding of non-Unicode data under this collation, if known.
    #[must_use]
    pub fn encoding(&self) -> Option<&'static Encoding> {
        if self.is_utf8() {
            return Some(encoding_rs::UTF_8);
        }
        if self.sort_id != 0 {
            return encoding_for_sort_id(self.sort_id);
        }
        encoding_for_lcid(self.lcid())
    }
}

/// Code page of a SQL collation sort id.
fn encoding_for_sort_id(sort_id: u8) -> Option<&'static Encoding> {
    match sort_id {
        // CP437 and CP850 orders; encoding_rs has neither, 1252 is the closest superset.
        30..=61 => Some(encoding_rs::WINDOWS_1252),
        80..=96 => Some(encoding_rs::WINDOWS_1250),
        104..=108 => Some(encoding_rs::WINDOWS_1251),
        112..=114 | 120..=124 => Some(encoding_rs::WINDOWS_1253),
        128..=130 => Some(encoding_rs::WINDOWS_1254),
        136..=138 => Some(encoding_rs::WINDOWS_1255),
        144..=146 => Some(encoding_rs::WINDOWS_1256),
        152..=160 => Some(encoding_rs::WINDOWS_1257),
        183..=186 => Some(encoding_rs::WINDOWS_1252),
        192..=193 => Some(encoding_rs::SHIFT_JIS),
        194..=195 => Some(encoding_rs::EUC_KR),
        196..=197 => Some(encoding_rs::BIG5),
        198..=199 => Some(encoding_rs::GB18030),
        200 => Some(encoding_rs::SHIFT_JIS),
        210..=217 => Some(encoding_rs::WINDOWS_1252),
        _ => None,
    }
}

/// Code page of a Windows locale, keyed on the primary language id.
fn encoding_for_lcid(lcid: u32) -> Option<&'static Encoding> {
    let language = lcid & 0x03FF;
    let encoding = match language {
        0x11 => encoding_rs::SHIFT_JIS,
        0x12 => encoding_rs::EUC_KR,
        0x04 => match lcid & 0xFFFF {
            0x0804 | 0x1004 => encoding_rs::GB18030,
            _ => encoding_rs::BIG5,
        },
        0x1E => encoding_rs::WINDOWS_874,
        0x2A => encoding_rs::WINDOWS_1258,
        0x05 | 0x0E | 0x15 | 0x18 | 0x1B | 0x1C | 0x24 => encoding_rs::WINDOWS_1250,
        0x02 | 0x19 | 0x22 | 0x23 | 0x2F | 0x40 | 0x44 | 0x50 => encoding_rs::WINDOWS_1251,
        0x08 => encoding_rs::WINDOWS_1253,
        0x1F | 0x2C => encoding_rs::WINDOWS_1254,
        0x0D => encoding_rs::WINDOWS_1255,
        0x01 | 0x20 | 0x29 | 0x63 | 0x8C => encoding_rs::WINDOWS_1256,
        0x25..=0x27 => encoding_rs::WINDOWS_1257,
        // Serbian and Croatian share a primary id; the sublanguage picks the script.
        0x1A => match lcid & 0xFFFF {
            0x0C1A | 0x1C1A => encoding_rs::WINDOWS_1251,
            _ => encoding_rs::WINDOWS_1250,
        },
        0x00 => return None,
        _ => encoding_rs::WINDOWS_1252,
    };
    Some(encoding)
}
