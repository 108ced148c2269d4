//! Wire data type identifiers.
//!
//! The type byte in COLMETADATA decides both the shape of the type
//! description that follows it and how each row value is length-prefixed.

use bitflags::bitflags;

/// TDS data type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// Untyped NULL.
    Null = 0x1F,
    /// TINYINT.
    Int1 = 0x30,
    /// BIT.
    Bit = 0x32,
    /// SMALLINT.
    Int2 = 0x34,
    /// INT.
    Int4 = 0x38,
    /// BIGINT.
    Int8 = 0x7F,
    /// REAL.
    Float4 = 0x3B,
    /// FLOAT.
    Float8 = 0x3E,
    /// MONEY.
    Money = 0x3C,
    /// SMALLMONEY.
    Money4 = 0x7A,
    /// DATETIME.
    DateTime = 0x3D,
    /// SMALLDATETIME.
    DateTime4 = 0x3A,

    /// UNIQUEIDENTIFIER.
    Guid = 0x24,
    /// Nullable integer of width 1, 2, 4 or 8.
    IntN = 0x26,
    /// Nullable BIT.
    BitN = 0x68,
    /// Nullable REAL or FLOAT.
    FloatN = 0x6D,
    /// Nullable MONEY or SMALLMONEY.
    MoneyN = 0x6E,
    /// Nullable DATETIME or SMALLDATETIME.
    DateTimeN = 0x6F,
    /// Legacy DECIMAL.
    Decimal = 0x37,
    /// Legacy NUMERIC.
    Numeric = 0x3F,
    /// DECIMAL.
    DecimalN = 0x6A,
    /// NUMERIC.
    NumericN = 0x6C,

    /// Legacy CHAR (byte length).
    Char = 0x2F,
    /// Legacy VARCHAR (byte length).
    VarChar = 0x27,
    /// Legacy BINARY (byte length).
    Binary = 0x2D,
    /// Legacy VARBINARY (byte length).
    VarBinary = 0x25,
    /// VARCHAR.
    BigVarChar = 0xA7,
    /// CHAR.
    BigChar = 0xAF,
    /// VARBINARY.
    BigVarBinary = 0xA5,
    /// BINARY.
    BigBinary = 0xAD,
    /// NVARCHAR.
    NVarChar = 0xE7,
    /// NCHAR.
    NChar = 0xEF,

    /// TEXT.
    Text = 0x23,
    /// NTEXT.
    NText = 0x63,
    /// IMAGE.
    Image = 0x22,
    /// XML.
    Xml = 0xF1,

    /// DATE.
    Date = 0x28,
    /// TIME(n).
    Time = 0x29,
    /// DATETIME2(n).
    DateTime2 = 0x2A,
    /// DATETIMEOFFSET(n).
    DateTimeOffset = 0x2B,
}

/// How a column value is length-prefixed in a ROW token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLength {
    /// Fixed width, never NULL.
    Fixed(usize),
    /// One length byte; `0` is NULL.
    Byte,
    /// Two length bytes; `0xFFFF` is NULL.
    UShort,
    /// Text pointer followed by a four-byte length; an empty pointer is NULL.
    TextPtr,
    /// Partially length-prefixed chunks; MAX types and XML.
    Plp,
}

impl TypeId {
    /// Create a type id from its wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x1F => Self::Null,
            0x30 => Self::Int1,
            0x32 => Self::Bit,
            0x34 => Self::Int2,
            0x38 => Self::Int4,
            0x7F => Self::Int8,
            0x3B => Self::Float4,
            0x3E => Self::Float8,
            0x3C => Self::Money,
            0x7A => Self::Money4,
            0x3D => Self::DateTime,
            0x3A => Self::DateTime4,
            0x24 => Self::Guid,
            0x26 => Self::IntN,
            0x68 => Self::BitN,
            0x6D => Self::FloatN,
            0x6E => Self::MoneyN,
            0x6F => Self::DateTimeN,
            0x37 => Self::Decimal,
            0x3F => Self::Numeric,
            0x6A => Self::DecimalN,
            0x6C => Self::NumericN,
            0x2F => Self::Char,
            0x27 => Self::VarChar,
            0x2D => Self::Binary,
            0x25 => Self::VarBinary,
            0xA7 => Self::BigVarChar,
            0xAF => Self::BigChar,
            0xA5 => Self::BigVarBinary,
            0xAD => Self::BigBinary,
            0xE7 => Self::NVarChar,
            0xEF => Self::NChar,
            0x23 => Self::Text,
            0x63 => Self::NText,
            0x22 => Self::Image,
            0xF1 => Self::Xml,
            0x28 => Self::Date,
            0x29 => Self::Time,
            0x2A => Self::DateTime2,
            0x2B => Self::DateTimeOffset,
            _ => return None,
        })
    }

    /// Width of a fixed-length type.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 | Self::Float4 | Self::Money4 | Self::DateTime4 => Some(4),
            Self::Int8 | Self::Float8 | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// Row value framing for a column of this type with declared `max_length`.
    #[must_use]
    pub const fn value_length(self, max_length: u32) -> ValueLength {
        if let Some(size) = self.fixed_size() {
            return ValueLength::Fixed(size);
        }
        match self {
            Self::Text | Self::NText | Self::Image => ValueLength::TextPtr,
            Self::Xml => ValueLength::Plp,
            Self::BigVarChar | Self::BigVarBinary | Self::NVarChar if max_length == 0xFFFF => {
                ValueLength::Plp
            }
            Self::BigVarChar
            | Self::BigChar
            | Self::BigVarBinary
            | Self::BigBinary
            | Self::NVarChar
            | Self::NChar => ValueLength::UShort,
            _ => ValueLength::Byte,
        }
    }

    /// Whether every non-null value has exactly the column's declared length.
    #[must_use]
    pub const fn has_exact_length(self) -> bool {
        matches!(
            self,
            Self::IntN | Self::BitN | Self::FloatN | Self::MoneyN | Self::DateTimeN | Self::Guid
        )
    }

    /// Whether values are UTF-16 text.
    #[must_use]
    pub const fn is_unicode(self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText | Self::Xml)
    }

    /// Whether values are single-byte text in a collation code page.
    #[must_use]
    pub const fn is_ansi_text(self) -> bool {
        matches!(
            self,
            Self::Char | Self::VarChar | Self::BigChar | Self::BigVarChar | Self::Text
        )
    }

    /// Whether COLMETADATA carries a collation for this type.
    #[must_use]
    pub const fn has_collation(self) -> bool {
        matches!(
            self,
            Self::BigChar
                | Self::BigVarChar
                | Self::Text
                | Self::NChar
                | Self::NVarChar
                | Self::NText
        )
    }

    /// Whether the type carries a fractional-second scale.
    #[must_use]
    pub const fn has_time_scale(self) -> bool {
        matches!(self, Self::Time | Self::DateTime2 | Self::DateTimeOffset)
    }
}

bitflags! {
    /// Column flags from COLMETADATA.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ColumnFlags: u16 {
        /// Column accepts NULL.
        const NULLABLE = 0x0001;
        /// Case-sensitive comparisons.
        const CASE_SENSITIVE = 0x0002;
        /// Writable column.
        const UPDATEABLE = 0x0004;
        /// Updateability unknown.
        const UPDATEABLE_UNKNOWN = 0x0008;
        /// Identity column.
        const IDENTITY = 0x0010;
        /// Computed column.
        const COMPUTED = 0x0020;
        /// Hidden browse-mode key column.
        const HIDDEN = 0x2000;
        /// Key column.
        const KEY = 0x4000;
        /// Nullability unknown.
        const NULLABLE_UNKNOWN = 0x8000;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_from_u8() {
        assert_eq!(TypeId::from_u8(0x38), Some(TypeId::Int4));
        assert_eq!(TypeId::from_u8(0x6F), Some(TypeId::DateTimeN));
        assert_eq!(TypeId::from_u8(0x62), None);
    }

    #[test]
    fn test_value_length_classes() {
        assert_eq!(TypeId::Float8.value_length(8), ValueLength::Fixed(8));
        assert_eq!(TypeId::FloatN.value_length(8), ValueLength::Byte);
        assert!(TypeId::IntN.has_exact_length());
        assert!(!TypeId::VarChar.has_exact_length());
        assert_eq!(TypeId::VarChar.value_length(255), ValueLength::Byte);
        assert_eq!(TypeId::BigVarChar.value_length(50), ValueLength::UShort);
        assert_eq!(TypeId::NVarChar.value_length(0xFFFF), ValueLength::Plp);
        assert_eq!(TypeId::Text.value_length(0x7FFF_FFFF), ValueLength::TextPtr);
        assert_eq!(TypeId::DateTime2.value_length(8), ValueLength::Byte);
    }

    #[test]
    fn test_collation_bearing_types() {
        assert!(TypeId::BigVarChar.has_collation());
        assert!(TypeId::NText.has_collation());
        assert!(!TypeId::BigVarBinary.has_collation());
        assert!(!TypeId::VarChar.has_collation());
    }

    #[test]
    fn test_column_flags_keep_unknown_bits() {
        let flags = ColumnFlags::from_bits_retain(0x0811);
        assert!(flags.contains(ColumnFlags::NULLABLE | ColumnFlags::IDENTITY));
        assert_eq!(flags.bits(), 0x0811);
    }
}
