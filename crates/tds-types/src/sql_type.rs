//! Semantic SQL types.
//!
//! The wire type alone is ambiguous: an `INTN` column may be TINYINT
//! through BIGINT depending on its declared width. [`SqlType`] resolves the
//! declared type from the full column description.

use std::fmt;

use tds_protocol::{TypeId, TypeInfo};

use crate::error::TypeError;

/// The declared SQL type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SqlType {
    /// Untyped NULL, as in `SELECT NULL`.
    Null,
    /// BIT.
    Bit,
    /// TINYINT.
    TinyInt,
    /// SMALLINT.
    SmallInt,
    /// INT.
    Int,
    /// BIGINT.
    BigInt,
    /// REAL.
    Real,
    /// FLOAT.
    Float,
    /// SMALLMONEY.
    SmallMoney,
    /// MONEY.
    Money,
    /// DECIMAL.
    Decimal,
    /// NUMERIC.
    Numeric,
    /// SMALLDATETIME.
    SmallDateTime,
    /// DATETIME.
    DateTime,
    /// DATE.
    Date,
    /// TIME.
    Time,
    /// DATETIME2.
    DateTime2,
    /// DATETIMEOFFSET.
    DateTimeOffset,
    /// CHAR.
    Char,
    /// VARCHAR.
    VarChar,
    /// TEXT.
    Text,
    /// NCHAR.
    NChar,
    /// NVARCHAR.
    NVarChar,
    /// NTEXT.
    NText,
    /// BINARY.
    Binary,
    /// VARBINARY.
    VarBinary,
    /// IMAGE.
    Image,
    /// UNIQUEIDENTIFIER.
    UniqueIdentifier,
    /// XML.
    Xml,
}

impl SqlType {
    /// Resolve the declared type of a column.
    pub fn from_type_info(info: &TypeInfo) -> Result<Self, TypeError> {
        let width = info.max_length;
        let ty = match info.type_id {
            TypeId::Null => Self::Null,
            TypeId::Bit | TypeId::BitN => Self::Bit,
            TypeId::Int1 => Self::TinyInt,
            TypeId::Int2 => Self::SmallInt,
            TypeId::Int4 => Self::Int,
            TypeId::Int8 => Self::BigInt,
            TypeId::IntN => match width {
                1 => Self::TinyInt,
                2 => Self::SmallInt,
                4 => Self::Int,
                8 => Self::BigInt,
                _ => return Err(invalid_width("INTN", width)),
            },
            TypeId::Float4 => Self::Real,
            TypeId::Float8 => Self::Float,
            TypeId::FloatN => match width {
                4 => Self::Real,
                8 => Self::Float,
                _ => return Err(invalid_width("FLTN", width)),
            },
            TypeId::Money4 => Self::SmallMoney,
            TypeId::Money => Self::Money,
            TypeId::MoneyN => match width {
                4 => Self::SmallMoney,
                8 => Self::Money,
                _ => return Err(invalid_width("MONEYN", width)),
            },
            TypeId::DateTime4 => Self::SmallDateTime,
            TypeId::DateTime => Self::DateTime,
            TypeId::DateTimeN => match width {
                4 => Self::SmallDateTime,
                8 => Self::DateTime,
                _ => return Err(invalid_width("DATETIMN", width)),
            },
            TypeId::Decimal | TypeId::DecimalN => Self::Decimal,
            TypeId::Numeric | TypeId::NumericN => Self::Numeric,
            TypeId::Date => Self::Date,
            TypeId::Time => Self::Time,
            TypeId::DateTime2 => Self::DateTime2,
            TypeId::DateTimeOffset => Self::DateTimeOffset,
            TypeId::Char | TypeId::BigChar => Self::Char,
            TypeId::VarChar | TypeId::BigVarChar => Self::VarChar,
            TypeId::Text => Self::Text,
            TypeId::NChar => Self::NChar,
            TypeId::NVarChar => Self::NVarChar,
            TypeId::NText => Self::NText,
            TypeId::Binary | TypeId::BigBinary => Self::Binary,
            TypeId::VarBinary | TypeId::BigVarBinary => Self::VarBinary,
            TypeId::Image => Self::Image,
            TypeId::Guid => Self::UniqueIdentifier,
            TypeId::Xml => Self::Xml,
        };
        Ok(ty)
    }

    /// Lower-case type name as printed by FreeTDS, e.g. `int` or `datetime`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bit => "bit",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Float => "float",
            Self::SmallMoney => "smallmoney",
            Self::Money => "money",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::SmallDateTime => "smalldatetime",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime2 => "datetime2",
            Self::DateTimeOffset => "datetimeoffset",
            Self::Char => "char",
            Self::VarChar => "varchar",
            Self::Text => "text",
            Self::NChar => "nchar",
            Self::NVarChar => "nvarchar",
            Self::NText => "ntext",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
            Self::Image => "image",
            Self::UniqueIdentifier => "uniqueidentifier",
            Self::Xml => "xml",
        }
    }

    /// Whether values of this type decode to text.
    #[must_use]
    pub const fn is_character(self) -> bool {
        matches!(
            self,
            Self::Char | Self::VarChar | Self::Text | Self::NChar | Self::NVarChar | Self::NText
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn invalid_width(type_name: &'static str, width: u32) -> TypeError {
    TypeError::InvalidLength {
        type_name,
        len: width as usize,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_types_resolve_by_width() {
        let resolve = |id, width| {
            SqlType::from_type_info(&TypeInfo::new(id).with_max_length(width)).unwrap()
        };
        assert_eq!(resolve(TypeId::IntN, 1), SqlType::TinyInt);
        assert_eq!(resolve(TypeId::IntN, 8), SqlType::BigInt);
        assert_eq!(resolve(TypeId::FloatN, 8), SqlType::Float);
        assert_eq!(resolve(TypeId::DateTimeN, 4), SqlType::SmallDateTime);
        assert_eq!(resolve(TypeId::MoneyN, 8), SqlType::Money);
    }

    #[test]
    fn test_bad_width_is_rejected() {
        let info = TypeInfo::new(TypeId::IntN).with_max_length(3);
        assert!(matches!(
            SqlType::from_type_info(&info),
            Err(TypeError::InvalidLength { len: 3, .. })
        ));
    }

    #[test]
    fn test_freetds_names() {
        assert_eq!(SqlType::DateTime.to_string(), "datetime");
        assert_eq!(
            SqlType::from_type_info(&TypeInfo::new(TypeId::BigVarChar).with_max_length(10))
                .unwrap()
                .name(),
            "varchar"
        );
        assert!(SqlType::NText.is_character());
        assert!(!SqlType::Image.is_character());
    }
}
