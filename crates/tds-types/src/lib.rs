//! # tds-types
//!
//! Decoding of TDS column values into Rust types.
//!
//! | SQL type | [`SqlValue`] variant | Rust type |
//! |----------|----------------------|-----------|
//! | `BIT` | `Bool` | `bool` |
//! | `TINYINT` | `TinyInt` | `u8` |
//! | `SMALLINT` / `INT` / `BIGINT` | `SmallInt` / `Int` / `BigInt` | `i16` / `i32` / `i64` |
//! | `REAL` / `FLOAT` | `Float` / `Double` | `f32` / `f64` |
//! | `DECIMAL` / `NUMERIC` / `MONEY` / `SMALLMONEY` | `Decimal` | `rust_decimal::Decimal` |
//! | `CHAR` / `VARCHAR` / `TEXT` / `NCHAR` / `NVARCHAR` / `NTEXT` | `String` | `String` |
//! | `BINARY` / `VARBINARY` / `IMAGE` | `Binary` | `bytes::Bytes` |
//! | `DATETIME` / `SMALLDATETIME` / `DATETIME2` | `DateTime` | `chrono::NaiveDateTime` |
//! | `DATE` / `TIME` | `Date` / `Time` | `chrono::NaiveDate` / `chrono::NaiveTime` |
//! | `DATETIMEOFFSET` | `DateTimeOffset` | `chrono::DateTime<FixedOffset>` |
//! | `UNIQUEIDENTIFIER` | `Uuid` | `uuid::Uuid` |
//! | `XML` | `Xml` | `String` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod error;
pub mod from_sql;
pub mod sql_type;
pub mod value;

pub use decode::{decode_utf16_string, decode_value};
pub use error::{Result, TypeError};
pub use from_sql::FromSql;
pub use sql_type::SqlType;
pub use value::SqlValue;
