//! Conversion of unframed wire values into [`SqlValue`].
//!
//! The protocol layer hands over each column value with its length prefix
//! already stripped, or `None` for NULL. What remains is interpreting the
//! bytes according to the column's type description.

use bytes::Bytes;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use encoding_rs::Encoding;
use rust_decimal::Decimal;
use tds_protocol::{TypeId, TypeInfo};
use uuid::Uuid;

use crate::error::TypeError;
use crate::value::SqlValue;

/// `NaiveDate::num_days_from_ce` of 1900-01-01, the DATETIME epoch.
const DAYS_TO_1900: i32 = 693_596;

const MONEY_SCALE: u32 = 4;

/// Decode one column value.
///
/// Non-Unicode text uses the code page implied by the column collation and
/// falls back to `charset` when the collation names none (TDS 7.0 servers
/// send no collations at all).
pub fn decode_value(
    raw: Option<Bytes>,
    info: &TypeInfo,
    charset: &'static Encoding,
) -> Result<SqlValue, TypeError> {
    let Some(data) = raw else {
        return Ok(SqlValue::Null);
    };

    let value = match info.type_id {
        TypeId::Null => SqlValue::Null,
        TypeId::Bit | TypeId::BitN => SqlValue::Bool(fixed::<1>(&data, "BIT")?[0] != 0),
        TypeId::Int1 | TypeId::Int2 | TypeId::Int4 | TypeId::Int8 | TypeId::IntN => {
            decode_int(&data)?
        }
        TypeId::Float4 | TypeId::Float8 | TypeId::FloatN => decode_float(&data)?,
        TypeId::Money | TypeId::Money4 | TypeId::MoneyN => decode_money(&data)?,
        TypeId::DateTime | TypeId::DateTime4 | TypeId::DateTimeN => decode_datetime(&data)?,
        TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
            decode_decimal(&data, info.scale)?
        }
        TypeId::Guid => SqlValue::Uuid(decode_guid(&data)?),
        TypeId::Char | TypeId::VarChar | TypeId::BigChar | TypeId::BigVarChar | TypeId::Text => {
            let encoding = info
                .collation
                .and_then(|c| c.encoding())
                .unwrap_or(charset);
            SqlValue::String(decode_ansi(&data, encoding))
        }
        TypeId::NChar | TypeId::NVarChar | TypeId::NText => {
            SqlValue::String(decode_utf16_string(&data)?)
        }
        TypeId::Xml => SqlValue::Xml(decode_utf16_string(&data)?),
        TypeId::Binary
        | TypeId::VarBinary
        | TypeId::BigBinary
        | TypeId::BigVarBinary
        | TypeId::Image => SqlValue::Binary(data),
        TypeId::Date => SqlValue::Date(decode_date(&data)?),
        TypeId::Time => SqlValue::Time(decode_time(&data, info.scale)?),
        TypeId::DateTime2 => {
            let (time, date) = split_time(&data, info.scale, 3, "DATETIME2")?;
            SqlValue::DateTime(decode_date(date)?.and_time(decode_time(time, info.scale)?))
        }
        TypeId::DateTimeOffset => decode_datetimeoffset(&data, info.scale)?,
    };
    Ok(value)
}

fn fixed<'a, const N: usize>(data: &'a [u8], type_name: &'static str) -> Result<&'a [u8; N], TypeError> {
    data.try_into().map_err(|_| TypeError::InvalidLength {
        type_name,
        len: data.len(),
    })
}

fn decode_int(data: &[u8]) -> Result<SqlValue, TypeError> {
    Ok(match data.len() {
        1 => SqlValue::TinyInt(data[0]),
        2 => SqlValue::SmallInt(i16::from_le_bytes(*fixed(data, "SMALLINT")?)),
        4 => SqlValue::Int(i32::from_le_bytes(*fixed(data, "INT")?)),
        8 => SqlValue::BigInt(i64::from_le_bytes(*fixed(data, "BIGINT")?)),
        len => {
            return Err(TypeError::InvalidLength {
                type_name: "INTN",
                len,
            });
        }
    })
}

fn decode_float(data: &[u8]) -> Result<SqlValue, TypeError> {
    Ok(match data.len() {
        4 => SqlValue::Float(f32::from_le_bytes(*fixed(data, "REAL")?)),
        8 => SqlValue::Double(f64::from_le_bytes(*fixed(data, "FLOAT")?)),
        len => {
            return Err(TypeError::InvalidLength {
                type_name: "FLTN",
                len,
            });
        }
    })
}

/// MONEY is a 64-bit count of ten-thousandths sent high half first;
/// SMALLMONEY is the 32-bit form.
fn decode_money(data: &[u8]) -> Result<SqlValue, TypeError> {
    let units = match data.len() {
        4 => i64::from(i32::from_le_bytes(*fixed(data, "SMALLMONEY")?)),
        8 => {
            let high = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            let low = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
            (i64::from(high) << 32) | i64::from(low)
        }
        len => {
            return Err(TypeError::InvalidLength {
                type_name: "MONEYN",
                len,
            });
        }
    };
    Ok(SqlValue::Decimal(Decimal::new(units, MONEY_SCALE)))
}

/// DATETIME: days since 1900-01-01 and 1/300 s ticks since midnight.
/// SMALLDATETIME: unsigned days since 1900-01-01 and minutes since midnight.
fn decode_datetime(data: &[u8]) -> Result<SqlValue, TypeError> {
    let (days, millis) = match data.len() {
        8 => {
            let days = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            let ticks = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
            // round to the nearest millisecond, as the server does when printing
            (days, (u64::from(ticks) * 1000 + 150) / 300)
        }
        4 => {
            let days = u16::from_le_bytes([data[0], data[1]]);
            let minutes = u16::from_le_bytes([data[2], data[3]]);
            (i32::from(days), u64::from(minutes) * 60_000)
        }
        len => {
            return Err(TypeError::InvalidLength {
                type_name: "DATETIMN",
                len,
            });
        }
    };

    let date = days
        .checked_add(DAYS_TO_1900)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day offset {days}")))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (millis / 1000) as u32,
        ((millis % 1000) * 1_000_000) as u32,
    )
    .ok_or_else(|| TypeError::InvalidDateTime(format!("{millis} ms past midnight")))?;

    Ok(SqlValue::DateTime(NaiveDateTime::new(date, time)))
}

/// Sign byte (1 is positive) then a little-endian magnitude of 4 to 16 bytes.
fn decode_decimal(data: &[u8], scale: u8) -> Result<SqlValue, TypeError> {
    let Some((&sign, magnitude)) = data.split_first() else {
        return Err(TypeError::InvalidLength {
            type_name: "DECIMAL",
            len: 0,
        });
    };
    if magnitude.len() > 16 {
        return Err(TypeError::InvalidLength {
            type_name: "DECIMAL",
            len: data.len(),
        });
    }

    let mut bytes = [0u8; 16];
    bytes[..magnitude.len()].copy_from_slice(magnitude);
    let mantissa = i128::try_from(u128::from_le_bytes(bytes))
        .map_err(|_| TypeError::OutOfRange { target_type: "Decimal" })?;
    let mantissa = if sign == 0 { -mantissa } else { mantissa };

    Decimal::try_from_i128_with_scale(mantissa, u32::from(scale))
        .map(SqlValue::Decimal)
        .map_err(|_| TypeError::OutOfRange { target_type: "Decimal" })
}

/// UNIQUEIDENTIFIER stores its first three groups little-endian.
fn decode_guid(data: &[u8]) -> Result<Uuid, TypeError> {
    let bytes = fixed::<16>(data, "UNIQUEIDENTIFIER")?;
    Ok(Uuid::from_bytes_le(*bytes))
}

/// Undecodable bytes become U+FFFD rather than failing the row.
fn decode_ansi(data: &[u8], encoding: &'static Encoding) -> String {
    encoding.decode_without_bom_handling(data).0.into_owned()
}

/// Decode UTF-16LE text.
pub fn decode_utf16_string(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(
            "UTF-16 data must have even length".to_string(),
        ));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

/// DATE: three little-endian bytes counting days since 0001-01-01.
fn decode_date(data: &[u8]) -> Result<NaiveDate, TypeError> {
    let bytes = fixed::<3>(data, "DATE")?;
    let days = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    NaiveDate::from_num_days_from_ce_opt(days + 1)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("date offset {days}")))
}

fn time_len(scale: u8) -> Result<usize, TypeError> {
    match scale {
        0..=2 => Ok(3),
        3..=4 => Ok(4),
        5..=7 => Ok(5),
        _ => Err(TypeError::InvalidDateTime(format!("time scale {scale}"))),
    }
}

/// TIME: `10^-scale` second units since midnight in 3 to 5 bytes.
fn decode_time(data: &[u8], scale: u8) -> Result<NaiveTime, TypeError> {
    if data.len() != time_len(scale)? {
        return Err(TypeError::InvalidLength {
            type_name: "TIME",
            len: data.len(),
        });
    }
    let mut bytes = [0u8; 8];
    bytes[..data.len()].copy_from_slice(data);
    let units = u64::from_le_bytes(bytes);

    let nanos = units * 10u64.pow(9 - u32::from(scale));
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
    .ok_or_else(|| TypeError::InvalidDateTime(format!("{units} units at scale {scale}")))
}

/// Split a value into its leading TIME part and the `rest` bytes after it.
fn split_time<'a>(
    data: &'a [u8],
    scale: u8,
    rest: usize,
    type_name: &'static str,
) -> Result<(&'a [u8], &'a [u8]), TypeError> {
    let time = time_len(scale)?;
    if data.len() != time + rest {
        return Err(TypeError::InvalidLength {
            type_name,
            len: data.len(),
        });
    }
    Ok(data.split_at(time))
}

/// DATETIMEOFFSET: a UTC DATETIME2 followed by the offset in minutes.
fn decode_datetimeoffset(data: &[u8], scale: u8) -> Result<SqlValue, TypeError> {
    let (time, rest) = split_time(data, scale, 5, "DATETIMEOFFSET")?;
    let (date, offset) = rest.split_at(3);
    let utc = decode_date(date)?.and_time(decode_time(time, scale)?);

    let minutes = i16::from_le_bytes([offset[0], offset[1]]);
    let offset = FixedOffset::east_opt(i32::from(minutes) * 60)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("offset {minutes} minutes")))?;
    Ok(SqlValue::DateTimeOffset(offset.from_utc_datetime(&utc)))
}
