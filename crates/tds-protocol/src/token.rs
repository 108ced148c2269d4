//! Tabular result token stream.
//!
//! A server response is a sequence of tokens, each introduced by a type
//! byte. Row tokens are only decodable against the most recent
//! COLMETADATA, so [`TokenParser`] keeps that metadata between calls.
//!
//! Row values are returned with their framing removed: length prefixes are
//! stripped, text pointers skipped and PLP chunks joined. Turning those
//! bytes into typed values is left to the caller.

use std::sync::Arc;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ensure, read_b_varchar, read_us_varchar, write_b_varchar, write_us_varchar};
use crate::collation::Collation;
use crate::error::ProtocolError;
use crate::types::{ColumnFlags, TypeId, ValueLength};
use crate::version::{ServerVersion, TdsVersion};

const PLP_NULL: u64 = u64::MAX;
const PLP_UNKNOWN_LEN: u64 = u64::MAX - 1;
const NO_METADATA: u16 = 0xFFFF;

/// Token type bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Offset of keywords in the batch (legacy browse mode).
    Offset = 0x78,
    /// Stored procedure return status.
    ReturnStatus = 0x79,
    /// Column metadata.
    ColMetaData = 0x81,
    /// Table names for browse mode.
    TabName = 0xA4,
    /// Column info for browse mode.
    ColInfo = 0xA5,
    /// ORDER BY column list.
    Order = 0xA9,
    /// Error message.
    Error = 0xAA,
    /// Informational message.
    Info = 0xAB,
    /// Login acknowledgement.
    LoginAck = 0xAD,
    /// Feature extension acknowledgement.
    FeatureExtAck = 0xAE,
    /// Row data.
    Row = 0xD1,
    /// Row data with a null bitmap.
    NbcRow = 0xD2,
    /// Environment change.
    EnvChange = 0xE3,
    /// Statement completion.
    Done = 0xFD,
    /// Stored procedure completion.
    DoneProc = 0xFE,
    /// Completion of a statement inside a procedure.
    DoneInProc = 0xFF,
}

impl TokenType {
    /// Create a token type from its wire byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x78 => Self::Offset,
            0x79 => Self::ReturnStatus,
            0x81 => Self::ColMetaData,
            0xA4 => Self::TabName,
            0xA5 => Self::ColInfo,
            0xA9 => Self::Order,
            0xAA => Self::Error,
            0xAB => Self::Info,
            0xAD => Self::LoginAck,
            0xAE => Self::FeatureExtAck,
            0xD1 => Self::Row,
            0xD2 => Self::NbcRow,
            0xE3 => Self::EnvChange,
            0xFD => Self::Done,
            0xFE => Self::DoneProc,
            0xFF => Self::DoneInProc,
            _ => return None,
        })
    }
}

/// A decoded token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Column metadata for the rows that follow.
    ColMetaData(Arc<ColMetaData>),
    /// One row, from either ROW or NBCROW.
    Row(RawRow),
    /// Statement completion.
    Done(Done),
    /// Stored procedure completion.
    DoneProc(Done),
    /// Completion of a statement inside a procedure.
    DoneInProc(Done),
    /// Stored procedure return status.
    ReturnStatus(i32),
    /// Error message.
    Error(ServerMessage),
    /// Informational message.
    Info(ServerMessage),
    /// Login acknowledgement.
    LoginAck(LoginAck),
    /// Environment change.
    EnvChange(EnvChange),
    /// ORDER BY column numbers.
    Order(Vec<u16>),
    /// Acknowledged feature extensions as `(feature id, data)`.
    FeatureExtAck(Vec<(u8, Bytes)>),
}

// =============================================================================
// Column metadata
// =============================================================================

/// Type description of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Wire type.
    pub type_id: TypeId,
    /// Declared maximum length in bytes; the fixed width for fixed types.
    pub max_length: u32,
    /// Decimal precision.
    pub precision: u8,
    /// Decimal scale, or fractional-second scale for time types.
    pub scale: u8,
    /// Collation of character data.
    pub collation: Option<Collation>,
}

impl TypeInfo {
    /// Type info with no length, precision or collation.
    #[must_use]
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            max_length: type_id.fixed_size().map_or(0, |n| n as u32),
            precision: 0,
            scale: 0,
            collation: None,
        }
    }

    /// Set the declared maximum length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set precision and scale.
    #[must_use]
    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Set the collation.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Row value framing for this column.
    #[must_use]
    pub fn value_length(&self) -> ValueLength {
        self.type_id.value_length(self.max_length)
    }

    /// Decode the type byte and its type-specific description.
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        ensure(src, 1, "column type")?;
        let raw = src.get_u8();
        let type_id = TypeId::from_u8(raw).ok_or(ProtocolError::UnsupportedDataType(raw))?;
        let mut info = Self::new(type_id);

        match type_id {
            _ if type_id.fixed_size().is_some() => {}
            TypeId::Date => {}
            TypeId::IntN
            | TypeId::BitN
            | TypeId::FloatN
            | TypeId::MoneyN
            | TypeId::DateTimeN
            | TypeId::Guid
            | TypeId::Char
            | TypeId::VarChar
            | TypeId::Binary
            | TypeId::VarBinary => {
                ensure(src, 1, "column length")?;
                info.max_length = u32::from(src.get_u8());
            }
            TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                ensure(src, 3, "decimal type info")?;
                info.max_length = u32::from(src.get_u8());
                info.precision = src.get_u8();
                info.scale = src.get_u8();
            }
            TypeId::BigVarChar
            | TypeId::BigChar
            | TypeId::BigVarBinary
            | TypeId::BigBinary
            | TypeId::NVarChar
            | TypeId::NChar => {
                ensure(src, 2, "column length")?;
                info.max_length = u32::from(src.get_u16_le());
            }
            TypeId::Text | TypeId::NText | TypeId::Image => {
                ensure(src, 4, "column length")?;
                info.max_length = src.get_u32_le();
            }
            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                ensure(src, 1, "time scale")?;
                info.scale = src.get_u8();
            }
            TypeId::Xml => {
                ensure(src, 1, "xml schema flag")?;
                if src.get_u8() != 0 {
                    read_b_varchar(src)?;
                    read_b_varchar(src)?;
                    read_us_varchar(src)?;
                }
            }
            _ => return Err(ProtocolError::UnsupportedDataType(raw)),
        }

        if type_id.has_collation() && version.has_collations() {
            info.collation = Some(Collation::decode(src)?);
        }

        Ok(info)
    }

    /// Encode the type byte and its description.
    pub fn encode(&self, dst: &mut impl BufMut, version: TdsVersion) {
        dst.put_u8(self.type_id as u8);
        match self.value_length() {
            ValueLength::Fixed(_) => {}
            ValueLength::Byte => match self.type_id {
                TypeId::Date => {}
                TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => dst.put_u8(self.scale),
                TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                    dst.put_u8(self.max_length as u8);
                    dst.put_u8(self.precision);
                    dst.put_u8(self.scale);
                }
                _ => dst.put_u8(self.max_length as u8),
            },
            ValueLength::UShort => dst.put_u16_le(self.max_length as u16),
            ValueLength::TextPtr => dst.put_u32_le(self.max_length),
            ValueLength::Plp if self.type_id == TypeId::Xml => dst.put_u8(0),
            ValueLength::Plp => dst.put_u16_le(0xFFFF),
        }
        if self.type_id.has_collation() && version.has_collations() {
            self.collation.unwrap_or_default().encode(dst);
        }
    }
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnData {
    /// Column name; empty for unnamed expressions.
    pub name: String,
    /// User type id.
    pub user_type: u32,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Type description.
    pub type_info: TypeInfo,
    /// Owning table name parts, sent for TEXT, NTEXT and IMAGE columns.
    pub table_name: Vec<String>,
}

impl ColumnData {
    /// Column with the given name and type, nullable.
    #[must_use]
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            user_type: 0,
            flags: ColumnFlags::NULLABLE,
            type_info,
            table_name: Vec::new(),
        }
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }

    fn has_table_name(&self) -> bool {
        matches!(
            self.type_info.type_id,
            TypeId::Text | TypeId::NText | TypeId::Image
        )
    }

    /// Decode one column description.
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        let user_type = if version.requires_all_headers() {
            ensure(src, 4, "column user type")?;
            src.get_u32_le()
        } else {
            ensure(src, 2, "column user type")?;
            u32::from(src.get_u16_le())
        };
        ensure(src, 2, "column flags")?;
        let flags = ColumnFlags::from_bits_retain(src.get_u16_le());
        let type_info = TypeInfo::decode(src, version)?;

        let mut column = Self {
            name: String::new(),
            user_type,
            flags,
            type_info,
            table_name: Vec::new(),
        };

        if column.has_table_name() {
            if version.requires_all_headers() {
                ensure(src, 1, "table name parts")?;
                let parts = src.get_u8();
                for _ in 0..parts {
                    column.table_name.push(read_us_varchar(src)?);
                }
            } else {
                column.table_name.push(read_us_varchar(src)?);
            }
        }

        column.name = read_b_varchar(src)?;
        Ok(column)
    }

    /// Encode one column description.
    pub fn encode(&self, dst: &mut impl BufMut, version: TdsVersion) {
        if version.requires_all_headers() {
            dst.put_u32_le(self.user_type);
        } else {
            dst.put_u16_le(self.user_type as u16);
        }
        dst.put_u16_le(self.flags.bits());
        self.type_info.encode(dst, version);
        if self.has_table_name() {
            if version.requires_all_headers() {
                dst.put_u8(self.table_name.len() as u8);
                for part in &self.table_name {
                    write_us_varchar(dst, part);
                }
            } else {
                write_us_varchar(dst, &self.table_name.join("."));
            }
        }
        write_b_varchar(dst, &self.name);
    }
}

/// COLMETADATA token body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColMetaData {
    /// Column descriptions in result order.
    pub columns: Vec<ColumnData>,
}

impl ColMetaData {
    /// Decode the token body (after the type byte).
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        ensure(src, 2, "column count")?;
        let count = src.get_u16_le();
        if count == NO_METADATA {
            return Ok(Self::default());
        }
        let columns = (0..count)
            .map(|_| ColumnData::decode(src, version))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    /// Encode the token including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut, version: TdsVersion) {
        dst.put_u8(TokenType::ColMetaData as u8);
        dst.put_u16_le(self.columns.len() as u16);
        for column in &self.columns {
            column.encode(dst, version);
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A row as unframed value bytes; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Column values in metadata order.
    pub values: Vec<Option<Bytes>>,
}

impl RawRow {
    /// Decode a ROW token body.
    pub fn decode(src: &mut Bytes, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let values = metadata
            .columns
            .iter()
            .map(|col| read_value(src, &col.type_info))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    /// Decode an NBCROW token body: a null bitmap then the non-NULL values.
    pub fn decode_nbc(src: &mut Bytes, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let bitmap_len = metadata.len().div_ceil(8);
        ensure(src, bitmap_len, "null bitmap")?;
        let bitmap = src.copy_to_bytes(bitmap_len);

        let values = metadata
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    Ok(None)
                } else {
                    read_value(src, &col.type_info)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }
}

fn read_value(src: &mut Bytes, info: &TypeInfo) -> Result<Option<Bytes>, ProtocolError> {
    match info.value_length() {
        ValueLength::Fixed(n) => {
            ensure(src, n, "fixed-length value")?;
            Ok(Some(src.copy_to_bytes(n)))
        }
        ValueLength::Byte => {
            ensure(src, 1, "value length")?;
            let len = src.get_u8() as usize;
            if len == 0 {
                return Ok(None);
            }
            if info.type_id.has_exact_length() && len as u32 != info.max_length {
                return Err(ProtocolError::InvalidField {
                    field: "value length",
                    value: len as u64,
                });
            }
            ensure(src, len, "value")?;
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueLength::UShort => {
            ensure(src, 2, "value length")?;
            let len = src.get_u16_le();
            if len == 0xFFFF {
                return Ok(None);
            }
            let len = len as usize;
            ensure(src, len, "value")?;
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueLength::TextPtr => read_text_ptr_value(src),
        ValueLength::Plp => read_plp_value(src),
    }
}

fn read_text_ptr_value(src: &mut Bytes) -> Result<Option<Bytes>, ProtocolError> {
    ensure(src, 1, "text pointer length")?;
    let ptr_len = src.get_u8() as usize;
    if ptr_len == 0 {
        return Ok(None);
    }
    // pointer, 8-byte timestamp, 4-byte data length
    ensure(src, ptr_len + 12, "text pointer")?;
    src.advance(ptr_len + 8);
    let len = src.get_u32_le() as usize;
    ensure(src, len, "text value")?;
    Ok(Some(src.copy_to_bytes(len)))
}

fn read_plp_value(src: &mut Bytes) -> Result<Option<Bytes>, ProtocolError> {
    ensure(src, 8, "PLP length")?;
    let total = src.get_u64_le();
    if total == PLP_NULL {
        return Ok(None);
    }
    let capacity = if total == PLP_UNKNOWN_LEN {
        0
    } else {
        (total as usize).min(src.remaining())
    };
    let mut value = BytesMut::with_capacity(capacity);
    loop {
        ensure(src, 4, "PLP chunk length")?;
        let chunk = src.get_u32_le() as usize;
        if chunk == 0 {
            break;
        }
        ensure(src, chunk, "PLP chunk")?;
        value.extend_from_slice(&src[..chunk]);
        src.advance(chunk);
    }
    if total != PLP_UNKNOWN_LEN && value.len() as u64 != total {
        return Err(ProtocolError::InvalidField {
            field: "PLP total length",
            value: total,
        });
    }
    Ok(Some(value.freeze()))
}

// =============================================================================
// DONE
// =============================================================================

bitflags! {
    /// DONE token status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DoneStatus: u16 {
        /// More results follow.
        const MORE = 0x0001;
        /// The statement failed.
        const ERROR = 0x0002;
        /// A transaction is in progress.
        const IN_XACT = 0x0004;
        /// The row count is valid.
        const COUNT = 0x0010;
        /// Acknowledges an attention.
        const ATTN = 0x0020;
        /// A server error terminated the statement.
        const SRVERROR = 0x0100;
    }
}

/// DONE, DONEPROC and DONEINPROC body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Done {
    /// Status bits.
    pub status: DoneStatus,
    /// Token of the completed command.
    pub cur_cmd: u16,
    /// Affected row count, valid when `COUNT` is set.
    pub row_count: u64,
}

impl Done {
    /// Completion of the final statement with no count.
    #[must_use]
    pub const fn final_done() -> Self {
        Self {
            status: DoneStatus::empty(),
            cur_cmd: 0,
            row_count: 0,
        }
    }

    /// Completion with a valid row count.
    #[must_use]
    pub fn with_count(row_count: u64) -> Self {
        Self {
            status: DoneStatus::COUNT,
            cur_cmd: 0,
            row_count,
        }
    }

    /// Whether more results follow.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Whether the statement failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status
            .intersects(DoneStatus::ERROR | DoneStatus::SRVERROR)
    }

    /// The affected row count if the server flagged it as valid.
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        self.status
            .contains(DoneStatus::COUNT)
            .then_some(self.row_count)
    }

    /// Decode the body; the row count is four bytes before TDS 7.2.
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        let wide = version.requires_all_headers();
        ensure(src, if wide { 12 } else { 8 }, "DONE")?;
        let status = DoneStatus::from_bits_retain(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = if wide {
            src.get_u64_le()
        } else {
            u64::from(src.get_u32_le())
        };
        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the token with the given type byte.
    pub fn encode(&self, dst: &mut impl BufMut, token: TokenType, version: TdsVersion) {
        dst.put_u8(token as u8);
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le(self.cur_cmd);
        if version.requires_all_headers() {
            dst.put_u64_le(self.row_count);
        } else {
            dst.put_u32_le(self.row_count as u32);
        }
    }
}

// =============================================================================
// ERROR / INFO
// =============================================================================

/// Body shared by ERROR and INFO tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// State.
    pub state: u8,
    /// Severity class; 10 and below is informational.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Procedure name, empty for batches.
    pub procedure: String,
    /// Line number in the batch or procedure.
    pub line: u32,
}

impl ServerMessage {
    /// Decode the body; the line number is two bytes before TDS 7.2.
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        ensure(src, 2, "message length")?;
        let length = src.get_u16_le() as usize;
        ensure(src, length, "message")?;
        let mut body = src.copy_to_bytes(length);

        ensure(&body, 6, "message header")?;
        let number = body.get_i32_le();
        let state = body.get_u8();
        let class = body.get_u8();
        let message = read_us_varchar(&mut body)?;
        let server = read_b_varchar(&mut body)?;
        let procedure = read_b_varchar(&mut body)?;
        // Servers older than 7.2 send the short form during login even when
        // the client asked for a newer version, so the body length decides.
        let line = if version.requires_all_headers() && body.remaining() >= 4 {
            body.get_u32_le()
        } else {
            ensure(&body, 2, "message line")?;
            u32::from(body.get_u16_le())
        };

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Encode as an ERROR or INFO token.
    pub fn encode(&self, dst: &mut impl BufMut, token: TokenType, version: TdsVersion) {
        let mut body = BytesMut::new();
        body.put_i32_le(self.number);
        body.put_u8(self.state);
        body.put_u8(self.class);
        write_us_varchar(&mut body, &self.message);
        write_b_varchar(&mut body, &self.server);
        write_b_varchar(&mut body, &self.procedure);
        if version.requires_all_headers() {
            body.put_u32_le(self.line);
        } else {
            body.put_u16_le(self.line as u16);
        }
        dst.put_u8(token as u8);
        dst.put_u16_le(body.len() as u16);
        dst.put_slice(&body);
    }
}

// =============================================================================
// LOGINACK
// =============================================================================

/// Login acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// SQL interface type, 1 for T-SQL.
    pub interface: u8,
    /// Protocol version accepted by the server.
    pub tds_version: TdsVersion,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: ServerVersion,
}

impl LoginAck {
    /// Decode the body. The version fields are big-endian on the wire.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure(src, 2, "LOGINACK length")?;
        let length = src.get_u16_le() as usize;
        ensure(src, length, "LOGINACK")?;
        let mut body = src.copy_to_bytes(length);

        ensure(&body, 5, "LOGINACK header")?;
        let interface = body.get_u8();
        let tds_version = TdsVersion::new(body.get_u32()).normalize();
        let prog_name = read_b_varchar(&mut body)?;
        ensure(&body, 4, "LOGINACK program version")?;
        let mut version = [0u8; 4];
        body.copy_to_slice(&mut version);

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version: ServerVersion::from_login_ack(version),
        })
    }

    /// Encode the token including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut body = BytesMut::new();
        body.put_u8(self.interface);
        body.put_u32(self.tds_version.raw());
        write_b_varchar(&mut body, &self.prog_name);
        body.put_u8(self.prog_version.major);
        body.put_u8(self.prog_version.minor);
        body.put_u16(self.prog_version.build);
        dst.put_u8(TokenType::LoginAck as u8);
        dst.put_u16_le(body.len() as u16);
        dst.put_slice(&body);
    }
}

// =============================================================================
// ENVCHANGE
// =============================================================================

/// Environment change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// Current database changed.
    Database {
        /// New database.
        new: String,
        /// Previous database.
        old: String,
    },
    /// Session language changed.
    Language {
        /// New language.
        new: String,
        /// Previous language.
        old: String,
    },
    /// Server character set changed.
    Charset {
        /// New character set.
        new: String,
        /// Previous character set.
        old: String,
    },
    /// Negotiated packet size.
    PacketSize {
        /// New packet size.
        new: u32,
        /// Previous packet size.
        old: u32,
    },
    /// Default collation of the current database.
    Collation(Option<Collation>),
    /// A transaction started.
    BeginTransaction(u64),
    /// The transaction committed.
    CommitTransaction,
    /// The transaction rolled back.
    RollbackTransaction,
    /// Any change this client does not act on.
    Other(u8),
}

impl EnvChange {
    /// Decode the body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure(src, 2, "ENVCHANGE length")?;
        let length = src.get_u16_le() as usize;
        ensure(src, length, "ENVCHANGE")?;
        let mut body = src.copy_to_bytes(length);

        ensure(&body, 1, "ENVCHANGE type")?;
        let kind = body.get_u8();
        let change = match kind {
            1 | 2 | 3 => {
                let new = read_b_varchar(&mut body)?;
                let old = read_b_varchar(&mut body)?;
                match kind {
                    1 => Self::Database { new, old },
                    2 => Self::Language { new, old },
                    _ => Self::Charset { new, old },
                }
            }
            4 => {
                let new = parse_packet_size(&read_b_varchar(&mut body)?)?;
                let old = parse_packet_size(&read_b_varchar(&mut body)?).unwrap_or(0);
                Self::PacketSize { new, old }
            }
            7 => Self::Collation(Collation::from_bytes(&read_b_varbyte(&mut body)?)),
            8 => {
                let descriptor = read_b_varbyte(&mut body)?;
                let mut src = descriptor.as_ref();
                ensure(&src, 8, "transaction descriptor")?;
                Self::BeginTransaction(src.get_u64_le())
            }
            9 => Self::CommitTransaction,
            10 => Self::RollbackTransaction,
            other => Self::Other(other),
        };
        Ok(change)
    }

    /// Encode the token including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut body = BytesMut::new();
        match self {
            Self::Database { new, old } => encode_strings(&mut body, 1, new, old),
            Self::Language { new, old } => encode_strings(&mut body, 2, new, old),
            Self::Charset { new, old } => encode_strings(&mut body, 3, new, old),
            Self::PacketSize { new, old } => {
                encode_strings(&mut body, 4, &new.to_string(), &old.to_string());
            }
            Self::Collation(collation) => {
                body.put_u8(7);
                match collation {
                    Some(c) => {
                        body.put_u8(5);
                        c.encode(&mut body);
                    }
                    None => body.put_u8(0),
                }
                body.put_u8(0);
            }
            Self::BeginTransaction(descriptor) => {
                body.put_u8(8);
                body.put_u8(8);
                body.put_u64_le(*descriptor);
                body.put_u8(0);
            }
            Self::CommitTransaction | Self::RollbackTransaction => {
                body.put_u8(if matches!(self, Self::CommitTransaction) { 9 } else { 10 });
                body.put_u8(0);
                body.put_u8(0);
            }
            Self::Other(kind) => {
                body.put_u8(*kind);
                body.put_u8(0);
                body.put_u8(0);
            }
        }
        dst.put_u8(TokenType::EnvChange as u8);
        dst.put_u16_le(body.len() as u16);
        dst.put_slice(&body);
    }
}

fn encode_strings(body: &mut BytesMut, kind: u8, new: &str, old: &str) {
    body.put_u8(kind);
    write_b_varchar(body, new);
    write_b_varchar(body, old);
}

fn parse_packet_size(s: &str) -> Result<u32, ProtocolError> {
    s.trim()
        .parse()
        .map_err(|_| ProtocolError::StringEncoding(format!("packet size {s:?}")))
}

fn read_b_varbyte(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    ensure(src, 1, "B_VARBYTE length")?;
    let len = src.get_u8() as usize;
    ensure(src, len, "B_VARBYTE")?;
    Ok(src.copy_to_bytes(len))
}

// =============================================================================
// Parser
// =============================================================================

/// Incremental token reader over one complete server message.
#[derive(Debug)]
pub struct TokenParser {
    data: Bytes,
    version: TdsVersion,
    metadata: Option<Arc<ColMetaData>>,
    awaiting_login_ack: bool,
}

impl TokenParser {
    /// Parse `data` using the framing rules of `version`.
    #[must_use]
    pub fn new(data: Bytes, version: TdsVersion) -> Self {
        Self {
            data,
            version,
            metadata: None,
            awaiting_login_ack: false,
        }
    }

    /// Parse the reply to LOGIN7, where `version` is only what the client
    /// asked for.
    ///
    /// Until LOGINACK arrives a DONE token too short for the 7.2+ layout is
    /// read with the 4-byte row count, since an older server rejecting the
    /// login never announces its own version.
    #[must_use]
    pub fn for_login(data: Bytes, version: TdsVersion) -> Self {
        Self {
            awaiting_login_ack: true,
            ..Self::new(data, version)
        }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Metadata applied to the next row token.
    #[must_use]
    pub fn metadata(&self) -> Option<&Arc<ColMetaData>> {
        self.metadata.as_ref()
    }

    /// Switch framing rules, e.g. once LOGINACK settles the version.
    pub fn set_version(&mut self, version: TdsVersion) {
        self.version = version;
    }

    /// Decode the next token, or `None` at the end of the message.
    ///
    /// Browse-mode tokens (COLINFO, TABNAME, OFFSET) are skipped. An
    /// unknown token byte is an error since its length cannot be known.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        loop {
            if self.data.is_empty() {
                return Ok(None);
            }
            let raw = self.data.get_u8();
            let token_type = TokenType::from_u8(raw).ok_or(ProtocolError::InvalidTokenType(raw))?;
            let src = &mut self.data;
            let version = self.version;

            let token = match token_type {
                TokenType::ColMetaData => {
                    let meta = Arc::new(ColMetaData::decode(src, version)?);
                    self.metadata = Some(Arc::clone(&meta));
                    Token::ColMetaData(meta)
                }
                TokenType::Row | TokenType::NbcRow => {
                    let meta = self
                        .metadata
                        .as_ref()
                        .ok_or(ProtocolError::MissingColumnMetadata)?;
                    if token_type == TokenType::Row {
                        Token::Row(RawRow::decode(src, meta)?)
                    } else {
                        Token::Row(RawRow::decode_nbc(src, meta)?)
                    }
                }
                TokenType::Done | TokenType::DoneProc | TokenType::DoneInProc => {
                    let version = if self.awaiting_login_ack
                        && version.requires_all_headers()
                        && src.remaining() < 12
                    {
                        TdsVersion::V7_1
                    } else {
                        version
                    };
                    let done = Done::decode(src, version)?;
                    match token_type {
                        TokenType::Done => Token::Done(done),
                        TokenType::DoneProc => Token::DoneProc(done),
                        _ => Token::DoneInProc(done),
                    }
                }
                TokenType::ReturnStatus => {
                    ensure(src, 4, "RETURNSTATUS")?;
                    Token::ReturnStatus(src.get_i32_le())
                }
                TokenType::Error => Token::Error(ServerMessage::decode(src, version)?),
                TokenType::Info => Token::Info(ServerMessage::decode(src, version)?),
                TokenType::LoginAck => {
                    self.awaiting_login_ack = false;
                    Token::LoginAck(LoginAck::decode(src)?)
                }
                TokenType::EnvChange => Token::EnvChange(EnvChange::decode(src)?),
                TokenType::Order => {
                    ensure(src, 2, "ORDER length")?;
                    let len = src.get_u16_le() as usize;
                    ensure(src, len, "ORDER")?;
                    let mut body = src.copy_to_bytes(len);
                    let mut columns = Vec::with_capacity(len / 2);
                    while body.remaining() >= 2 {
                        columns.push(body.get_u16_le());
                    }
                    Token::Order(columns)
                }
                TokenType::FeatureExtAck => Token::FeatureExtAck(decode_feature_ext_ack(src)?),
                TokenType::ColInfo | TokenType::TabName | TokenType::Offset => {
                    skip_length_prefixed(src, token_type)?;
                    continue;
                }
            };
            return Ok(Some(token));
        }
    }
}

fn skip_length_prefixed(src: &mut Bytes, token_type: TokenType) -> Result<(), ProtocolError> {
    ensure(src, 2, "token length")?;
    let len = src.get_u16_le() as usize;
    if token_type == TokenType::Offset {
        // OFFSET is fixed: identifier then offset, both u16
        ensure(src, 2, "OFFSET")?;
        src.advance(2);
        return Ok(());
    }
    ensure(src, len, "token body")?;
    src.advance(len);
    Ok(())
}

fn decode_feature_ext_ack(src: &mut Bytes) -> Result<Vec<(u8, Bytes)>, ProtocolError> {
    let mut features = Vec::new();
    loop {
        ensure(src, 1, "feature id")?;
        let id = src.get_u8();
        if id == 0xFF {
            return Ok(features);
        }
        ensure(src, 4, "feature data length")?;
        let len = src.get_u32_le() as usize;
        ensure(src, len, "feature data")?;
        features.push((id, src.copy_to_bytes(len)));
    }
}
