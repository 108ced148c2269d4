//! Mock TDS server for tests.
//!
//! The server speaks just enough of the protocol to drive the client end
//! to end without a database:
//!
//! - PRELOGIN with a configurable encryption answer
//! - LOGIN7 with optional credential checks, rejection or silence
//! - SQL batches answered from a table of scripted responses
//!
//! Responses are encoded with the TDS version negotiated at login, so the
//! same script exercises both the 7.0/7.1 and the 7.2+ token layouts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_testing::mock_server::{MockColumn, MockResponse, MockTdsServer, ScalarValue};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockTdsServer::builder()
//!         .with_response(
//!             "SELECT id FROM t",
//!             MockResponse::rows(vec![MockColumn::int("id")], vec![vec![ScalarValue::Int(1)]]),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect your client to addr...
//! }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use tds_codec::{CodecError, Transport};
use tds_protocol::{
    Collation, ColMetaData, ColumnData, ColumnFlags, Done, DoneStatus, EncryptionLevel, EnvChange,
    Login7, LoginAck, PacketType, PreLogin, ServerMessage, ServerVersion, SqlBatch, TdsVersion,
    TokenType, TypeId, TypeInfo, ValueLength,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

/// `SQL_Latin1_General_CP1_CI_AS`.
pub const LATIN1_COLLATION: Collation = Collation {
    info: 0x00D0_0409,
    sort_id: 52,
};

const SERVER_NAME: &str = "MockTdsServer";
const CUR_CMD_SELECT: u16 = 0xC1;
const CUR_CMD_UPDATE: u16 = 0xC5;
const PLP_TERMINATOR: u32 = 0;
/// Days from 0001-01-01 to 1900-01-01.
const DAYS_TO_1900: i32 = 693_596;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error on the client connection.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The client sent something out of sequence or undecodable.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<tds_protocol::ProtocolError> for MockServerError {
    fn from(e: tds_protocol::ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Scripted answer to one SQL batch.
#[derive(Clone)]
pub enum MockResponse {
    /// One result set.
    Rows {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data, one value per column.
        rows: Vec<Vec<ScalarValue>>,
    },

    /// DML completion with a row count.
    RowsAffected(u64),

    /// Completion without a count, as for DDL.
    Done,

    /// ERROR token followed by a DONE with the error bit.
    Error {
        /// Error number.
        number: i32,
        /// Error message.
        message: String,
        /// Severity class.
        class: u8,
    },

    /// INFO token followed by a DONE.
    Info {
        /// Message number.
        number: i32,
        /// Message text.
        message: String,
        /// Severity class, 0 for PRINT output.
        class: u8,
    },

    /// RETURNSTATUS followed by a DONEPROC.
    ReturnStatus(i32),

    /// ENVCHANGE followed by a DONE.
    EnvChange(EnvChange),

    /// Several responses in one message; DONE tokens carry the MORE bit
    /// except the last.
    Batch(Vec<MockResponse>),

    /// Pre-encoded token stream.
    Raw(Bytes),

    /// Read the batch and never answer.
    Silent,

    /// Close the socket instead of answering.
    Disconnect,

    /// Compute the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Done => f.write_str("Done"),
            Self::Error {
                number,
                message,
                class,
            } => f
                .debug_struct("Error")
                .field("number", number)
                .field("message", message)
                .field("class", class)
                .finish(),
            Self::Info {
                number,
                message,
                class,
            } => f
                .debug_struct("Info")
                .field("number", number)
                .field("message", message)
                .field("class", class)
                .finish(),
            Self::ReturnStatus(v) => f.debug_tuple("ReturnStatus").field(v).finish(),
            Self::EnvChange(env) => f.debug_tuple("EnvChange").field(env).finish(),
            Self::Batch(parts) => f.debug_tuple("Batch").field(parts).finish(),
            Self::Raw(data) => f.debug_tuple("Raw").field(&data.len()).finish(),
            Self::Silent => f.write_str("Silent"),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A result set.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// A single unnamed INT.
    pub fn scalar_int(value: i32) -> Self {
        Self::rows(vec![MockColumn::int("")], vec![vec![ScalarValue::Int(value)]])
    }

    /// A single unnamed NVARCHAR.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self::rows(
            vec![MockColumn::nvarchar("", 4000)],
            vec![vec![ScalarValue::String(value.into())]],
        )
    }

    /// A DML completion.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// A class 16 error.
    pub fn error(number: i32, message: impl Into<String>) -> Self {
        Self::Error {
            number,
            message: message.into(),
            class: 16,
        }
    }

    /// A PRINT message.
    pub fn print(message: impl Into<String>) -> Self {
        Self::Info {
            number: 0,
            message: message.into(),
            class: 0,
        }
    }

    /// Compute the response from the SQL text.
    pub fn custom(f: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

/// Value in a scripted row. The column decides the wire framing.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// NULL value.
    Null,
    /// BIT.
    Bool(bool),
    /// TINYINT.
    TinyInt(u8),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Float(f32),
    /// FLOAT.
    Double(f64),
    /// Text; UTF-16 in NVARCHAR columns, Windows-1252 in VARCHAR columns.
    String(String),
    /// Binary data.
    Binary(Vec<u8>),
    /// DATETIME.
    DateTime(NaiveDateTime),
}

impl ScalarValue {
    /// Unframed value bytes as they appear for a column of `type_id`.
    fn data(&self, type_id: TypeId) -> Option<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Self::Null => return None,
            Self::Bool(v) => buf.put_u8(u8::from(*v)),
            Self::TinyInt(v) => buf.put_u8(*v),
            Self::SmallInt(v) => buf.put_i16_le(*v),
            Self::Int(v) => buf.put_i32_le(*v),
            Self::BigInt(v) => buf.put_i64_le(*v),
            Self::Float(v) => buf.put_f32_le(*v),
            Self::Double(v) => buf.put_f64_le(*v),
            Self::String(s) if type_id.is_ansi_text() => {
                let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(s);
                buf.put_slice(&encoded);
            }
            Self::String(s) => {
                for unit in s.encode_utf16() {
                    buf.put_u16_le(unit);
                }
            }
            Self::Binary(data) => buf.put_slice(data),
            Self::DateTime(dt) => {
                let days = dt.date().num_days_from_ce() - DAYS_TO_1900;
                let millis = u64::from(dt.num_seconds_from_midnight()) * 1000
                    + u64::from(dt.nanosecond() / 1_000_000);
                buf.put_i32_le(days);
                buf.put_u32_le(((millis * 300 + 500) / 1000) as u32);
            }
        }
        Some(buf.freeze())
    }
}

/// Column of a scripted result set.
#[derive(Debug, Clone)]
pub struct MockColumn {
    /// Name and type as sent in COLMETADATA.
    pub data: ColumnData,
}

impl MockColumn {
    /// A nullable column of the given type.
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self {
            data: ColumnData::new(name, type_info),
        }
    }

    /// INT.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::IntN).with_max_length(4))
    }

    /// BIGINT.
    pub fn bigint(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::IntN).with_max_length(8))
    }

    /// SMALLINT.
    pub fn smallint(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::IntN).with_max_length(2))
    }

    /// TINYINT.
    pub fn tinyint(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::IntN).with_max_length(1))
    }

    /// BIT.
    pub fn bit(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::BitN).with_max_length(1))
    }

    /// REAL.
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::FloatN).with_max_length(4))
    }

    /// FLOAT.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::FloatN).with_max_length(8))
    }

    /// DATETIME.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::new(TypeId::DateTimeN).with_max_length(8))
    }

    /// NVARCHAR(`chars`).
    pub fn nvarchar(name: impl Into<String>, chars: u32) -> Self {
        Self::new(
            name,
            TypeInfo::new(TypeId::NVarChar)
                .with_max_length(chars * 2)
                .with_collation(LATIN1_COLLATION),
        )
    }

    /// NVARCHAR(MAX).
    pub fn nvarchar_max(name: impl Into<String>) -> Self {
        Self::new(
            name,
            TypeInfo::new(TypeId::NVarChar)
                .with_max_length(0xFFFF)
                .with_collation(LATIN1_COLLATION),
        )
    }

    /// VARCHAR(`len`) in a Latin-1 collation.
    pub fn varchar(name: impl Into<String>, len: u32) -> Self {
        Self::new(
            name,
            TypeInfo::new(TypeId::BigVarChar)
                .with_max_length(len)
                .with_collation(LATIN1_COLLATION),
        )
    }

    /// VARBINARY(`len`).
    pub fn varbinary(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, TypeInfo::new(TypeId::BigVarBinary).with_max_length(len))
    }

    /// Clear the nullable flag.
    pub fn not_null(mut self) -> Self {
        self.data.flags.remove(ColumnFlags::NULLABLE);
        self
    }

    fn encode_value(&self, dst: &mut BytesMut, value: &ScalarValue) {
        let type_info = &self.data.type_info;
        let data = value.data(type_info.type_id);
        match (type_info.value_length(), data) {
            (ValueLength::Fixed(_), Some(data)) => dst.put_slice(&data),
            (ValueLength::Fixed(size), None) => dst.put_bytes(0, size),
            (ValueLength::Byte, Some(data)) => {
                dst.put_u8(data.len() as u8);
                dst.put_slice(&data);
            }
            (ValueLength::Byte, None) => dst.put_u8(0),
            (ValueLength::UShort, Some(data)) => {
                dst.put_u16_le(data.len() as u16);
                dst.put_slice(&data);
            }
            (ValueLength::UShort, None) => dst.put_u16_le(0xFFFF),
            (ValueLength::TextPtr, Some(data)) => {
                dst.put_u8(16);
                dst.put_bytes(0, 16);
                dst.put_bytes(0, 8);
                dst.put_u32_le(data.len() as u32);
                dst.put_slice(&data);
            }
            (ValueLength::TextPtr, None) => dst.put_u8(0),
            (ValueLength::Plp, Some(data)) => {
                dst.put_u64_le(data.len() as u64);
                if !data.is_empty() {
                    dst.put_u32_le(data.len() as u32);
                    dst.put_slice(&data);
                }
                dst.put_u32_le(PLP_TERMINATOR);
            }
            (ValueLength::Plp, None) => dst.put_u64_le(u64::MAX),
        }
    }
}

/// How the server answers LOGIN7.
#[derive(Debug, Clone, Default)]
pub enum LoginBehavior {
    /// Acknowledge the login.
    #[default]
    Accept,
    /// Send an ERROR and a DONE with the error bit.
    Reject {
        /// Error number.
        number: i32,
        /// Error message.
        message: String,
    },
    /// Read LOGIN7 and never answer.
    Silent,
}

/// Configuration for the mock TDS server.
#[derive(Debug)]
pub struct MockServerConfig {
    /// Scripted responses keyed by normalized SQL text.
    responses: Vec<(String, MockResponse)>,
    /// Response for unmatched batches.
    default_response: MockResponse,
    /// Program name reported in LOGINACK.
    server_name: String,
    /// Program version reported in LOGINACK.
    server_version: ServerVersion,
    /// Highest TDS version the server accepts.
    tds_version: TdsVersion,
    /// Database reported when the client does not ask for one.
    database: String,
    /// PRELOGIN encryption answer.
    encryption: EncryptionLevel,
    /// Required username and password.
    credentials: Option<(String, String)>,
    /// LOGIN7 handling.
    login: LoginBehavior,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            default_response: MockResponse::Done,
            server_name: SERVER_NAME.to_string(),
            server_version: ServerVersion {
                major: 8,
                minor: 0,
                build: 2039,
            },
            tds_version: TdsVersion::V7_4,
            database: "master".to_string(),
            encryption: EncryptionLevel::NotSupported,
            credentials: None,
            login: LoginBehavior::Accept,
        }
    }
}

/// Builder for `MockTdsServer`.
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific SQL batch.
    ///
    /// Matching ignores surrounding whitespace and ASCII case.
    pub fn with_response(mut self, sql: impl AsRef<str>, response: MockResponse) -> Self {
        self.config
            .responses
            .push((normalize_sql(sql.as_ref()), response));
        self
    }

    /// Set the response for unmatched batches.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Set the program name reported in LOGINACK.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the program version reported in LOGINACK.
    pub fn with_server_version(mut self, version: ServerVersion) -> Self {
        self.config.server_version = version;
        self
    }

    /// Cap the negotiated TDS version.
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.config.tds_version = version;
        self
    }

    /// Set the default database.
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.config.database = db.into();
        self
    }

    /// Set the PRELOGIN encryption answer.
    pub fn with_encryption(mut self, level: EncryptionLevel) -> Self {
        self.config.encryption = level;
        self
    }

    /// Reject logins that do not use these credentials with error 18456.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set how LOGIN7 is answered.
    pub fn with_login(mut self, behavior: LoginBehavior) -> Self {
        self.config.login = behavior;
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockTdsServer> {
        MockTdsServer::start(self.config).await
    }
}

#[derive(Debug, Default)]
struct ServerStats {
    active: usize,
    accepted: usize,
    batches: Vec<String>,
}

/// A mock TDS server for testing.
///
/// Listens on an ephemeral loopback port until dropped.
pub struct MockTdsServer {
    /// Server address.
    addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// Connection counters and received batches.
    stats: Arc<Mutex<ServerStats>>,
}

impl MockTdsServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let stats = Arc::new(Mutex::new(ServerStats::default()));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            stats: stats.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let config = config.clone();
                                let stats = stats.clone();
                                tokio::spawn(async move {
                                    {
                                        let mut s = stats.lock().await;
                                        s.active += 1;
                                        s.accepted += 1;
                                    }
                                    if let Err(e) = handle_connection(stream, &config, &stats).await {
                                        tracing::debug!(%peer, error = %e, "mock connection ended");
                                    }
                                    let mut s = stats.lock().await;
                                    s.active = s.active.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections currently open.
    pub async fn connection_count(&self) -> usize {
        self.stats.lock().await.active
    }

    /// Connections accepted since start.
    pub async fn accepted_count(&self) -> usize {
        self.stats.lock().await.accepted
    }

    /// SQL text of every batch received, in arrival order.
    pub async fn received_batches(&self) -> Vec<String> {
        self.stats.lock().await.batches.clone()
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl fmt::Debug for MockTdsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTdsServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Drop for MockTdsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve one client until it disconnects.
async fn handle_connection(
    stream: TcpStream,
    config: &MockServerConfig,
    stats: &Mutex<ServerStats>,
) -> Result<()> {
    let mut transport = Transport::new(stream);

    let prelogin = transport.read_message().await?;
    if prelogin.packet_type != PacketType::PreLogin {
        return Err(MockServerError::Protocol(format!(
            "Expected PreLogin, got {:?}",
            prelogin.packet_type
        )));
    }
    let client = PreLogin::decode(&prelogin.payload)?;
    let reply = PreLogin {
        version: TdsVersion::new(0x0800_07F7),
        encryption: config.encryption,
        ..PreLogin::default()
    };
    transport
        .send_message(PacketType::PreLogin, reply.encode())
        .await?;
    if !config.encryption.allows_plaintext() {
        // A real server would start TLS here.
        tracing::debug!(client = ?client.encryption, "encryption demanded, dropping client");
        return Ok(());
    }

    let login = transport.read_message().await?;
    if login.packet_type != PacketType::Tds7Login {
        return Err(MockServerError::Protocol(format!(
            "Expected Tds7Login, got {:?}",
            login.packet_type
        )));
    }
    let login = Login7::decode(&login.payload)?;
    let version = login.tds_version.min(config.tds_version);

    let Some((payload, accepted)) = login_response(&login, config, version) else {
        // Keep the socket open until the client gives up.
        let _ = transport.read_message().await;
        return Ok(());
    };
    transport
        .send_message(PacketType::TabularResult, payload)
        .await?;
    if !accepted {
        return Ok(());
    }
    transport.set_packet_size(login.packet_size as usize);

    loop {
        let message = match transport.read_message().await {
            Ok(m) => m,
            Err(CodecError::ConnectionClosed) => break,
            Err(e) => return Err(e.into()),
        };

        match message.packet_type {
            PacketType::SqlBatch => {
                let batch = SqlBatch::decode(&message.payload, version)?;
                stats.lock().await.batches.push(batch.sql.clone());

                match find_response(&batch.sql, config) {
                    MockResponse::Silent => {
                        tracing::debug!(sql = %batch.sql, "withholding response");
                    }
                    MockResponse::Disconnect => return Ok(()),
                    response => {
                        let mut buf = BytesMut::new();
                        encode_response(&mut buf, &response, version, false);
                        transport
                            .send_message(PacketType::TabularResult, buf.freeze())
                            .await?;
                    }
                }
            }
            other => {
                tracing::debug!("Unexpected packet type: {:?}", other);
            }
        }
    }

    Ok(())
}

/// Token stream answering LOGIN7, and whether the login succeeded.
/// `None` means the server stays silent.
fn login_response(
    login: &Login7,
    config: &MockServerConfig,
    version: TdsVersion,
) -> Option<(Bytes, bool)> {
    let rejection = match &config.login {
        LoginBehavior::Silent => return None,
        LoginBehavior::Reject { number, message } => Some((*number, message.clone())),
        LoginBehavior::Accept => config
            .credentials
            .as_ref()
            .filter(|(user, password)| *user != login.username || *password != login.password)
            .map(|_| {
                (
                    18456,
                    format!("Login failed for user '{}'.", login.username),
                )
            }),
    };

    let mut buf = BytesMut::new();
    if let Some((number, message)) = rejection {
        server_message(number, 14, &message, &config.server_name).encode(
            &mut buf,
            TokenType::Error,
            version,
        );
        encode_done(&mut buf, DoneStatus::ERROR, 0, 0, version);
        return Some((buf.freeze(), false));
    }

    let database = if login.database.is_empty() {
        config.database.clone()
    } else {
        login.database.clone()
    };
    EnvChange::Database {
        new: database.clone(),
        old: "master".to_string(),
    }
    .encode(&mut buf);
    server_message(
        5701,
        10,
        &format!("Changed database context to '{database}'."),
        &config.server_name,
    )
    .encode(&mut buf, TokenType::Info, version);
    if version.has_collations() {
        EnvChange::Collation(Some(LATIN1_COLLATION)).encode(&mut buf);
    }
    EnvChange::PacketSize {
        new: login.packet_size,
        old: login.packet_size,
    }
    .encode(&mut buf);
    LoginAck {
        interface: 1,
        tds_version: login_ack_version(version),
        prog_name: config.server_name.clone(),
        prog_version: config.server_version,
    }
    .encode(&mut buf);
    encode_done(&mut buf, DoneStatus::empty(), 0, 0, version);
    Some((buf.freeze(), true))
}

/// Old servers acknowledge 7.0 and 7.1 with their pre-7.2 spellings.
fn login_ack_version(version: TdsVersion) -> TdsVersion {
    if version == TdsVersion::V7_0 {
        TdsVersion::new(0x0700_0000)
    } else if version == TdsVersion::V7_1 {
        TdsVersion::new(0x0701_0000)
    } else {
        version
    }
}

fn server_message(number: i32, class: u8, message: &str, server: &str) -> ServerMessage {
    ServerMessage {
        number,
        state: 1,
        class,
        message: message.to_string(),
        server: server.to_string(),
        procedure: String::new(),
        line: 1,
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.trim().to_ascii_uppercase()
}

/// Find the response for a SQL batch.
fn find_response(sql: &str, config: &MockServerConfig) -> MockResponse {
    let normalized = normalize_sql(sql);
    let response = config
        .responses
        .iter()
        .find(|(key, _)| *key == normalized)
        .map_or_else(|| config.default_response.clone(), |(_, r)| r.clone());

    match response {
        MockResponse::Custom(f) => f(sql),
        other => other,
    }
}

/// Append the tokens for `response`. `more` sets the MORE bit on the
/// final DONE.
fn encode_response(dst: &mut BytesMut, response: &MockResponse, version: TdsVersion, more: bool) {
    let more_bit = if more {
        DoneStatus::MORE
    } else {
        DoneStatus::empty()
    };

    match response {
        MockResponse::Rows { columns, rows } => {
            ColMetaData {
                columns: columns.iter().map(|c| c.data.clone()).collect(),
            }
            .encode(dst, version);
            for row in rows {
                dst.put_u8(TokenType::Row as u8);
                for (column, value) in columns.iter().zip(row) {
                    column.encode_value(dst, value);
                }
            }
            encode_done(
                dst,
                DoneStatus::COUNT | more_bit,
                CUR_CMD_SELECT,
                rows.len() as u64,
                version,
            );
        }
        MockResponse::RowsAffected(count) => {
            encode_done(dst, DoneStatus::COUNT | more_bit, CUR_CMD_UPDATE, *count, version);
        }
        MockResponse::Done => encode_done(dst, more_bit, 0, 0, version),
        MockResponse::Error {
            number,
            message,
            class,
        } => {
            server_message(*number, *class, message, SERVER_NAME).encode(
                dst,
                TokenType::Error,
                version,
            );
            encode_done(dst, DoneStatus::ERROR | more_bit, 0, 0, version);
        }
        MockResponse::Info {
            number,
            message,
            class,
        } => {
            server_message(*number, *class, message, SERVER_NAME).encode(
                dst,
                TokenType::Info,
                version,
            );
            encode_done(dst, more_bit, 0, 0, version);
        }
        MockResponse::ReturnStatus(value) => {
            dst.put_u8(TokenType::ReturnStatus as u8);
            dst.put_i32_le(*value);
            Done {
                status: more_bit,
                cur_cmd: 0,
                row_count: 0,
            }
            .encode(dst, TokenType::DoneProc, version);
        }
        MockResponse::EnvChange(env) => {
            env.encode(dst);
            encode_done(dst, more_bit, 0, 0, version);
        }
        MockResponse::Batch(parts) => {
            let last = parts.len().saturating_sub(1);
            for (i, part) in parts.iter().enumerate() {
                encode_response(dst, part, version, more || i < last);
            }
        }
        MockResponse::Raw(data) => dst.extend_from_slice(data),
        MockResponse::Custom(f) => encode_response(dst, &f(""), version, more),
        MockResponse::Silent | MockResponse::Disconnect => {}
    }
}

fn encode_done(
    dst: &mut BytesMut,
    status: DoneStatus,
    cur_cmd: u16,
    row_count: u64,
    version: TdsVersion,
) {
    Done {
        status,
        cur_cmd,
        row_count,
    }
    .encode(dst, TokenType::Done, version);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tds_protocol::{Token, TokenParser};

    fn tokens(response: &MockResponse, version: TdsVersion) -> Vec<Token> {
        let mut buf = BytesMut::new();
        encode_response(&mut buf, response, version, false);
        let mut parser = TokenParser::new(buf.freeze(), version);
        let mut out = Vec::new();
        while let Some(token) = parser.next_token().unwrap() {
            out.push(token);
        }
        out
    }

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockTdsServer::builder()
            .with_server_name("TestServer")
            .build()
            .await
            .unwrap();

        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.connection_count().await, 0);
    }

    #[test]
    fn test_rows_encode_as_metadata_rows_and_done() {
        let response = MockResponse::rows(
            vec![MockColumn::int("id"), MockColumn::nvarchar("name", 10)],
            vec![
                vec![ScalarValue::Int(1), ScalarValue::String("a".into())],
                vec![ScalarValue::Int(2), ScalarValue::Null],
            ],
        );
        let tokens = tokens(&response, TdsVersion::V7_4);
        assert_eq!(tokens.len(), 4);
        assert!(matches!(&tokens[0], Token::ColMetaData(m) if m.len() == 2));
        match &tokens[2] {
            Token::Row(row) => {
                assert_eq!(row.values[0].as_deref(), Some(&2i32.to_le_bytes()[..]));
                assert_eq!(row.values[1], None);
            }
            other => panic!("expected row, got {other:?}"),
        }
        match &tokens[3] {
            Token::Done(done) => assert_eq!(done.count(), Some(2)),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_version_framing_decodes() {
        let response = MockResponse::Batch(vec![
            MockResponse::error(208, "Invalid object name 'x'."),
            MockResponse::affected(3),
        ]);
        let tokens = tokens(&response, TdsVersion::V7_0);
        assert!(matches!(&tokens[0], Token::Error(m) if m.number == 208 && m.line == 1));
        assert!(matches!(&tokens[1], Token::Done(d) if d.is_error() && d.has_more()));
        assert!(matches!(&tokens[2], Token::Done(d) if d.count() == Some(3) && !d.has_more()));
    }

    #[test]
    fn test_varchar_and_plp_values() {
        let response = MockResponse::rows(
            vec![MockColumn::varchar("v", 20), MockColumn::nvarchar_max("m")],
            vec![vec![
                ScalarValue::String("café".into()),
                ScalarValue::String("long".into()),
            ]],
        );
        let tokens = tokens(&response, TdsVersion::V7_4);
        match &tokens[1] {
            Token::Row(row) => {
                assert_eq!(row.values[0].as_deref(), Some(&b"caf\xe9"[..]));
                assert_eq!(row.values[1].as_ref().map(|v| v.len()), Some(8));
            }
            other => panic!("expected row, got {other:?}"),
        }
    }

    #[test]
    fn test_datetime_value_bytes() {
        let dt = NaiveDate::from_ymd_opt(1900, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        let data = ScalarValue::DateTime(dt).data(TypeId::DateTimeN).unwrap();
        assert_eq!(&data[..4], &1i32.to_le_bytes());
        assert_eq!(&data[4..], &300u32.to_le_bytes());
    }

    #[test]
    fn test_find_response_ignores_case_and_whitespace() {
        let config = MockServerBuilder::new()
            .with_response("select 1", MockResponse::scalar_int(1))
            .config;
        assert!(matches!(
            find_response("  SELECT 1\n", &config),
            MockResponse::Rows { .. }
        ));
        assert!(matches!(find_response("SELECT 2", &config), MockResponse::Done));
    }

    #[test]
    fn test_custom_response_sees_sql() {
        let config = MockServerBuilder::new()
            .with_default_response(MockResponse::custom(|sql| {
                MockResponse::affected(sql.len() as u64)
            }))
            .config;
        assert!(matches!(
            find_response("abc", &config),
            MockResponse::RowsAffected(3)
        ));
    }

    #[test]
    fn test_login_rejection_with_wrong_password() {
        let config = MockServerBuilder::new().with_credentials("sa", "pw").config;
        let login = Login7::new().with_sql_auth("sa", "nope");
        let (payload, accepted) = login_response(&login, &config, TdsVersion::V7_4).unwrap();
        assert!(!accepted);
        let mut parser = TokenParser::new(payload, TdsVersion::V7_4);
        match parser.next_token().unwrap() {
            Some(Token::Error(msg)) => assert_eq!(msg.number, 18456),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_login_ack_uses_legacy_spelling() {
        assert_eq!(login_ack_version(TdsVersion::V7_0).raw(), 0x0700_0000);
        assert_eq!(login_ack_version(TdsVersion::V7_1).raw(), 0x0701_0000);
        assert_eq!(login_ack_version(TdsVersion::V7_4), TdsVersion::V7_4);
    }
}
