//! A logged-in session with one server.

use std::fmt;
use std::time::Duration;

use encoding_rs::Encoding;
use tds_codec::Transport;
use tds_protocol::packet::DEFAULT_PACKET_SIZE;
use tds_protocol::{
    Collation, EnvChange, Login7, PacketType, PreLogin, ServerVersion, SqlBatch, TdsVersion,
};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{Config, Endpoint};
use crate::directory::ServerDirectory;
use crate::error::{Error, Result, TimeoutPhase};
use crate::response::{Response, ResultSet, decode_login_response, decode_response};
use crate::state::ConnectionState;
use crate::statement::Statement;

/// Class at and above which the server ends the session.
const FATAL_CLASS: u8 = 20;

const DEFAULT_APP_NAME: &str = "tds-client";

/// Server reply to a batch whose round trip completed.
pub(crate) struct Outcome {
    pub(crate) result: ResultSet,
    /// The server rejected the batch; the connection is still usable.
    pub(crate) error: Option<Error>,
}

/// A session with one server.
///
/// Created by [`Driver::connect`](crate::Driver::connect). Statements borrow
/// the connection mutably, so only one request is ever in flight.
pub struct Connection {
    transport: Option<Transport<TcpStream>>,
    state: ConnectionState,
    host: String,
    port: u16,
    charset: &'static Encoding,
    command_timeout: Duration,
    tds_version: TdsVersion,
    server_name: Option<String>,
    server_version: Option<ServerVersion>,
    database: Option<String>,
    packet_size: usize,
    collation: Option<Collation>,
    transaction_descriptor: u64,
}

impl Connection {
    /// Resolve, dial and log in.
    pub(crate) async fn connect(
        config: &Config,
        directory: Option<&ServerDirectory>,
    ) -> Result<Self> {
        let endpoint = config.resolve(directory)?;
        tracing::info!(
            host = %endpoint.host,
            port = endpoint.port,
            database = ?config.database,
            "connecting to server"
        );

        let mut conn = timeout(
            config.timeouts.login_timeout,
            Self::dial_and_login(config, &endpoint),
        )
        .await
        .map_err(|_| Error::Timeout(TimeoutPhase::Login))??;
        conn.state = ConnectionState::Ready;

        if let Some(size) = endpoint.text_size {
            conn.execute(&format!("SET TEXTSIZE {size}")).await?;
        }
        Ok(conn)
    }

    /// Open the socket and run the handshake. The caller bounds the whole
    /// exchange by the login timeout; the dial alone also honors the
    /// connect timeout.
    async fn dial_and_login(config: &Config, endpoint: &Endpoint) -> Result<Self> {
        let transport = timeout(
            config.timeouts.connect_timeout,
            tds_codec::connect(&endpoint.host, endpoint.port),
        )
        .await
        .map_err(|_| Error::Timeout(TimeoutPhase::Connect))?
        .map_err(|e| {
            Error::Connection(format!(
                "cannot connect to {}:{}: {e}",
                endpoint.host, endpoint.port
            ))
        })?;

        let mut conn = Self {
            transport: Some(transport),
            state: ConnectionState::Authenticating,
            host: endpoint.host.clone(),
            port: endpoint.port,
            charset: endpoint.charset,
            command_timeout: config.timeouts.command_timeout,
            tds_version: endpoint.tds_version,
            server_name: None,
            server_version: None,
            database: None,
            packet_size: DEFAULT_PACKET_SIZE,
            collation: None,
            transaction_descriptor: 0,
        };
        conn.login(config, endpoint).await?;
        Ok(conn)
    }

    async fn login(&mut self, config: &Config, endpoint: &Endpoint) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;

        let prelogin = PreLogin::new(endpoint.tds_version);
        tracing::debug!(encryption = ?prelogin.encryption, "sending PreLogin");
        transport
            .send_message(PacketType::PreLogin, prelogin.encode())
            .await?;

        let reply = transport.read_message().await?;
        let server = PreLogin::decode(&reply.payload)?;
        tracing::debug!(
            encryption = ?server.encryption,
            server_version = ?server.server_version,
            "PreLogin response received"
        );
        if !server.encryption.allows_plaintext() {
            return Err(Error::Connection(format!(
                "server requires encryption ({:?}), which this client does not support",
                server.encryption
            )));
        }

        let login = build_login7(config, endpoint);
        tracing::debug!(
            username = %login.username,
            server_name = %login.server_name,
            version = %login.tds_version,
            "sending Login7"
        );
        transport
            .send_message(PacketType::Tds7Login, login.encode())
            .await?;

        let reply = transport.read_message().await?;
        let response = decode_login_response(reply.payload, endpoint.tds_version, self.charset)?;
        self.apply_env_changes(&response);

        if let Some(ref err) = response.error {
            return Err(Error::login_failed(err));
        }
        let Some(ack) = response.login_ack else {
            return Err(Error::Connection(if response.done_error {
                "login rejected by server".into()
            } else {
                "server did not acknowledge login".into()
            }));
        };
        if response.done_error {
            return Err(Error::Connection("login rejected by server".into()));
        }

        self.tds_version = ack.tds_version.min(endpoint.tds_version);
        tracing::info!(
            version = %self.tds_version,
            server = %ack.prog_name,
            server_version = %ack.prog_version,
            "login acknowledged"
        );
        self.server_name = Some(ack.prog_name);
        self.server_version = Some(ack.prog_version);
        Ok(())
    }

    /// Build a statement; nothing is sent until it is executed.
    pub fn statement(&mut self, sql: impl Into<String>) -> Statement<'_> {
        Statement::new(self, sql.into())
    }

    /// Execute `sql` and return its results.
    pub async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let outcome = self.run(sql).await?;
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(outcome.result),
        }
    }

    /// Shut the session down. Later statements fail.
    ///
    /// Closing always succeeds: the socket is released even when the peer
    /// is already gone, and shutdown errors are only logged. Closing twice
    /// is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "error while closing connection");
            }
            tracing::debug!(host = %self.host, "connection closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send one batch and read its complete response under the command
    /// timeout.
    pub(crate) async fn run(&mut self, sql: &str) -> Result<Outcome> {
        self.ensure_ready()?;
        match timeout(self.command_timeout, self.round_trip(sql)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "connection failed");
                self.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.command_timeout, "statement timed out");
                self.state = ConnectionState::Failed;
                Err(Error::Timeout(TimeoutPhase::Command))
            }
        }
    }

    async fn round_trip(&mut self, sql: &str) -> Result<Outcome> {
        let payload = SqlBatch::new(sql)
            .with_transaction(self.transaction_descriptor)
            .encode(self.tds_version);

        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.send_message(PacketType::SqlBatch, payload).await?;
        let message = transport.read_message().await?;
        if message.packet_type != PacketType::TabularResult {
            return Err(Error::Decode(format!(
                "expected tabular result, got {:?}",
                message.packet_type
            )));
        }

        let response = decode_response(message.payload, self.tds_version, self.charset)?;
        self.apply_env_changes(&response);

        let error = match response.error {
            Some(ref msg) if msg.class >= FATAL_CLASS => {
                return Err(Error::Connection(format!(
                    "fatal server error {} (class {}): {}",
                    msg.number, msg.class, msg.message
                )));
            }
            Some(ref msg) => Some(Error::statement(msg)),
            None if response.done_error => Some(Error::Statement {
                number: 0,
                class: 0,
                state: 0,
                message: "statement failed without a server message".into(),
                server: None,
                procedure: None,
                line: 0,
            }),
            None => None,
        };

        Ok(Outcome {
            result: response.result,
            error,
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Disconnected => {
                Err(Error::Connection("the connection is closed".into()))
            }
            ConnectionState::Failed => Err(Error::Connection(
                "the connection failed and must be discarded".into(),
            )),
            ConnectionState::Authenticating => {
                Err(Error::Connection("login has not completed".into()))
            }
        }
    }

    fn apply_env_changes(&mut self, response: &Response) {
        for change in &response.env_changes {
            self.apply_env_change(change);
        }
    }

    fn apply_env_change(&mut self, change: &EnvChange) {
        match change {
            EnvChange::Database { new, .. } => {
                tracing::debug!(database = %new, "database changed");
                self.database = Some(new.clone());
            }
            EnvChange::PacketSize { new, .. } => {
                let size = *new as usize;
                if let Some(transport) = self.transport.as_mut() {
                    transport.set_packet_size(size);
                    self.packet_size = transport.packet_size();
                }
            }
            EnvChange::Collation(collation) => self.collation = *collation,
            EnvChange::BeginTransaction(descriptor) => {
                tracing::debug!(descriptor, "transaction started");
                self.transaction_descriptor = *descriptor;
            }
            EnvChange::CommitTransaction | EnvChange::RollbackTransaction => {
                tracing::debug!("transaction ended");
                self.transaction_descriptor = 0;
            }
            EnvChange::Language { .. } | EnvChange::Charset { .. } | EnvChange::Other(_) => {}
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether statements can be executed.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    /// Negotiated TDS version.
    #[must_use]
    pub fn tds_version(&self) -> TdsVersion {
        self.tds_version
    }

    /// Server program name from LOGINACK.
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Server program version from LOGINACK.
    #[must_use]
    pub fn server_version(&self) -> Option<ServerVersion> {
        self.server_version
    }

    /// Current database as last reported by the server.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Default collation of the current database.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    /// Whether a transaction is open on the server.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction_descriptor != 0
    }

    /// Host dialed.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port dialed.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client character set for text without a collation code page.
    #[must_use]
    pub fn charset(&self) -> &'static Encoding {
        self.charset
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("tds_version", &self.tds_version)
            .field("database", &self.database)
            .field("packet_size", &self.packet_size)
            .finish_non_exhaustive()
    }
}

fn build_login7(config: &Config, endpoint: &Endpoint) -> Login7 {
    let mut login = Login7::new()
        .with_tds_version(endpoint.tds_version)
        .with_packet_size(config.packet_size.unwrap_or(DEFAULT_PACKET_SIZE as u32))
        .with_app_name(config.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME))
        .with_server_name(&endpoint.server_name)
        .with_hostname(client_hostname())
        .with_sql_auth(
            config.username.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
        );

    if let Some(ref database) = config.database {
        login = login.with_database(database);
    }
    login
}

fn client_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}
