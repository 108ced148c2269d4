//! Client error types.

use std::fmt;

use tds_codec::CodecError;
use tds_protocol::{ProtocolError, ServerMessage};
use tds_types::TypeError;
use thiserror::Error;

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Opening the TCP connection.
    Connect,
    /// PRELOGIN and LOGIN7 exchange.
    Login,
    /// Executing a statement.
    Command,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Login => "login",
            Self::Command => "command",
        })
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The configuration was rejected before any I/O.
    Config,
    /// The connection could not be established or was lost.
    Connection,
    /// The server rejected a statement; the connection is still usable.
    Statement,
    /// A deadline expired.
    Timeout,
    /// The server sent bytes that could not be decoded.
    Decode,
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failed or became unusable.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected the login.
    #[error("login failed: {message}")]
    LoginFailed {
        /// Error number.
        number: i32,
        /// Error class/severity.
        class: u8,
        /// Error state.
        state: u8,
        /// Server diagnostic text.
        message: String,
    },

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server rejected a statement.
    #[error("server error {number}: {message}")]
    Statement {
        /// Error number.
        number: i32,
        /// Error class/severity (0-25).
        class: u8,
        /// Error state.
        state: u8,
        /// Error message.
        message: String,
        /// Server name where error occurred.
        server: Option<String>,
        /// Stored procedure name (if applicable).
        procedure: Option<String>,
        /// Line number in the SQL batch or procedure.
        line: u32,
    },

    /// A deadline expired.
    #[error("{0} timed out")]
    Timeout(TimeoutPhase),

    /// Undecodable server response.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) | Self::LoginFailed { .. } | Self::ConnectionClosed | Self::Io(_) => {
                ErrorKind::Connection
            }
            Self::Statement { .. } => ErrorKind::Statement,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Whether the connection that produced this error may be used again.
    #[must_use]
    pub fn is_connection_usable(&self) -> bool {
        self.kind() == ErrorKind::Statement
    }

    /// Check if this is a server error with a specific number.
    #[must_use]
    pub fn is_server_error(&self, number: i32) -> bool {
        match self {
            Self::Statement { number: n, .. } | Self::LoginFailed { number: n, .. } => *n == number,
            _ => false,
        }
    }

    /// Get the error class/severity if the server reported this error.
    ///
    /// SQL Server error classes range from 0-25:
    /// - 0-10: Informational
    /// - 11-16: User errors
    /// - 17-19: Resource/hardware errors
    /// - 20-25: System errors (connection terminating)
    #[must_use]
    pub fn class(&self) -> Option<u8> {
        match self {
            Self::Statement { class, .. } | Self::LoginFailed { class, .. } => Some(*class),
            _ => None,
        }
    }

    pub(crate) fn statement(msg: &ServerMessage) -> Self {
        Self::Statement {
            number: msg.number,
            class: msg.class,
            state: msg.state,
            message: msg.message.clone(),
            server: non_empty(&msg.server),
            procedure: non_empty(&msg.procedure),
            line: msg.line,
        }
    }

    pub(crate) fn login_failed(msg: &ServerMessage) -> Self {
        Self::LoginFailed {
            number: msg.number,
            class: msg.class,
            state: msg.state,
            message: msg.message.clone(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io) => Self::Io(io),
            CodecError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(number: i32, class: u8) -> ServerMessage {
        ServerMessage {
            number,
            state: 1,
            class,
            message: "Invalid object name 'nope'.".into(),
            server: "SRV".into(),
            procedure: String::new(),
            line: 1,
        }
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Connection);
        assert_eq!(
            Error::login_failed(&message(18456, 14)).kind(),
            ErrorKind::Connection
        );
        assert_eq!(Error::statement(&message(208, 16)).kind(), ErrorKind::Statement);
        assert_eq!(
            Error::Timeout(TimeoutPhase::Command).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(Error::Decode("x".into()).kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_only_statement_errors_leave_connection_usable() {
        assert!(Error::statement(&message(208, 16)).is_connection_usable());
        assert!(!Error::Timeout(TimeoutPhase::Login).is_connection_usable());
        assert!(!Error::ConnectionClosed.is_connection_usable());
    }

    #[test]
    fn test_statement_error_fields() {
        let err = Error::statement(&message(208, 16));
        assert!(err.is_server_error(208));
        assert_eq!(err.class(), Some(16));
        match err {
            Error::Statement {
                server, procedure, ..
            } => {
                assert_eq!(server.as_deref(), Some("SRV"));
                assert_eq!(procedure, None);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: Error = CodecError::ConnectionClosed.into();
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err: Error = CodecError::InvalidHeader.into();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = CodecError::Io(io).into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            Error::Timeout(TimeoutPhase::Login).to_string(),
            "login timed out"
        );
    }
}
