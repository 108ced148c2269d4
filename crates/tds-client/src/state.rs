//! Runtime connection and statement states.
//!
//! ## Connection transitions
//!
//! ```text
//! Disconnected -> Authenticating (socket open, PRELOGIN sent)
//! Authenticating -> Ready (LOGINACK received)
//! Authenticating -> Failed (login rejected, timeout, socket error)
//! Ready -> Failed (timeout, socket error, fatal server error)
//! Ready -> Disconnected (close())
//! ```
//!
//! A statement error leaves the connection Ready.

/// State of a [`Connection`](crate::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session, either before login or after `close()`.
    #[default]
    Disconnected,
    /// Socket open, login in progress.
    Authenticating,
    /// Logged in and idle.
    Ready,
    /// The session is broken and must be discarded.
    Failed,
}

impl ConnectionState {
    /// Check if statements can be executed.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Lifecycle of a [`Statement`](crate::Statement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementState {
    /// Built, not yet executed, or cleared.
    #[default]
    Inert,
    /// Executed successfully; results are available.
    Executed,
    /// Execution failed; results are empty.
    Failed,
}
