//! SQL statements bound to a connection.

use std::sync::Arc;

use tds_protocol::ServerMessage;

use crate::connection::Connection;
use crate::error::Result;
use crate::response::{ResultSet, Status};
use crate::row::{Column, Row};
use crate::state::StatementState;

/// SQL text plus the results of its last execution.
///
/// A statement borrows its connection mutably for its whole life, so it
/// cannot outlive the connection and no other request can interleave.
///
/// ```rust,ignore
/// let mut stmt = conn.statement("SELECT name, id FROM sys.databases");
/// stmt.execute().await?;
/// for row in stmt.rows() {
///     let name: String = row.get_by_name("name")?;
/// }
/// ```
pub struct Statement<'c> {
    connection: &'c mut Connection,
    sql: String,
    state: StatementState,
    result: ResultSet,
}

impl<'c> Statement<'c> {
    pub(crate) fn new(connection: &'c mut Connection, sql: String) -> Self {
        Self {
            connection,
            sql,
            state: StatementState::Inert,
            result: ResultSet::default(),
        }
    }

    /// Send the statement and read its results.
    ///
    /// Previous results are discarded first. When the server rejects the
    /// statement the error is returned, results stay empty and the
    /// diagnostics remain available through [`Statement::errors`].
    pub async fn execute(&mut self) -> Result<()> {
        self.clear();
        let outcome = match self.connection.run(&self.sql).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = StatementState::Failed;
                return Err(e);
            }
        };

        self.result = outcome.result;
        if let Some(e) = outcome.error {
            self.result.clear_table();
            self.state = StatementState::Failed;
            return Err(e);
        }

        tracing::debug!(
            columns = self.result.columns().len(),
            rows = self.result.rows().len(),
            "statement executed"
        );
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Discard results and return to the inert state.
    pub fn clear(&mut self) {
        self.result = ResultSet::default();
        self.state = StatementState::Inert;
    }

    /// Column descriptors of the result set.
    #[must_use]
    pub fn columns(&self) -> &Arc<[Column]> {
        self.result.columns()
    }

    /// Rows of the result set.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        self.result.rows()
    }

    /// Completion status when no result set was returned.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.result.status()
    }

    /// Procedure return value.
    #[must_use]
    pub fn return_status(&self) -> Option<i32> {
        self.result.return_status()
    }

    /// Informational messages from the last execution.
    #[must_use]
    pub fn messages(&self) -> &[ServerMessage] {
        self.result.messages()
    }

    /// Server diagnostics from the last execution.
    #[must_use]
    pub fn errors(&self) -> &[ServerMessage] {
        self.result.errors()
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// The connection this statement runs on.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        self.connection
    }

    /// Take the results, releasing the connection.
    #[must_use]
    pub fn into_result(self) -> ResultSet {
        self.result
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("state", &self.state)
            .field("columns", &self.result.columns().len())
            .field("rows", &self.result.rows().len())
            .finish_non_exhaustive()
    }
}
