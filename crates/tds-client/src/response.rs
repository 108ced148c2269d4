//! Turning a tabular response message into results.
//!
//! One response may hold several result sets, row counts, diagnostics and
//! environment changes. Only the first result set is kept; later ones are
//! still decoded so the stream stays in sync, then dropped with a warning.

use std::sync::Arc;

use bytes::Bytes;
use encoding_rs::Encoding;
use tds_protocol::{
    ColMetaData, Done, EnvChange, LoginAck, ServerMessage, TdsVersion, Token, TokenParser,
};
use tds_types::decode_value;

use crate::error::Result;
use crate::row::{Column, Row};

/// "Changed database context" and "Changed language setting".
const CONTEXT_CHANGE_MESSAGES: [i32; 2] = [5701, 5703];

/// Completion of a statement that produced no result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Affected rows, when the server reported a count.
    pub rows_affected: Option<u64>,
    /// Token of the completed command.
    pub cur_cmd: u16,
}

/// Owned outcome of one statement.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
    status: Option<Status>,
    return_status: Option<i32>,
    messages: Vec<ServerMessage>,
    errors: Vec<ServerMessage>,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
            status: None,
            return_status: None,
            messages: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ResultSet {
    /// Column descriptors; empty when no result set was returned.
    #[must_use]
    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    /// Decoded rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take the rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Completion status; present only when no result set was returned.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Value of a procedure `RETURN`.
    #[must_use]
    pub fn return_status(&self) -> Option<i32> {
        self.return_status
    }

    /// Informational messages (class 0).
    #[must_use]
    pub fn messages(&self) -> &[ServerMessage] {
        &self.messages
    }

    /// Diagnostics of class above 0, excluding context-change notices.
    #[must_use]
    pub fn errors(&self) -> &[ServerMessage] {
        &self.errors
    }

    /// Whether a result set was returned.
    #[must_use]
    pub fn has_table(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Drop columns, rows and status, keeping diagnostics.
    pub(crate) fn clear_table(&mut self) {
        self.columns = Arc::from(Vec::new());
        self.rows.clear();
        self.status = None;
        self.return_status = None;
    }
}

/// Everything read from one response message.
#[derive(Debug, Default)]
pub(crate) struct Response {
    pub(crate) result: ResultSet,
    /// First ERROR token, other than context-change notices.
    pub(crate) error: Option<ServerMessage>,
    /// A DONE token carried the error bit.
    pub(crate) done_error: bool,
    pub(crate) env_changes: Vec<EnvChange>,
    pub(crate) login_ack: Option<LoginAck>,
}

impl Response {
    /// Whether the server reported failure.
    pub(crate) fn failed(&self) -> bool {
        self.error.is_some() || self.done_error
    }
}

struct OpenTable {
    columns: Arc<[Column]>,
    metadata: Arc<ColMetaData>,
    rows: Vec<Row>,
}

/// Decode a complete response message.
pub(crate) fn decode_response(
    payload: Bytes,
    version: TdsVersion,
    charset: &'static Encoding,
) -> Result<Response> {
    decode_tokens(TokenParser::new(payload, version), version, charset)
}

/// Decode the reply to LOGIN7, sent before the server has confirmed which
/// version it speaks.
pub(crate) fn decode_login_response(
    payload: Bytes,
    version: TdsVersion,
    charset: &'static Encoding,
) -> Result<Response> {
    decode_tokens(TokenParser::for_login(payload, version), version, charset)
}

fn decode_tokens(
    mut parser: TokenParser,
    version: TdsVersion,
    charset: &'static Encoding,
) -> Result<Response> {
    let mut response = Response::default();
    let mut table: Option<OpenTable> = None;
    let mut exposed = false;
    let mut discarded = 0usize;

    while let Some(token) = parser.next_token()? {
        match token {
            Token::ColMetaData(meta) => {
                if let Some(open) = table.take() {
                    finish_table(open, &mut response, &mut exposed, &mut discarded);
                }
                if meta.is_empty() {
                    continue;
                }
                let columns = meta
                    .columns
                    .iter()
                    .map(Column::from_metadata)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                tracing::debug!(columns = columns.len(), "received column metadata");
                table = Some(OpenTable {
                    columns: Arc::from(columns),
                    metadata: meta,
                    rows: Vec::new(),
                });
            }
            Token::Row(raw) => {
                // No open table only after zero-column metadata.
                let Some(open) = table.as_mut() else {
                    continue;
                };
                let values = raw
                    .values
                    .into_iter()
                    .zip(&open.metadata.columns)
                    .map(|(value, column)| decode_value(value, &column.type_info, charset))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                open.rows.push(Row::new(Arc::clone(&open.columns), values));
            }
            Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                tracing::debug!(
                    status = ?done.status,
                    cur_cmd = done.cur_cmd,
                    row_count = done.row_count,
                    "done"
                );
                if done.is_error() {
                    response.done_error = true;
                }
                match table.take() {
                    Some(open) => finish_table(open, &mut response, &mut exposed, &mut discarded),
                    None if !exposed => record_status(&mut response.result, &done),
                    None => {}
                }
            }
            Token::Error(msg) => {
                tracing::debug!(
                    number = msg.number,
                    class = msg.class,
                    message = %msg.message,
                    "server error"
                );
                if response.error.is_none() && !is_context_change(&msg) {
                    response.error = Some(msg.clone());
                }
                collect_message(&mut response.result, msg);
            }
            Token::Info(msg) => {
                if msg.class > 0 && !is_context_change(&msg) {
                    tracing::warn!(
                        number = msg.number,
                        class = msg.class,
                        message = %msg.message,
                        "server warning"
                    );
                } else {
                    tracing::debug!(number = msg.number, message = %msg.message, "server info message");
                }
                collect_message(&mut response.result, msg);
            }
            Token::EnvChange(env) => {
                tracing::debug!(change = ?env, "environment change");
                response.env_changes.push(env);
            }
            Token::LoginAck(ack) => {
                // Tokens after LOGINACK use the negotiated framing
                parser.set_version(ack.tds_version.min(version));
                response.login_ack = Some(ack);
            }
            Token::ReturnStatus(value) => {
                response.result.return_status.get_or_insert(value);
            }
            Token::Order(columns) => tracing::trace!(?columns, "order"),
            Token::FeatureExtAck(features) => {
                tracing::debug!(features = features.len(), "feature extension ack");
            }
        }
    }

    if let Some(open) = table.take() {
        finish_table(open, &mut response, &mut exposed, &mut discarded);
    }
    if discarded > 0 {
        tracing::warn!(
            result_sets = discarded,
            "discarded result sets after the first"
        );
    }

    tracing::debug!(
        columns = response.result.columns.len(),
        rows = response.result.rows.len(),
        "response parsed"
    );
    Ok(response)
}

fn finish_table(
    open: OpenTable,
    response: &mut Response,
    exposed: &mut bool,
    discarded: &mut usize,
) {
    if *exposed {
        tracing::debug!(rows = open.rows.len(), "dropping extra result set");
        *discarded += 1;
        return;
    }
    *exposed = true;
    response.result.columns = open.columns;
    response.result.rows = open.rows;
    response.result.status = None;
}

fn record_status(result: &mut ResultSet, done: &Done) {
    let previous = result.status.and_then(|s| s.rows_affected);
    result.status = Some(Status {
        rows_affected: done.count().or(previous),
        cur_cmd: done.cur_cmd,
    });
}

fn is_context_change(msg: &ServerMessage) -> bool {
    CONTEXT_CHANGE_MESSAGES.contains(&msg.number)
}

fn collect_message(result: &mut ResultSet, msg: ServerMessage) {
    if msg.class == 0 {
        result.messages.push(msg);
    } else if !is_context_change(&msg) {
        result.errors.push(msg);
    }
}
