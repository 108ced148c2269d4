//! # tds-client
//!
//! Async TDS client for the Sybase / SQL Server family.
//!
//! The client logs in with SQL authentication, sends SQL batches and
//! decodes the first result set of each response into typed rows.
//!
//! ## Lifecycle
//!
//! ```text
//! Driver::connect(config)   -> Connection (Ready)
//! Connection::statement(sql) -> Statement (Inert)
//! Statement::execute()       -> Executed | Failed
//! Connection::close()        -> Disconnected
//! ```
//!
//! A statement error leaves the connection usable. Timeouts, socket errors
//! and undecodable responses leave it Failed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_client::{Config, Driver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_connection_string(
//!         "Server=localhost;Database=test;User Id=sa;Password=Password123;"
//!     )?;
//!
//!     let mut conn = Driver::new().connect(&config).await?;
//!
//!     let mut stmt = conn.statement("SELECT id, name FROM users");
//!     stmt.execute().await?;
//!     for row in stmt.rows() {
//!         let name: String = row.get_by_name("name")?;
//!         println!("User: {}", name);
//!     }
//!
//!     let result = conn.execute("DELETE FROM users WHERE id = 1").await?;
//!     println!("{:?}", result.status());
//!
//!     conn.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod directory;
pub mod driver;
pub mod error;
pub mod response;
pub mod row;
pub mod state;
pub mod statement;

pub use config::{Config, TimeoutConfig};
pub use connection::Connection;
pub use directory::{ServerDirectory, ServerEntry};
pub use driver::Driver;
pub use error::{Error, ErrorKind, Result, TimeoutPhase};
pub use response::{ResultSet, Status};
pub use row::{Column, Row};
pub use state::{ConnectionState, StatementState};
pub use statement::Statement;
pub use tds_protocol::{ServerMessage, ServerVersion, TdsVersion};
pub use tds_types::{FromSql, SqlType, SqlValue};
