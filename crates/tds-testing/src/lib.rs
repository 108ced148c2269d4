//! # tds-testing
//!
//! Test infrastructure for the TDS client.
//!
//! ## Features
//!
//! - Mock TDS server for end-to-end tests without a database
//! - Scripted per-batch responses, login rejection, silence and disconnects
//! - Fixtures for client configuration and common result sets
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_client::Driver;
//! use tds_testing::fixtures::{config_for, people_table};
//! use tds_testing::MockTdsServer;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockTdsServer::builder()
//!         .with_response("SELECT * FROM people", people_table())
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let mut conn = Driver::new().connect(&config_for(&server)).await.unwrap();
//!     let result = conn.execute("SELECT * FROM people").await.unwrap();
//!     assert_eq!(result.rows().len(), 2);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{
    LATIN1_COLLATION, LoginBehavior, MockColumn, MockResponse, MockServerBuilder,
    MockServerConfig, MockServerError, MockTdsServer, ScalarValue,
};
