//! Shared fixtures for end-to-end tests.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tds_client::{Config, TimeoutConfig};

use crate::mock_server::{MockColumn, MockResponse, MockTdsServer, ScalarValue};

/// Username the fixtures log in with.
pub const TEST_USER: &str = "sa";
/// Password the fixtures log in with.
pub const TEST_PASSWORD: &str = "Password123";

/// Configuration pointing at `server` with short timeouts.
#[must_use]
pub fn config_for(server: &MockTdsServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .username(TEST_USER)
        .password(TEST_PASSWORD)
        .timeouts(
            TimeoutConfig::new()
                .with_connect_timeout(Duration::from_secs(5))
                .with_login_timeout(Duration::from_secs(5))
                .with_command_timeout(Duration::from_secs(5)),
        )
}

/// Route test output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Creation time used by [`people_table`].
#[must_use]
pub fn created_at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .and_then(|d| d.and_hms_opt(9, 30, 15))
        .unwrap_or_default()
}

/// Two rows of `(id int, name nvarchar(50), score float, created datetime)`.
#[must_use]
pub fn people_table() -> MockResponse {
    MockResponse::rows(
        vec![
            MockColumn::int("id").not_null(),
            MockColumn::nvarchar("name", 50),
            MockColumn::float("score"),
            MockColumn::datetime("created"),
        ],
        vec![
            vec![
                ScalarValue::Int(1),
                ScalarValue::String("Alice".into()),
                ScalarValue::Double(1.75),
                ScalarValue::DateTime(created_at(15)),
            ],
            vec![
                ScalarValue::Int(2),
                ScalarValue::Null,
                ScalarValue::Double(-0.5),
                ScalarValue::DateTime(created_at(16)),
            ],
        ],
    )
}
