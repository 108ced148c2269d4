//! Statement execution and result decoding against the mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::{BufMut, BytesMut};
use tds_client::{
    Connection, ConnectionState, Driver, Error, ErrorKind, SqlValue, StatementState,
};
use tds_protocol::{EnvChange, TokenType};
use tds_testing::fixtures::{config_for, created_at, init_tracing, people_table};
use tds_testing::{MockColumn, MockResponse, MockServerBuilder, MockTdsServer, ScalarValue};

async fn connect(builder: MockServerBuilder) -> (MockTdsServer, Connection) {
    init_tracing();
    let server = builder.build().await.expect("mock server should start");
    let conn = Driver::new()
        .connect(&config_for(&server))
        .await
        .expect("login should succeed");
    (server, conn)
}

#[tokio::test]
async fn test_select_two_rows_four_columns() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder().with_response("SELECT * FROM people", people_table()),
    )
    .await;

    let mut stmt = conn.statement("SELECT * FROM people");
    assert_eq!(stmt.state(), StatementState::Inert);
    stmt.execute().await.unwrap();
    assert_eq!(stmt.state(), StatementState::Executed);

    assert_eq!(stmt.rows().len(), 2);
    assert_eq!(stmt.columns().len(), 4);
    assert!(stmt.status().is_none());
    for row in stmt.rows() {
        for column in stmt.columns().iter() {
            assert!(row.contains_key(&column.name), "missing key {}", column.name);
        }
    }

    let names: Vec<_> = stmt.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "score", "created"]);
    assert_eq!(stmt.columns()[0].type_name(), "int");
    assert!(!stmt.columns()[0].nullable);
    assert!(stmt.columns()[1].nullable);
}

#[tokio::test]
async fn test_values_decode_to_native_types() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder().with_response("SELECT * FROM people", people_table()),
    )
    .await;

    let result = conn.execute("SELECT * FROM people").await.unwrap();
    let first = &result.rows()[0];
    assert_eq!(first.get_by_name::<i32>("id").unwrap(), 1);
    assert_eq!(first.get_by_name::<String>("name").unwrap(), "Alice");
    assert_eq!(first.get_by_name::<f64>("score").unwrap(), 1.75);
    assert_eq!(
        first.get_by_name::<chrono::NaiveDateTime>("created").unwrap(),
        created_at(15)
    );

    let second = &result.rows()[1];
    assert!(second.is_null_by_name("name"));
    assert_eq!(second.get_by_name::<Option<String>>("name").unwrap(), None);
    assert_eq!(second.get_raw(3), Some(&SqlValue::DateTime(created_at(16))));
}

#[tokio::test]
async fn test_float_round_trips_exactly() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "SELECT CAST(1.75 AS float) AS f",
        MockResponse::rows(
            vec![MockColumn::float("f")],
            vec![vec![ScalarValue::Double(1.75)]],
        ),
    ))
    .await;

    let result = conn.execute("SELECT CAST(1.75 AS float) AS f").await.unwrap();
    assert_eq!(result.rows()[0].get::<f64>(0).unwrap(), 1.75);
}

#[tokio::test]
async fn test_assorted_column_types() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "SELECT mixed",
        MockResponse::rows(
            vec![
                MockColumn::tinyint("t"),
                MockColumn::smallint("s"),
                MockColumn::bigint("b"),
                MockColumn::bit("flag"),
                MockColumn::real("r"),
                MockColumn::varchar("v", 20),
                MockColumn::varbinary("bin", 8),
                MockColumn::nvarchar_max("doc"),
            ],
            vec![vec![
                ScalarValue::TinyInt(200),
                ScalarValue::SmallInt(-3),
                ScalarValue::BigInt(1 << 40),
                ScalarValue::Bool(true),
                ScalarValue::Float(0.5),
                ScalarValue::String("café".into()),
                ScalarValue::Binary(vec![0xDE, 0xAD]),
                ScalarValue::String("x".repeat(5000)),
            ]],
        ),
    ))
    .await;

    let result = conn.execute("select mixed").await.unwrap();
    let row = &result.rows()[0];
    assert_eq!(row.get::<u8>(0).unwrap(), 200);
    assert_eq!(row.get::<i16>(1).unwrap(), -3);
    assert_eq!(row.get::<i64>(2).unwrap(), 1 << 40);
    assert!(row.get::<bool>(3).unwrap());
    assert_eq!(row.get::<f32>(4).unwrap(), 0.5);
    assert_eq!(row.get::<String>(5).unwrap(), "café");
    assert_eq!(row.get::<Vec<u8>>(6).unwrap(), [0xDE, 0xAD]);
    assert_eq!(row.get::<String>(7).unwrap().len(), 5000);
}

#[tokio::test]
async fn test_large_result_spans_packets() {
    let rows: Vec<_> = (0..500)
        .map(|i| {
            vec![
                ScalarValue::Int(i),
                ScalarValue::String(format!("row number {i}")),
            ]
        })
        .collect();
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "SELECT big",
        MockResponse::rows(
            vec![MockColumn::int("n"), MockColumn::nvarchar("label", 100)],
            rows,
        ),
    ))
    .await;

    let result = conn.execute("SELECT big").await.unwrap();
    assert_eq!(result.rows().len(), 500);
    assert_eq!(result.rows()[499].get::<i32>(0).unwrap(), 499);
    assert_eq!(
        result.rows()[42].get_by_name::<String>("LABEL").unwrap(),
        "row number 42"
    );
}

#[tokio::test]
async fn test_ddl_yields_status_without_rows() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder().with_response("CREATE TABLE t (id int)", MockResponse::Done),
    )
    .await;

    let mut stmt = conn.statement("CREATE TABLE t (id int)");
    stmt.execute().await.unwrap();
    let status = stmt.status().expect("DDL reports a status");
    assert_eq!(status.rows_affected, None);
    assert!(stmt.rows().is_empty());
    assert!(stmt.columns().is_empty());
}

#[tokio::test]
async fn test_dml_reports_affected_rows() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder()
            .with_response("DELETE FROM people WHERE id < 10", MockResponse::affected(7)),
    )
    .await;

    let result = conn.execute("DELETE FROM people WHERE id < 10").await.unwrap();
    assert_eq!(result.status().unwrap().rows_affected, Some(7));
    assert!(!result.has_table());
}

#[tokio::test]
async fn test_invalid_statement_leaves_connection_usable() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder()
            .with_response("SELECT * FROM nope", MockResponse::error(208, "Invalid object name 'nope'."))
            .with_response("SELECT * FROM people", people_table()),
    )
    .await;

    let mut stmt = conn.statement("SELECT * FROM nope");
    let err = stmt.execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Statement);
    assert!(err.is_connection_usable());
    assert!(err.is_server_error(208));
    assert_eq!(err.class(), Some(16));
    assert_eq!(stmt.state(), StatementState::Failed);
    assert!(stmt.rows().is_empty());
    assert_eq!(stmt.errors().len(), 1);
    assert_eq!(stmt.errors()[0].number, 208);

    assert_eq!(conn.state(), ConnectionState::Ready);
    let result = conn.execute("SELECT * FROM people").await.unwrap();
    assert_eq!(result.rows().len(), 2);
}

#[tokio::test]
async fn test_statement_can_be_re_executed() {
    let (server, mut conn) = connect(
        MockTdsServer::builder().with_response("SELECT * FROM people", people_table()),
    )
    .await;

    let mut stmt = conn.statement("SELECT * FROM people");
    stmt.execute().await.unwrap();
    stmt.execute().await.unwrap();
    assert_eq!(stmt.rows().len(), 2);

    stmt.clear();
    assert_eq!(stmt.state(), StatementState::Inert);
    assert!(stmt.rows().is_empty());
    assert_eq!(server.received_batches().await.len(), 2);
}

#[tokio::test]
async fn test_only_first_result_set_is_exposed() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "SELECT 1; SELECT * FROM people",
        MockResponse::Batch(vec![MockResponse::scalar_int(1), people_table()]),
    ))
    .await;

    let result = conn.execute("SELECT 1; SELECT * FROM people").await.unwrap();
    assert_eq!(result.columns().len(), 1);
    assert_eq!(result.rows().len(), 1);
    assert_eq!(result.rows()[0].get::<i32>(0).unwrap(), 1);
}

#[tokio::test]
async fn test_status_then_table_exposes_table() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "UPDATE x; SELECT * FROM people",
        MockResponse::Batch(vec![MockResponse::affected(3), people_table()]),
    ))
    .await;

    let result = conn.execute("UPDATE x; SELECT * FROM people").await.unwrap();
    assert_eq!(result.rows().len(), 2);
    assert!(result.status().is_none());
}

#[tokio::test]
async fn test_print_messages_are_collected() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "PRINT 'hi'; SELECT 1",
        MockResponse::Batch(vec![MockResponse::print("hi"), MockResponse::scalar_int(1)]),
    ))
    .await;

    let result = conn.execute("PRINT 'hi'; SELECT 1").await.unwrap();
    assert_eq!(result.messages().len(), 1);
    assert_eq!(result.messages()[0].message, "hi");
    assert!(result.errors().is_empty());
    assert_eq!(result.rows().len(), 1);
}

#[tokio::test]
async fn test_warnings_are_not_failures() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "SELECT AVG(x) FROM t",
        MockResponse::Batch(vec![
            MockResponse::Info {
                number: 8153,
                message: "Warning: Null value is eliminated by an aggregate.".into(),
                class: 10,
            },
            MockResponse::scalar_int(4),
        ]),
    ))
    .await;

    let result = conn.execute("SELECT AVG(x) FROM t").await.unwrap();
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].number, 8153);
    assert_eq!(result.rows()[0].get::<i32>(0).unwrap(), 4);
}

#[tokio::test]
async fn test_return_status_is_captured() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder().with_response("EXEC sp_check", MockResponse::ReturnStatus(-4)),
    )
    .await;

    let mut stmt = conn.statement("EXEC sp_check");
    stmt.execute().await.unwrap();
    assert_eq!(stmt.return_status(), Some(-4));
}

#[tokio::test]
async fn test_database_change_is_tracked() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_response(
        "USE archive",
        MockResponse::EnvChange(EnvChange::Database {
            new: "archive".into(),
            old: "master".into(),
        }),
    ))
    .await;

    assert_eq!(conn.database(), Some("master"));
    conn.execute("USE archive").await.unwrap();
    assert_eq!(conn.database(), Some("archive"));
}

#[tokio::test]
async fn test_transaction_state_follows_env_changes() {
    let (_server, mut conn) = connect(
        MockTdsServer::builder()
            .with_response(
                "BEGIN TRAN",
                MockResponse::EnvChange(EnvChange::BeginTransaction(0x0102_0304)),
            )
            .with_response(
                "COMMIT",
                MockResponse::EnvChange(EnvChange::CommitTransaction),
            ),
    )
    .await;

    assert!(!conn.in_transaction());
    conn.execute("BEGIN TRAN").await.unwrap();
    assert!(conn.in_transaction());
    conn.execute("COMMIT").await.unwrap();
    assert!(!conn.in_transaction());
}

#[tokio::test]
async fn test_done_error_without_message() {
    let mut raw = BytesMut::new();
    raw.put_u8(TokenType::Done as u8);
    raw.put_u16_le(0x0002);
    raw.put_u16_le(0);
    raw.put_u64_le(0);
    let (_server, mut conn) = connect(
        MockTdsServer::builder().with_response("SELECT broken", MockResponse::Raw(raw.freeze())),
    )
    .await;

    let err = conn.execute("SELECT broken").await.unwrap_err();
    assert!(matches!(err, Error::Statement { number: 0, .. }));
    assert!(conn.is_usable());
}

#[tokio::test]
async fn test_custom_response_sees_sql() {
    let (_server, mut conn) = connect(MockTdsServer::builder().with_default_response(
        MockResponse::custom(|sql| MockResponse::affected(sql.len() as u64)),
    ))
    .await;

    let result = conn.execute("UPDATE t SET a = 1").await.unwrap();
    assert_eq!(result.status().unwrap().rows_affected, Some(18));
}
