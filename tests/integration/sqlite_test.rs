//! End-to-end tests against real SQLite files.

use pretty_assertions::assert_eq;
use runsql::db::Counts;
use runsql::encode::{EncodedOutput, OutputFormat};
use runsql::error::RunSqlError;
use runsql::params::{keys, ParamValue};
use runsql::query::{QueryRequest, QueryRunner};
use runsql::report::{ChannelReporter, NullReporter};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Creates `t(id INT, name TEXT)` holding (1, 'Ann') and (2, NULL).
async fn create_test_db() -> (PathBuf, TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::raw_sql(
        "CREATE TABLE t (id INT, name TEXT);
         INSERT INTO t VALUES (1, 'Ann'), (2, NULL);",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();

    (path, dir)
}

fn url(path: &std::path::Path) -> String {
    path.to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_csv_with_headers() {
    let (path, _dir) = create_test_db().await;
    let request = QueryRequest::new(url(&path), "SELECT id, name FROM t ORDER BY id")
        .with_format(OutputFormat::Csv)
        .with_headers(true);

    let outcome = QueryRunner::new().run(&request, &NullReporter).await.unwrap();

    assert_eq!(
        outcome.output,
        EncodedOutput::Text("\"id\",\"name\"\r\n1,Ann\r\n2,\r\n".to_string())
    );
    assert_eq!(outcome.counts, Counts { total_seen: 2, emitted: 2 });
}

#[tokio::test]
async fn test_sqlite_scheme_url() {
    let (path, _dir) = create_test_db().await;
    let request = QueryRequest::new(
        format!("sqlite://{}", url(&path)),
        "SELECT name FROM t WHERE id = 1",
    );

    let outcome = QueryRunner::new().run(&request, &NullReporter).await.unwrap();
    assert_eq!(outcome.output, EncodedOutput::Text("Ann\n".to_string()));
}

#[tokio::test]
async fn test_raw_list_and_dictionary() {
    let (path, _dir) = create_test_db().await;
    let sql = "SELECT id, name FROM t ORDER BY id";
    let runner = QueryRunner::new();

    let raw = QueryRequest::new(url(&path), sql)
        .with_headers(true)
        .with_delimiter("|");
    let outcome = runner.run(&raw, &NullReporter).await.unwrap();
    assert_eq!(
        outcome.output,
        EncodedOutput::Text("id|name\n1|Ann\n2|\n".to_string())
    );

    let list = QueryRequest::new(url(&path), sql).with_format(OutputFormat::List);
    let outcome = runner.run(&list, &NullReporter).await.unwrap();
    assert_eq!(
        outcome.output,
        EncodedOutput::Lines(vec!["1\tAnn".to_string(), "2\t".to_string()])
    );

    let dictionary = QueryRequest::new(url(&path), sql)
        .with_format(OutputFormat::Dictionary)
        .with_headers(true);
    let outcome = runner.run(&dictionary, &NullReporter).await.unwrap();
    let EncodedOutput::Records(records) = outcome.output else {
        panic!("expected records");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Ann");
    assert_eq!(records[1]["name"], "");
}

#[tokio::test]
async fn test_row_limit_counts_every_row() {
    let (path, _dir) = create_test_db().await;
    let (reporter, receiver) = ChannelReporter::new();
    let request = QueryRequest::new(url(&path), "SELECT id FROM t ORDER BY id").with_row_limit(1);

    let outcome = QueryRunner::new().run(&request, &reporter).await.unwrap();

    assert_eq!(outcome.output, EncodedOutput::Text("1\n".to_string()));
    assert_eq!(outcome.counts, Counts { total_seen: 2, emitted: 1 });
    assert_eq!(receiver.label(), "Count: 2 (1)");
}

#[tokio::test]
async fn test_empty_result_keeps_header() {
    let (path, _dir) = create_test_db().await;
    let request = QueryRequest::new(url(&path), "SELECT id, name FROM t WHERE id > 100")
        .with_format(OutputFormat::Csv)
        .with_headers(true);

    let outcome = QueryRunner::new().run(&request, &NullReporter).await.unwrap();
    assert_eq!(
        outcome.output,
        EncodedOutput::Text("\"id\",\"name\"\r\n".to_string())
    );
    assert_eq!(outcome.counts, Counts::default());
}

#[tokio::test]
async fn test_statement_without_result_set() {
    let (path, _dir) = create_test_db().await;
    let request =
        QueryRequest::new(url(&path), "INSERT INTO t VALUES (3, 'Cy')").with_headers(true);

    let outcome = QueryRunner::new().run(&request, &NullReporter).await.unwrap();
    assert!(outcome.output.is_empty());

    let check = QueryRequest::new(url(&path), "SELECT count(*) FROM t");
    let outcome = QueryRunner::new().run(&check, &NullReporter).await.unwrap();
    assert_eq!(outcome.output, EncodedOutput::Text("3\n".to_string()));
}

#[tokio::test]
async fn test_later_statements_do_not_leak_rows() {
    let (path, _dir) = create_test_db().await;
    let sql = "SELECT id FROM t WHERE id = 1; SELECT 'x' AS b, 'y' AS c";
    let runner = QueryRunner::new();

    let csv = QueryRequest::new(url(&path), sql)
        .with_format(OutputFormat::Csv)
        .with_headers(true);
    let outcome = runner.run(&csv, &NullReporter).await.unwrap();
    assert_eq!(outcome.output, EncodedOutput::Text("\"id\"\r\n1\r\n".to_string()));
    assert_eq!(outcome.counts, Counts { total_seen: 1, emitted: 1 });

    let dictionary = QueryRequest::new(url(&path), sql).with_format(OutputFormat::Dictionary);
    let outcome = runner.run(&dictionary, &NullReporter).await.unwrap();
    let EncodedOutput::Records(records) = outcome.output else {
        panic!("expected records");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], "1");
}

#[tokio::test]
async fn test_query_error_carries_sql() {
    let (path, _dir) = create_test_db().await;
    let request = QueryRequest::new(url(&path), "SELECT nope FROM t");

    match QueryRunner::new().run(&request, &NullReporter).await {
        Err(RunSqlError::Query { sql, message, .. }) => {
            assert_eq!(sql, "SELECT nope FROM t");
            assert!(message.contains("nope"));
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_file_is_connection_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.db");
    let request = QueryRequest::new(url(&path), "SELECT 1");

    let result = QueryRunner::new().run(&request, &NullReporter).await;
    assert!(matches!(result, Err(RunSqlError::Connection { .. })));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_run_with_parameters() {
    let (path, _dir) = create_test_db().await;
    let params: HashMap<String, ParamValue> = HashMap::from([
        (keys::CONNECTION_URL.to_string(), ParamValue::Text(url(&path))),
        (keys::ROW_LIMIT.to_string(), ParamValue::Int(0)),
        (keys::HEADERS.to_string(), ParamValue::Bool(true)),
        (keys::OUTPUT_FORMAT.to_string(), ParamValue::Text("CSV".to_string())),
    ]);

    let outcome = QueryRunner::new()
        .run_with_parameters("SELECT id, name FROM t ORDER BY id", &params, &NullReporter)
        .await
        .unwrap();
    assert_eq!(
        outcome.output,
        EncodedOutput::Text("\"id\",\"name\"\r\n1,Ann\r\n2,\r\n".to_string())
    );
}
