//! Live-server tests.
//!
//! Each test is skipped unless its RUNSQL_TEST_*_URL variable points at a
//! reachable server.

use pretty_assertions::assert_eq;
use runsql::db::{Backend, Counts};
use runsql::encode::{EncodedOutput, OutputFormat};
use runsql::error::RunSqlError;
use runsql::query::{QueryRequest, QueryRunner};
use runsql::report::NullReporter;

fn test_url(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|url| !url.is_empty())
}

async fn select_two_rows(url: String, sql: &str, backend: Backend) {
    let request = QueryRequest::new(url, sql)
        .with_format(OutputFormat::Csv)
        .with_headers(true)
        .with_row_limit(1);

    let outcome = QueryRunner::new().run(&request, &NullReporter).await.unwrap();

    assert_eq!(outcome.backend, backend);
    assert_eq!(
        outcome.output,
        EncodedOutput::Text("\"id\",\"name\"\r\n1,Ann\r\n".to_string())
    );
    assert_eq!(outcome.counts, Counts { total_seen: 2, emitted: 1 });
}

#[tokio::test]
async fn test_mysql_select() {
    let Some(url) = test_url("RUNSQL_TEST_MYSQL_URL") else {
        eprintln!("Skipping test: RUNSQL_TEST_MYSQL_URL not set");
        return;
    };

    select_two_rows(
        url,
        "SELECT 1 AS id, 'Ann' AS name UNION ALL SELECT 2, NULL",
        Backend::MySql,
    )
    .await;
}

#[tokio::test]
async fn test_postgres_select() {
    let Some(url) = test_url("RUNSQL_TEST_POSTGRES_URL") else {
        eprintln!("Skipping test: RUNSQL_TEST_POSTGRES_URL not set");
        return;
    };

    select_two_rows(
        url,
        "SELECT 1 AS id, 'Ann' AS name UNION ALL SELECT 2, NULL",
        Backend::Postgres,
    )
    .await;
}

#[tokio::test]
async fn test_mssql_select() {
    let Some(url) = test_url("RUNSQL_TEST_MSSQL_URL") else {
        eprintln!("Skipping test: RUNSQL_TEST_MSSQL_URL not set");
        return;
    };

    select_two_rows(
        url,
        "SELECT 1 AS id, N'Ann' AS name UNION ALL SELECT 2, NULL",
        Backend::MsSql,
    )
    .await;
}

#[tokio::test]
async fn test_postgres_error_code() {
    let Some(url) = test_url("RUNSQL_TEST_POSTGRES_URL") else {
        eprintln!("Skipping test: RUNSQL_TEST_POSTGRES_URL not set");
        return;
    };

    let request = QueryRequest::new(url, "SELECT * FROM runsql_missing_table");
    match QueryRunner::new().run(&request, &NullReporter).await {
        Err(RunSqlError::Query { code, .. }) => assert_eq!(code.as_deref(), Some("42P01")),
        other => panic!("expected query error, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_mssql_requires_credentials() {
    let request = QueryRequest::new("mssql://db.invalid/app", "SELECT 1");

    match QueryRunner::new().run(&request, &NullReporter).await {
        Err(RunSqlError::Connection { backend, message }) => {
            assert_eq!(backend, Backend::MsSql);
            assert!(message.contains("user"), "unexpected message: {message}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_mysql_unreachable_host() {
    let request = QueryRequest::new("mysql://u:p@host.that.does.not.exist.invalid/db", "SELECT 1");
    let result = QueryRunner::new().run(&request, &NullReporter).await;
    assert!(matches!(result, Err(RunSqlError::Connection { .. })));
}
