//! MySQL adapter.
//!
//! Opens a single `sqlx` connection (no pool) and runs the statement over the
//! text protocol.

use super::sqlx_cursor::{columns_of, connection_error, first_result_set, SqlxCursor};
use super::{Backend, Column, Connection, ConnectionDescriptor, RowCursor};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection as NativeConnection};
use sqlx::{Connection as _, Executor, Statement};
use tracing::debug;

/// User when the descriptor has none.
const DEFAULT_USER: &str = "root";

/// Password when the descriptor has none.
const DEFAULT_PASSWORD: &str = "root";

const DEFAULT_HOST: &str = "localhost";

/// MySQL connection.
#[derive(Debug)]
pub struct MySqlConnection {
    conn: NativeConnection,
}

impl MySqlConnection {
    /// Connects using the descriptor, applying MySQL defaults.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        debug!("Connecting to {}", descriptor.display_string());

        let conn = NativeConnection::connect_with(&connect_options(descriptor))
            .await
            .map_err(|e| connection_error(Backend::MySql, e))?;

        debug!("Successfully connected to MySQL");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>> {
        let described = describe(&mut self.conn, sql).await;
        let stream = first_result_set(sqlx::raw_sql(sql).fetch_many(&mut self.conn));
        let cursor = SqlxCursor::open(Backend::MySql, sql, described, stream).await?;
        Ok(Box::new(cursor))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| connection_error(Backend::MySql, e))
    }
}

/// Builds connect options: `root`/`root` credentials and port 3306 unless given.
fn connect_options(descriptor: &ConnectionDescriptor) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(descriptor.host.as_deref().unwrap_or(DEFAULT_HOST))
        .port(descriptor.port_or_default().unwrap_or(3306))
        .username(descriptor.user.as_deref().unwrap_or(DEFAULT_USER))
        .password(descriptor.password.as_deref().unwrap_or(DEFAULT_PASSWORD));

    match descriptor.database.as_deref() {
        Some(database) => options.database(database),
        None => options,
    }
}

/// Column metadata from preparing the statement; `None` if the server refuses
/// to prepare it (some statements are text-protocol only).
async fn describe(conn: &mut NativeConnection, sql: &str) -> Option<Vec<Column>> {
    match conn.prepare(sql).await {
        Ok(statement) => Some(columns_of(statement.columns())),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_database_url() -> Option<String> {
        std::env::var("RUNSQL_TEST_MYSQL_URL").ok()
    }

    #[test]
    fn test_connect_options_defaults() {
        let descriptor = ConnectionDescriptor::parse("mysql://db.local/shop").unwrap();
        let options = connect_options(&descriptor);

        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 3306);
        assert_eq!(options.get_username(), "root");
        assert_eq!(options.get_database(), Some("shop"));
    }

    #[test]
    fn test_connect_options_explicit() {
        let descriptor = ConnectionDescriptor::parse("mysql://app:pw@db.local:3307/shop").unwrap();
        let options = connect_options(&descriptor);

        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
    }

    #[tokio::test]
    async fn test_execute_select() {
        let Some(url) = get_test_database_url() else {
            eprintln!("Skipping test: RUNSQL_TEST_MYSQL_URL not set");
            return;
        };

        let descriptor = ConnectionDescriptor::parse(&url).unwrap();
        let mut conn = MySqlConnection::connect(&descriptor).await.unwrap();
        {
            let mut cursor = conn
                .execute("SELECT 1 AS num, NULL AS nothing, 'hi' AS greeting")
                .await
                .unwrap();
            let names: Vec<_> = cursor.columns().iter().map(|c| c.name.clone()).collect();
            assert_eq!(names, ["num", "nothing", "greeting"]);

            let row = cursor.next_row().await.unwrap().unwrap();
            assert_eq!(row, vec![Some("1".to_string()), None, Some("hi".to_string())]);
            assert!(cursor.next_row().await.unwrap().is_none());
        }
        Box::new(conn).close().await.unwrap();
    }
}
