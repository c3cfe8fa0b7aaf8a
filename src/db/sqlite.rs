//! SQLite adapter.
//!
//! The database file is opened read-write and must already exist.

use super::sqlx_cursor::{columns_of, connection_error, first_result_set, SqlxCursor};
use super::{Backend, Column, Connection, ConnectionDescriptor, RowCursor};
use crate::error::{Result, RunSqlError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection as NativeConnection};
use sqlx::{Connection as _, Executor, Statement};
use tracing::debug;

/// SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: NativeConnection,
}

impl SqliteConnection {
    /// Opens the database file named by the descriptor.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let path = descriptor
            .database
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| RunSqlError::connection(Backend::Sqlite, "No database path given"))?;
        debug!("Opening {}", descriptor.display_string());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(false);

        let conn = NativeConnection::connect_with(&options)
            .await
            .map_err(|e| match connection_error(Backend::Sqlite, e) {
                RunSqlError::Connection { backend, message } => {
                    RunSqlError::connection(backend, format!("{path}: {message}"))
                }
                other => other,
            })?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>> {
        let described = describe(&mut self.conn, sql).await;
        let stream = first_result_set(sqlx::raw_sql(sql).fetch_many(&mut self.conn));
        let cursor = SqlxCursor::open(Backend::Sqlite, sql, described, stream).await?;
        Ok(Box::new(cursor))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| connection_error(Backend::Sqlite, e))
    }
}

async fn describe(conn: &mut NativeConnection, sql: &str) -> Option<Vec<Column>> {
    match conn.prepare(sql).await {
        Ok(statement) => Some(columns_of(statement.columns())),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            None
        }
    }
}
