//! PostgreSQL adapter.
//!
//! Provides the `PostgresConnection` struct that implements the `Connection`
//! trait for PostgreSQL databases using sqlx. The connection URL is handed to
//! the driver verbatim, so every libpq-style option in it is honored.

use super::sqlx_cursor::{columns_of, connection_error, first_result_set, SqlxCursor};
use super::{Backend, Column, Connection, ConnectionDescriptor, RowCursor};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection as _, Executor, Statement};
use tracing::debug;

/// PostgreSQL connection.
#[derive(Debug)]
pub struct PostgresConnection {
    conn: PgConnection,
}

impl PostgresConnection {
    /// Connects with the descriptor's original URL.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        debug!("Connecting to {}", descriptor.display_string());

        let conn = PgConnection::connect(&descriptor.raw)
            .await
            .map_err(|e| connection_error(Backend::Postgres, e))?;

        debug!("Successfully connected to PostgreSQL");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>> {
        let described = describe(&mut self.conn, sql).await;
        let stream = first_result_set(sqlx::raw_sql(sql).fetch_many(&mut self.conn));
        let cursor = SqlxCursor::open(Backend::Postgres, sql, described, stream).await?;
        Ok(Box::new(cursor))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| connection_error(Backend::Postgres, e))
    }
}

/// Column metadata for statements that return no rows.
async fn describe(conn: &mut PgConnection, sql: &str) -> Option<Vec<Column>> {
    match conn.prepare(sql).await {
        Ok(statement) => Some(columns_of(statement.columns())),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            None
        }
    }
}
