//! Database abstraction layer for runsql.
//!
//! Provides a trait-based interface for running one statement, allowing the
//! four backends to be used interchangeably by the query runner.

mod descriptor;
mod mock;
mod mssql;
mod mysql;
mod postgres;
mod sqlite;
mod sqlx_cursor;
mod types;

pub use descriptor::ConnectionDescriptor;
pub use mock::{MockConnector, MockStats};
pub use mssql::MsSqlConnection;
pub use mysql::MySqlConnection;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;
pub use types::{Cell, Column, Counts, Row};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    MySql,
    Postgres,
    Sqlite,
    MsSql,
}

impl Backend {
    /// Returns the canonical scheme for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
            Self::Sqlite => "sqlite",
            Self::MsSql => "mssql",
        }
    }

    /// Resolves a URL scheme, case-insensitively.
    ///
    /// Only the exact spelling `postgresql` selects PostgreSQL; `mssql` and
    /// `sqlserver` both select SQL Server.
    pub fn from_scheme(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" => Some(Self::MySql),
            "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            "mssql" | "sqlserver" => Some(Self::MsSql),
            _ => None,
        }
    }

    /// Returns the default port for this backend, if it uses one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
            Self::MsSql => Some(1433),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
            Self::MsSql => "SQL Server",
        };
        f.write_str(name)
    }
}

/// Opens the native connection for the descriptor's backend.
///
/// This is the central factory function for database connections.
pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>> {
    match descriptor.backend {
        Backend::MySql => Ok(Box::new(MySqlConnection::connect(descriptor).await?)),
        Backend::Postgres => Ok(Box::new(PostgresConnection::connect(descriptor).await?)),
        Backend::Sqlite => Ok(Box::new(SqliteConnection::connect(descriptor).await?)),
        Backend::MsSql => Ok(Box::new(MsSqlConnection::connect(descriptor).await?)),
    }
}

/// Selects and opens connections for the query runner.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection for an already-parsed descriptor.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>>;
}

/// Connector backed by the native drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>> {
        connect(descriptor).await
    }
}

/// One open connection to a backend.
#[async_trait]
pub trait Connection: Send {
    /// Returns the backend this connection talks to.
    fn backend(&self) -> Backend;

    /// Executes one SQL statement and returns a cursor over its rows.
    ///
    /// The cursor borrows the connection, so it must be dropped before
    /// the connection can be closed.
    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>>;

    /// Releases every native resource held by the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Row cursor for one executed statement.
#[async_trait]
pub trait RowCursor: Send {
    /// Column metadata, available before the first row is read.
    fn columns(&self) -> &[Column];

    /// Advances one row. `None` signals exhaustion.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Total row count if the backend knows it before iteration.
    fn known_total(&self) -> Option<u64> {
        None
    }
}
