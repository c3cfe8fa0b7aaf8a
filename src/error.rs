//! Error types for runsql.
//!
//! Every failure of a query invocation maps onto one variant of [`RunSqlError`].

use crate::db::Backend;
use thiserror::Error;

/// Main error type for runsql operations.
#[derive(Error, Debug)]
pub enum RunSqlError {
    /// The descriptor's scheme is not one of the supported backends.
    #[error("Unsupported database '{scheme}'")]
    UnsupportedBackend { scheme: String },

    /// Driver init, connect or login failure.
    #[error("Could not connect to {backend}: {message}")]
    Connection { backend: Backend, message: String },

    /// Statement execution or row fetch failure.
    #[error("Error ({message}) running on {backend}: {sql}")]
    Query {
        backend: Backend,
        sql: String,
        message: String,
        code: Option<String>,
    },

    /// A required parameter is absent or has the wrong type.
    #[error("Missing parameter '{key}': {reason}")]
    MissingParameter { key: String, reason: String },

    /// The result could not be encoded (e.g. a cell without a column name).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration errors (invalid config file, bad CLI input, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RunSqlError {
    /// Creates an unsupported backend error for the given scheme.
    pub fn unsupported(scheme: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            scheme: scheme.into(),
        }
    }

    /// Creates a connection error with the given message.
    pub fn connection(backend: Backend, msg: impl Into<String>) -> Self {
        Self::Connection {
            backend,
            message: msg.into(),
        }
    }

    /// Creates a query error carrying the SQL text and the driver's message.
    pub fn query(backend: Backend, sql: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Query {
            backend,
            sql: sql.into(),
            message: msg.into(),
            code: None,
        }
    }

    /// Creates a missing parameter error.
    pub fn missing(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingParameter {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attaches a backend error code to a query error. Other variants are returned unchanged.
    pub fn with_code(self, code: Option<String>) -> Self {
        match self {
            Self::Query {
                backend,
                sql,
                message,
                ..
            } => Self::Query {
                backend,
                sql,
                message,
                code,
            },
            other => other,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedBackend { .. } => "Unsupported Database",
            Self::Connection { .. } => "Connection Error",
            Self::Query { .. } => "Query Error",
            Self::MissingParameter { .. } => "Missing Parameter",
            Self::Encoding(_) => "Encoding Error",
            Self::Config(_) => "Configuration Error",
        }
    }
}

/// Result type alias using RunSqlError.
pub type Result<T> = std::result::Result<T, RunSqlError>;
