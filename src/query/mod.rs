//! Query execution for runsql.
//!
//! A [`QueryRequest`] names the connection, the SQL text and how to encode the
//! result; a [`QueryRunner`] carries it through connect, execute, encode and
//! close.

mod limiter;
mod runner;

pub use limiter::{LimitPolicy, RowLimiter};
pub use runner::{QueryOutcome, QueryRunner};

use crate::encode::{EncodingOptions, OutputFormat};
use crate::error::{Result, RunSqlError};
use crate::params::{keys, ParameterSource};
use std::time::Duration;

/// Everything needed to run one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Connection URL, or a filesystem path for SQLite.
    pub connection_url: String,

    /// The statement, passed to the backend as-is.
    pub sql: String,

    pub format: OutputFormat,

    pub options: EncodingOptions,

    /// Deadline for execute, fetch and encode. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    /// Creates a request with Text output, no headers, a tab delimiter and no limit.
    pub fn new(connection_url: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            connection_url: connection_url.into(),
            sql: sql.into(),
            format: OutputFormat::default(),
            options: EncodingOptions::default(),
            timeout: None,
        }
    }

    /// Builds a request from parameters.
    ///
    /// `connectionURL`, `rowLimit` and `headers` are required; `outputFormat`
    /// and `delimiter` fall back to Text and a tab.
    pub fn from_parameters(sql: impl Into<String>, params: &dyn ParameterSource) -> Result<Self> {
        let connection_url = params.text(keys::CONNECTION_URL)?;
        let row_limit = params.integer(keys::ROW_LIMIT)?;
        let row_limit = u64::try_from(row_limit).map_err(|_| {
            RunSqlError::missing(
                keys::ROW_LIMIT,
                format!("expected a non-negative integer, found {row_limit}"),
            )
        })?;
        let include_headers = params.flag(keys::HEADERS)?;

        let format = match params.optional_text(keys::OUTPUT_FORMAT)? {
            Some(title) => title.parse()?,
            None => OutputFormat::default(),
        };
        let delimiter = params
            .optional_text(keys::DELIMITER)?
            .unwrap_or_else(|| EncodingOptions::default().delimiter);

        Ok(Self {
            connection_url,
            sql: sql.into(),
            format,
            options: EncodingOptions {
                include_headers,
                delimiter,
                row_limit,
            },
            timeout: None,
        })
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_headers(mut self, include_headers: bool) -> Self {
        self.options.include_headers = include_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.options.delimiter = delimiter.into();
        self
    }

    /// Sets the row limit; 0 means unlimited.
    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.options.row_limit = row_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn params(pairs: &[(&str, ParamValue)]) -> HashMap<String, ParamValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_parameters_defaults() {
        let source = params(&[
            (keys::CONNECTION_URL, "sqlite:///tmp/t.db".into()),
            (keys::ROW_LIMIT, 0i64.into()),
            (keys::HEADERS, true.into()),
        ]);

        let request = QueryRequest::from_parameters("SELECT 1", &source).unwrap();
        assert_eq!(
            request,
            QueryRequest::new("sqlite:///tmp/t.db", "SELECT 1").with_headers(true)
        );
        assert_eq!(request.options.delimiter, "\t");
    }

    #[test]
    fn test_from_parameters_full() {
        let source = params(&[
            (keys::CONNECTION_URL, "mysql://db/shop".into()),
            (keys::ROW_LIMIT, 25i64.into()),
            (keys::HEADERS, false.into()),
            (keys::OUTPUT_FORMAT, "CSV".into()),
            (keys::DELIMITER, ";".into()),
        ]);

        let request = QueryRequest::from_parameters("SELECT * FROM t", &source).unwrap();
        assert_eq!(request.format, OutputFormat::Csv);
        assert_eq!(request.options.row_limit, 25);
        assert_eq!(request.options.delimiter, ";");
        assert!(!request.options.include_headers);
    }

    #[test]
    fn test_from_parameters_missing_required() {
        let source = params(&[
            (keys::CONNECTION_URL, "mysql://db/shop".into()),
            (keys::HEADERS, false.into()),
        ]);

        match QueryRequest::from_parameters("SELECT 1", &source) {
            Err(RunSqlError::MissingParameter { key, .. }) => assert_eq!(key, "rowLimit"),
            other => panic!("expected missing rowLimit, got {other:?}"),
        }
    }

    #[test]
    fn test_from_parameters_rejects_negative_limit() {
        let source = params(&[
            (keys::CONNECTION_URL, "mysql://db/shop".into()),
            (keys::ROW_LIMIT, (-1i64).into()),
            (keys::HEADERS, false.into()),
        ]);

        assert!(matches!(
            QueryRequest::from_parameters("SELECT 1", &source),
            Err(RunSqlError::MissingParameter { .. })
        ));
    }
}
