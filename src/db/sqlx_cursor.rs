//! Row cursor shared by the sqlx-backed adapters (MySQL, PostgreSQL, SQLite).
//!
//! Statements run through `sqlx::raw_sql`, which uses each server's text
//! protocol, so every non-NULL value arrives already rendered as text by the
//! backend and is passed through untouched. Only the first result set is
//! read; rows of later statements never reach the cursor.

use super::{Backend, Cell, Column, Row, RowCursor};
use crate::error::{Result, RunSqlError};
use async_trait::async_trait;
use futures::future;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::{Column as SqlxColumn, ColumnIndex, Decode, Either, Row as SqlxRow, ValueRef};
use tracing::debug;

/// Stream of native rows borrowed from a connection.
pub(crate) type RowStream<'c, R> = BoxStream<'c, std::result::Result<R, sqlx::Error>>;

/// Statement completions interleaved with rows, as `raw_sql(..).fetch_many` yields them.
pub(crate) type ResultStream<'c, Q, R> =
    BoxStream<'c, std::result::Result<Either<Q, R>, sqlx::Error>>;

/// Keeps the rows of the first result set. The first statement completion
/// ends the stream.
pub(crate) fn first_result_set<'c, Q, R>(stream: ResultStream<'c, Q, R>) -> RowStream<'c, R>
where
    Q: Send + 'c,
    R: Send + 'c,
{
    stream
        .try_take_while(|item| future::ready(Ok(item.is_right())))
        .try_filter_map(|item| future::ready(Ok(item.right())))
        .boxed()
}

/// Cursor over a sqlx row stream.
///
/// The first row is read eagerly so that execution errors surface from
/// `execute` and column names are known before iteration starts.
pub(crate) struct SqlxCursor<'c, R> {
    backend: Backend,
    sql: &'c str,
    columns: Vec<Column>,
    peeked: Option<R>,
    stream: RowStream<'c, R>,
}

impl<'c, R> SqlxCursor<'c, R>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> &'r str: Decode<'r, R::Database>,
    for<'r> &'r [u8]: Decode<'r, R::Database>,
{
    /// Opens the cursor. `described` holds column metadata from preparing the
    /// statement, used when the result has no rows to take names from.
    pub(crate) async fn open(
        backend: Backend,
        sql: &'c str,
        described: Option<Vec<Column>>,
        mut stream: RowStream<'c, R>,
    ) -> Result<Self> {
        let peeked = stream
            .try_next()
            .await
            .map_err(|e| query_error(backend, sql, e))?;

        let columns = peeked
            .as_ref()
            .map(|row| columns_of(row.columns()))
            .or(described)
            .unwrap_or_default();
        debug!("{backend} result has {} columns", columns.len());

        Ok(Self {
            backend,
            sql,
            columns,
            peeked,
            stream,
        })
    }
}

#[async_trait]
impl<'c, R> RowCursor for SqlxCursor<'c, R>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> &'r str: Decode<'r, R::Database>,
    for<'r> &'r [u8]: Decode<'r, R::Database>,
{
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let next = match self.peeked.take() {
            Some(row) => Some(row),
            None => self
                .stream
                .try_next()
                .await
                .map_err(|e| query_error(self.backend, self.sql, e))?,
        };

        next.map(|row| convert_row(&row).map_err(|e| query_error(self.backend, self.sql, e)))
            .transpose()
    }
}

/// Maps driver column metadata to the result model.
pub(crate) fn columns_of<C: SqlxColumn>(columns: &[C]) -> Vec<Column> {
    columns
        .iter()
        .map(|col| Column::new(col.ordinal(), col.name()))
        .collect()
}

/// Converts a native row to our Row type.
fn convert_row<R>(row: &R) -> std::result::Result<Row, sqlx::Error>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> &'r str: Decode<'r, R::Database>,
    for<'r> &'r [u8]: Decode<'r, R::Database>,
{
    (0..row.len()).map(|i| convert_cell(row, i)).collect()
}

/// Reads one cell as text. Values that are not valid UTF-8 (binary blobs)
/// are decoded lossily rather than failing the query.
fn convert_cell<R>(row: &R, index: usize) -> std::result::Result<Cell, sqlx::Error>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    for<'r> &'r str: Decode<'r, R::Database>,
    for<'r> &'r [u8]: Decode<'r, R::Database>,
{
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }

    match <&str as Decode<'_, R::Database>>::decode(raw) {
        Ok(text) => Ok(Some(text.to_owned())),
        Err(_) => {
            let raw = row.try_get_raw(index)?;
            let bytes =
                <&[u8] as Decode<'_, R::Database>>::decode(raw).map_err(sqlx::Error::Decode)?;
            Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
        }
    }
}

/// Maps a sqlx execution error, keeping the server's message and code.
pub(crate) fn query_error(backend: Backend, sql: &str, error: sqlx::Error) -> RunSqlError {
    match error.as_database_error() {
        Some(db_error) => RunSqlError::query(backend, sql, db_error.message())
            .with_code(db_error.code().map(|code| code.into_owned())),
        None => RunSqlError::query(backend, sql, error.to_string()),
    }
}

/// Maps a sqlx connect error, keeping the server's message when there is one.
pub(crate) fn connection_error(backend: Backend, error: sqlx::Error) -> RunSqlError {
    match error.as_database_error() {
        Some(db_error) => RunSqlError::connection(backend, db_error.message()),
        None => RunSqlError::connection(backend, error.to_string()),
    }
}
