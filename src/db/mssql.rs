//! SQL Server adapter over the TDS protocol (tiberius).
//!
//! Each execution owns a [`ColumnArena`]: one receive buffer per result column,
//! sized from the column's display length. Every fetched value is copied into
//! its column buffer and read back from there, and each cell gets a
//! [`FetchStatus`]. Only a regular fetch yields the value itself; an overflow or
//! a failed read yields a diagnostic marker so the query keeps going.

use super::{Backend, Cell, Column, Connection, ConnectionDescriptor, Row, RowCursor};
use crate::error::{Result, RunSqlError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use std::fmt;
use std::time::Duration;
use tiberius::{
    AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, QueryItem,
    QueryStream,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

/// Covers TCP connect and the TDS login handshake.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(4);

/// Reported to the server in the login record.
const APPLICATION_NAME: &str = "runsql";

/// Display size cap for non-character columns.
const MAX_FIXED_DISPLAY_SIZE: usize = 255;

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server connection.
pub struct MsSqlConnection {
    client: TdsClient,
}

impl MsSqlConnection {
    /// Logs in to the server named by the descriptor.
    ///
    /// Host, database, user and password are all required.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let config = build_config(descriptor)?;
        let addr = config.get_addr();
        debug!("Connecting to {}", descriptor.display_string());

        let login = async {
            let tcp = TcpStream::connect(&addr).await.map_err(|e| {
                RunSqlError::connection(Backend::MsSql, format!("Failed to connect to {addr}: {e}"))
            })?;
            tcp.set_nodelay(true).ok();

            TdsClient::connect(config, tcp.compat_write())
                .await
                .map_err(connection_error)
        };

        let client = tokio::time::timeout(LOGIN_TIMEOUT, login)
            .await
            .map_err(|_| {
                RunSqlError::connection(
                    Backend::MsSql,
                    format!("Login timed out after {} seconds", LOGIN_TIMEOUT.as_secs()),
                )
            })??;

        debug!("Successfully logged in to SQL Server");
        Ok(Self { client })
    }
}

#[async_trait]
impl Connection for MsSqlConnection {
    fn backend(&self) -> Backend {
        Backend::MsSql
    }

    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>> {
        let mut stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| query_error(sql, e))?;

        let (columns, arena) = match stream.columns().await.map_err(|e| query_error(sql, e))? {
            Some(native) => (
                native
                    .iter()
                    .enumerate()
                    .map(|(i, col)| Column::new(i, col.name()))
                    .collect(),
                ColumnArena::allocate(native.iter().map(|col| col.column_type())),
            ),
            None => (Vec::new(), ColumnArena::default()),
        };

        Ok(Box::new(MsSqlCursor {
            sql,
            columns,
            arena,
            stream,
            done: false,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await.map_err(connection_error)
    }
}

/// Cursor over the first result set of a TDS query.
struct MsSqlCursor<'c> {
    sql: &'c str,
    columns: Vec<Column>,
    arena: ColumnArena,
    stream: QueryStream<'c>,
    done: bool,
}

#[async_trait]
impl<'c> RowCursor for MsSqlCursor<'c> {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        while !self.done {
            let item = self
                .stream
                .try_next()
                .await
                .map_err(|e| query_error(self.sql, e))?;

            match item {
                None => self.done = true,
                // Later result sets are not part of this query's output.
                Some(QueryItem::Metadata(meta)) if meta.result_index() > 0 => self.done = true,
                Some(QueryItem::Metadata(_)) => {}
                Some(QueryItem::Row(row)) if row.result_index() > 0 => self.done = true,
                Some(QueryItem::Row(row)) => return Ok(Some(self.arena.fetch(&row))),
            }
        }
        Ok(None)
    }
}

/// Outcome of copying one value into its column buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchStatus {
    /// The value fit and is readable from the buffer.
    Regular,
    /// The value is longer than the column buffer.
    BufferFull,
    /// The value could not be read from the row.
    Failed,
}

#[derive(Debug)]
struct ColumnSlot {
    buffer: Vec<u8>,
    /// Display size; zero means variable length, measured per value.
    size: usize,
    is_null: bool,
}

/// Per-execution receive buffers, one per column, plus each column's null flag.
///
/// Dropped together with the cursor, before the connection is closed.
#[derive(Debug, Default)]
pub(crate) struct ColumnArena {
    slots: Vec<ColumnSlot>,
}

impl ColumnArena {
    /// Allocates one buffer per column type, with one byte of slack each.
    pub(crate) fn allocate(types: impl IntoIterator<Item = ColumnType>) -> Self {
        let slots = types
            .into_iter()
            .map(|ty| {
                let size = display_size(ty);
                ColumnSlot {
                    buffer: Vec::with_capacity(size + 1),
                    size,
                    is_null: false,
                }
            })
            .collect();
        Self { slots }
    }

    /// Buffer size for a column, without the slack byte.
    pub(crate) fn size(&self, ordinal: usize) -> Option<usize> {
        self.slots.get(ordinal).map(|slot| slot.size)
    }

    /// Copies one value (or NULL) into its column buffer.
    pub(crate) fn bind(&mut self, ordinal: usize, value: Option<&str>) -> FetchStatus {
        let Some(slot) = self.slots.get_mut(ordinal) else {
            return FetchStatus::Failed;
        };

        slot.buffer.clear();
        let Some(text) = value else {
            slot.is_null = true;
            return FetchStatus::Regular;
        };
        slot.is_null = false;

        let bytes = text.as_bytes();
        let capacity = if slot.size == 0 {
            bytes.len()
        } else {
            slot.size
        };
        if bytes.len() > capacity {
            return FetchStatus::BufferFull;
        }

        slot.buffer.reserve(capacity + 1);
        slot.buffer.extend_from_slice(bytes);
        FetchStatus::Regular
    }

    /// Reads a column buffer back as a cell.
    pub(crate) fn cell(&self, ordinal: usize) -> Cell {
        let slot = self.slots.get(ordinal)?;
        if slot.is_null {
            return None;
        }
        Some(String::from_utf8_lossy(&slot.buffer).into_owned())
    }

    /// Moves one native row through the buffers and returns the result row.
    fn fetch(&mut self, row: &tiberius::Row) -> Row {
        let mut cells = Vec::with_capacity(self.slots.len());

        for (index, (_, data)) in row.cells().enumerate() {
            let status = match render(data) {
                Ok(value) => self.bind(index, value.as_deref()),
                Err(e) => {
                    warn!("Could not read column {}: {e}", index + 1);
                    FetchStatus::Failed
                }
            };
            cells.push(self.cell_for(index, status));
        }

        cells
    }

    fn cell_for(&self, index: usize, status: FetchStatus) -> Cell {
        match status {
            FetchStatus::Regular => self.cell(index),
            FetchStatus::BufferFull => {
                warn!(
                    "Value for column {} exceeds its {}-byte buffer",
                    index + 1,
                    self.size(index).unwrap_or(0)
                );
                Some(format!("BUF_FULL {}", index + 1))
            }
            FetchStatus::Failed => Some(format!("FAIL {}", index + 1)),
        }
    }
}

impl Drop for ColumnArena {
    fn drop(&mut self) {
        if !self.slots.is_empty() {
            debug!("Releasing {} column buffers", self.slots.len());
        }
    }
}

/// Printable width of a column type, the longest text [`render`] produces for
/// it. Character types report zero and are measured per value; everything else
/// is capped at 255.
fn display_size(ty: ColumnType) -> usize {
    let size = match ty {
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml
        | ColumnType::Null => 0,
        ColumnType::Bit | ColumnType::Bitn => 1,
        ColumnType::Int1 => 3,
        ColumnType::Int2 => 6,
        ColumnType::Int4 => 11,
        ColumnType::Int8 | ColumnType::Intn => 20,
        ColumnType::Float4 => 15,
        ColumnType::Float8 | ColumnType::Floatn => 24,
        ColumnType::Money4 => 12,
        ColumnType::Money => 22,
        ColumnType::Decimaln | ColumnType::Numericn => 41,
        ColumnType::Guid => 36,
        ColumnType::Daten => 10,
        ColumnType::Timen => 18,
        ColumnType::Datetime4
        | ColumnType::Datetime
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => 29,
        ColumnType::DatetimeOffsetn => 36,
        _ => usize::MAX,
    };
    size.min(MAX_FIXED_DISPLAY_SIZE)
}

/// Renders one TDS value as text, `None` for NULL.
fn render(data: &ColumnData<'static>) -> tiberius::Result<Option<String>> {
    #[allow(unreachable_patterns)]
    let text = match data {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| format_float(v, 1e7)),
        ColumnData::F64(v) => v.map(|v| format_float(v, 1e15)),
        ColumnData::Bit(v) => v.map(|b| if b { "1" } else { "0" }.to_string()),
        ColumnData::String(v) => v.as_deref().map(str::to_string),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string().to_uppercase()),
        ColumnData::Binary(v) => v.as_deref().map(hex_string),
        ColumnData::Numeric(v) => v.as_ref().map(|n| format_numeric(n.value(), n.scale())),
        ColumnData::Xml(v) => v.as_ref().map(|xml| xml.to_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => {
            NaiveDate::from_sql(data)?.map(|d| d.format("%Y-%m-%d").to_string())
        }
        ColumnData::Time(_) => {
            NaiveTime::from_sql(data)?.map(|t| t.format("%H:%M:%S%.f").to_string())
        }
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f %:z").to_string()),
        _ => {
            return Err(tiberius::error::Error::Conversion(
                "unsupported column data".into(),
            ))
        }
    };
    Ok(text)
}

/// Plain decimal notation between 1e-4 and `max_plain`, exponent form outside.
fn format_float<T>(value: T, max_plain: f64) -> String
where
    T: Copy + Into<f64> + fmt::Display + fmt::LowerExp,
{
    let wide: f64 = value.into();
    let magnitude = wide.abs();
    if wide == 0.0 || !wide.is_finite() || (1e-4..max_plain).contains(&magnitude) {
        value.to_string()
    } else {
        format!("{value:e}")
    }
}

/// Formats a scaled decimal integer exactly, e.g. (-12345, 2) -> "-123.45".
fn format_numeric(value: i128, scale: u8) -> String {
    if scale == 0 {
        return value.to_string();
    }

    let scale = scale as usize;
    let digits = format!("{:0>width$}", value.unsigned_abs(), width = scale + 1);
    let (whole, fraction) = digits.split_at(digits.len() - scale);
    let sign = if value < 0 { "-" } else { "" };
    format!("{sign}{whole}.{fraction}")
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn build_config(descriptor: &ConnectionDescriptor) -> Result<Config> {
    let host = required(descriptor.host.as_deref(), "host")?;
    let database = required(descriptor.database.as_deref(), "database")?;
    let user = required(descriptor.user.as_deref(), "user")?;
    let password = required(descriptor.password.as_deref(), "password")?;

    let mut config = Config::new();
    config.host(host);
    config.port(descriptor.port_or_default().unwrap_or(1433));
    config.database(database);
    config.authentication(AuthMethod::sql_server(user, password));
    config.application_name(APPLICATION_NAME);
    config.encryption(EncryptionLevel::Off);
    config.trust_cert();
    Ok(config)
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        RunSqlError::connection(Backend::MsSql, format!("Connection URL has no {field}"))
    })
}

fn connection_error(error: tiberius::error::Error) -> RunSqlError {
    match error {
        tiberius::error::Error::Server(token) => {
            RunSqlError::connection(Backend::MsSql, token.message())
        }
        other => RunSqlError::connection(Backend::MsSql, other.to_string()),
    }
}

fn query_error(sql: &str, error: tiberius::error::Error) -> RunSqlError {
    match error {
        tiberius::error::Error::Server(token) => {
            RunSqlError::query(Backend::MsSql, sql, token.message())
                .with_code(Some(token.code().to_string()))
        }
        other => RunSqlError::query(Backend::MsSql, sql, other.to_string()),
    }
}
