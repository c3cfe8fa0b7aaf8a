//! Result encoding for runsql.
//!
//! Turns columns and rows into one of four output shapes:
//!
//! - **Raw** (titled "Text"): one string, cells joined by the delimiter, `\n` after every row.
//! - **CSV**: one string, comma-separated, CRLF-terminated, RFC 4180 quoting.
//! - **List**: one string per row, no trailing delimiter or terminator.
//! - **Dictionary**: one name→value record per row, in column order.
//!
//! NULL cells render as the empty string in every format.

mod csv_sink;

use crate::db::{Column, Row};
use crate::error::{Result, RunSqlError};
use csv_sink::CsvSink;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// Output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Delimited text, also accepted as `Text`.
    #[default]
    Raw,
    Csv,
    List,
    Dictionary,
}

impl OutputFormat {
    /// All formats, in menu order.
    pub const ALL: [OutputFormat; 4] = [Self::Raw, Self::Csv, Self::List, Self::Dictionary];

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Raw => "Text",
            Self::Csv => "CSV",
            Self::List => "List",
            Self::Dictionary => "Dictionary",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for OutputFormat {
    type Err = RunSqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "raw" | "text" => Ok(Self::Raw),
            "csv" => Ok(Self::Csv),
            "list" => Ok(Self::List),
            "dictionary" | "dict" => Ok(Self::Dictionary),
            _ => Err(RunSqlError::config(format!(
                "Unknown output format '{s}' (expected text, csv, list or dictionary)"
            ))),
        }
    }
}

/// Options shared by every format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingOptions {
    /// Emit column names first. Ignored by Dictionary.
    pub include_headers: bool,

    /// Field delimiter for Raw and List. CSV always uses `,`.
    pub delimiter: String,

    /// Maximum rows to emit; 0 means unlimited.
    pub row_limit: u64,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            include_headers: false,
            delimiter: "\t".to_string(),
            row_limit: 0,
        }
    }
}

/// One Dictionary row: column name to cell text, in column order.
pub type Record = IndexMap<String, String>;

/// Encoded result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EncodedOutput {
    /// Raw and CSV output.
    Text(String),
    /// List output.
    Lines(Vec<String>),
    /// Dictionary output.
    Records(Vec<Record>),
}

impl EncodedOutput {
    /// Returns true if nothing was encoded.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Lines(lines) => lines.is_empty(),
            Self::Records(records) => records.is_empty(),
        }
    }

    /// Writes the output for a terminal or pipe: text as-is, one list element
    /// per line, records as a JSON array.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Text(text) => out.write_all(text.as_bytes())?,
            Self::Lines(lines) => {
                for line in lines {
                    writeln!(out, "{line}")?;
                }
            }
            Self::Records(_) => {
                serde_json::to_writer_pretty(&mut *out, self)?;
                writeln!(out)?;
            }
        }
        out.flush()
    }
}

enum Sink {
    Raw(String),
    Csv(CsvSink),
    Lines(Vec<String>),
    Records(Vec<Record>),
}

/// Incremental encoder: feed rows one at a time, then call [`Encoder::finish`].
pub struct Encoder {
    columns: Vec<Column>,
    delimiter: String,
    sink: Sink,
}

impl Encoder {
    /// Creates an encoder and writes the header, if any.
    ///
    /// A result without columns produces no header and ignores every row.
    pub fn new(columns: &[Column], format: OutputFormat, options: &EncodingOptions) -> Result<Self> {
        let headers = options.include_headers && !columns.is_empty();
        let delimiter = options.delimiter.clone();

        let sink = match format {
            OutputFormat::Raw => {
                let mut text = String::new();
                if headers {
                    text.push_str(&join_names(columns, &delimiter));
                    text.push('\n');
                }
                Sink::Raw(text)
            }
            OutputFormat::Csv => CsvSink::new(headers.then_some(columns)).map(Sink::Csv)?,
            OutputFormat::List => {
                let mut lines = Vec::new();
                if headers {
                    lines.push(join_names(columns, &delimiter));
                }
                Sink::Lines(lines)
            }
            OutputFormat::Dictionary => Sink::Records(Vec::new()),
        };

        Ok(Self {
            columns: columns.to_vec(),
            delimiter,
            sink,
        })
    }

    /// Encodes one row.
    pub fn push(&mut self, row: &Row) -> Result<()> {
        if self.columns.is_empty() {
            return Ok(());
        }

        match &mut self.sink {
            Sink::Raw(text) => {
                text.push_str(&join_cells(row, &self.delimiter));
                text.push('\n');
            }
            Sink::Csv(csv) => csv.write_row(row)?,
            Sink::Lines(lines) => lines.push(join_cells(row, &self.delimiter)),
            Sink::Records(records) => records.push(to_record(&self.columns, row)?),
        }
        Ok(())
    }

    /// Returns the encoded output.
    pub fn finish(self) -> Result<EncodedOutput> {
        Ok(match self.sink {
            Sink::Raw(text) => EncodedOutput::Text(text),
            Sink::Csv(csv) => EncodedOutput::Text(csv.finish()?),
            Sink::Lines(lines) => EncodedOutput::Lines(lines),
            Sink::Records(records) => EncodedOutput::Records(records),
        })
    }
}

/// Encodes a complete result in one call.
///
/// Applies no row limit: callers pass the rows that should be emitted.
pub fn encode<'r>(
    columns: &[Column],
    rows: impl IntoIterator<Item = &'r Row>,
    format: OutputFormat,
    options: &EncodingOptions,
) -> Result<EncodedOutput> {
    let mut encoder = Encoder::new(columns, format, options)?;
    for row in rows {
        encoder.push(row)?;
    }
    encoder.finish()
}

fn join_names(columns: &[Column], delimiter: &str) -> String {
    columns
        .iter()
        .map(|col| col.name.as_str())
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn join_cells(row: &Row, delimiter: &str) -> String {
    row.iter()
        .map(|cell| cell.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Builds a record; a repeated column name keeps its first position and the
/// later value.
fn to_record(columns: &[Column], row: &Row) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());
    for (index, cell) in row.iter().enumerate() {
        let column = columns.get(index).ok_or_else(|| {
            RunSqlError::encoding(format!(
                "Row has {} cells but the result has {} columns",
                row.len(),
                columns.len()
            ))
        })?;
        record.insert(column.name.clone(), cell.clone().unwrap_or_default());
    }
    Ok(record)
}
