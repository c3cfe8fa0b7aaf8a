//! CSV writer.
//!
//! Header names are always quoted; data cells are quoted only when they hold a
//! quote, comma, CR or LF. Records end with CRLF.

use crate::db::{Column, Row};
use crate::error::{Result, RunSqlError};
use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};

/// Accumulates CSV text for one result.
pub(crate) struct CsvSink {
    /// Always `Some` between calls; taken while a bare line is appended.
    writer: Option<Writer<Vec<u8>>>,
}

impl CsvSink {
    /// Starts a document, writing the header line first when columns are given.
    pub(crate) fn new(header: Option<&[Column]>) -> Result<Self> {
        let mut buffer = Vec::new();

        if let Some(columns) = header {
            let mut header_writer = builder(QuoteStyle::Always).from_writer(Vec::new());
            header_writer
                .write_record(columns.iter().map(|col| col.name.as_str()))
                .map_err(|e| RunSqlError::encoding(format!("Failed to write CSV header: {e}")))?;
            buffer = header_writer
                .into_inner()
                .map_err(|e| RunSqlError::encoding(format!("Failed to write CSV header: {e}")))?;
        }

        Ok(Self {
            writer: Some(data_writer(buffer)),
        })
    }

    /// Appends one data record. NULL cells are written as empty fields.
    pub(crate) fn write_row(&mut self, row: &Row) -> Result<()> {
        // A lone empty field is written as a bare line, not as `""`.
        if let [cell] = row.as_slice() {
            if cell.as_deref().unwrap_or("").is_empty() {
                let mut buffer = self.take_buffer()?;
                buffer.extend_from_slice(b"\r\n");
                self.writer = Some(data_writer(buffer));
                return Ok(());
            }
        }

        self.writer
            .as_mut()
            .ok_or_else(closed_error)?
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .map_err(|e| RunSqlError::encoding(format!("Failed to write CSV row: {e}")))
    }

    /// Returns the finished document.
    pub(crate) fn finish(mut self) -> Result<String> {
        let bytes = self.take_buffer()?;
        String::from_utf8(bytes).map_err(|e| RunSqlError::encoding(e.to_string()))
    }

    /// Flushes the writer and hands back everything written so far.
    fn take_buffer(&mut self) -> Result<Vec<u8>> {
        self.writer
            .take()
            .ok_or_else(closed_error)?
            .into_inner()
            .map_err(|e| RunSqlError::encoding(format!("Failed to flush CSV output: {}", e.error())))
    }
}

fn data_writer(buffer: Vec<u8>) -> Writer<Vec<u8>> {
    builder(QuoteStyle::Necessary).from_writer(buffer)
}

fn builder(style: QuoteStyle) -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b',')
        .terminator(Terminator::CRLF)
        .quote_style(style)
        .flexible(true);
    builder
}

fn closed_error() -> RunSqlError {
    RunSqlError::encoding("CSV output already finished")
}
