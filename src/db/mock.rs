//! Mock connector for testing.
//!
//! Serves a scripted result set from memory and counts every connect, execute
//! and close, so the query runner can be tested headless without a server.

use super::{Backend, Column, Connection, ConnectionDescriptor, Connector, Row, RowCursor};
use crate::error::{Result, RunSqlError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters shared between a [`MockConnector`] and the connections it opens.
#[derive(Debug, Default)]
pub struct MockStats {
    connect_attempts: AtomicUsize,
    opened: AtomicUsize,
    executes: AtomicUsize,
    closed: AtomicUsize,
}

impl MockStats {
    /// Calls to `Connector::connect`, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Calls to `Connection::close`, including failing ones.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
struct Script {
    columns: Vec<Column>,
    rows: Vec<Row>,
    fail_connect: bool,
    fail_execute: bool,
    fail_at_row: Option<usize>,
    fail_close: bool,
    report_total: bool,
    row_delay: Option<Duration>,
}

/// A connector whose connections return predefined results.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Script>,
    stats: Arc<MockStats>,
}

impl MockConnector {
    /// Creates a connector serving the given columns and rows.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Row>) -> Self {
        Self {
            script: Arc::new(Script {
                columns: Column::from_names(columns),
                rows,
                ..Script::default()
            }),
            stats: Arc::default(),
        }
    }

    /// Convenience for tests: rows written as string slices.
    pub fn with_text_rows(columns: &[&str], rows: &[&[Option<&str>]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
            .collect();
        Self::new(columns.iter().copied(), rows)
    }

    /// Makes every connect attempt fail.
    pub fn fail_connect(self) -> Self {
        self.edit(|s| s.fail_connect = true)
    }

    /// Makes `execute` fail.
    pub fn fail_execute(self) -> Self {
        self.edit(|s| s.fail_execute = true)
    }

    /// Makes fetching the row at this zero-based index fail.
    pub fn fail_at_row(self, index: usize) -> Self {
        self.edit(|s| s.fail_at_row = Some(index))
    }

    /// Makes `close` return an error (after counting it).
    pub fn fail_close(self) -> Self {
        self.edit(|s| s.fail_close = true)
    }

    /// Makes cursors report their row count up front.
    pub fn report_total(self) -> Self {
        self.edit(|s| s.report_total = true)
    }

    /// Sleeps before yielding each row.
    pub fn row_delay(self, delay: Duration) -> Self {
        self.edit(|s| s.row_delay = Some(delay))
    }

    /// Returns the shared counters.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    fn edit(mut self, f: impl FnOnce(&mut Script)) -> Self {
        f(Arc::make_mut(&mut self.script));
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>> {
        self.stats.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_connect {
            return Err(RunSqlError::connection(
                descriptor.backend,
                "mock connection refused",
            ));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            backend: descriptor.backend,
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockConnection {
    backend: Backend,
    script: Arc<Script>,
    stats: Arc<MockStats>,
}

#[async_trait]
impl Connection for MockConnection {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn RowCursor + 'c>> {
        self.stats.executes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_execute {
            return Err(RunSqlError::query(self.backend, sql, "mock syntax error")
                .with_code(Some("42000".to_string())));
        }

        Ok(Box::new(MockCursor {
            backend: self.backend,
            sql,
            script: &self.script,
            position: 0,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close {
            return Err(RunSqlError::connection(self.backend, "mock close failed"));
        }
        Ok(())
    }
}

struct MockCursor<'c> {
    backend: Backend,
    sql: &'c str,
    script: &'c Script,
    position: usize,
}

#[async_trait]
impl<'c> RowCursor for MockCursor<'c> {
    fn columns(&self) -> &[Column] {
        &self.script.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(delay) = self.script.row_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.fail_at_row == Some(self.position) {
            return Err(RunSqlError::query(
                self.backend,
                self.sql,
                format!("mock fetch failed at row {}", self.position),
            ));
        }

        let row = self.script.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn known_total(&self) -> Option<u64> {
        self.script
            .report_total
            .then_some(self.script.rows.len() as u64)
    }
}
