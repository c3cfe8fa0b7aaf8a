//! Result model shared by every backend.
//!
//! Adapters convert their native column metadata and row values into these
//! types; the limiter and encoder never see anything driver-specific.

use serde::{Deserialize, Serialize};

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Zero-based position in the result.
    pub ordinal: usize,

    /// Column name as reported by the driver. May be empty.
    pub name: String,
}

impl Column {
    /// Creates a new column with the given ordinal and name.
    pub fn new(ordinal: usize, name: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
        }
    }

    /// Builds a column list from names, assigning ordinals in order.
    pub fn from_names<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Self::new(i, name))
            .collect()
    }
}

/// A single cell. `None` is SQL NULL; anything else is the driver's text.
pub type Cell = Option<String>;

/// A row of cells, one per column.
pub type Row = Vec<Cell>;

/// Row counters maintained while a cursor is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Rows produced by the backend.
    pub total_seen: u64,

    /// Rows handed to the encoder.
    pub emitted: u64,
}

impl Counts {
    /// Returns true if some rows were seen but not emitted.
    pub fn was_truncated(&self) -> bool {
        self.total_seen > self.emitted
    }
}
