//! Query parameters.
//!
//! A [`ParameterSource`] hands the runner its settings by key. Sources can be
//! layered so that, for example, command-line values win over config file
//! defaults.

use crate::error::{Result, RunSqlError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Parameter keys.
pub mod keys {
    /// Connection URL or SQLite path (text, required).
    pub const CONNECTION_URL: &str = "connectionURL";
    /// Maximum rows to emit, 0 for all (integer, required).
    pub const ROW_LIMIT: &str = "rowLimit";
    /// Whether to emit a header (bool, required).
    pub const HEADERS: &str = "headers";
    /// Output format title (text, optional, default `Text`).
    pub const OUTPUT_FORMAT: &str = "outputFormat";
    /// Field delimiter (text, optional, default tab).
    pub const DELIMITER: &str = "delimiter";
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Supplies parameter values by key.
///
/// Implementors provide `lookup`; the typed accessors treat a value of the
/// wrong type the same as a missing one.
pub trait ParameterSource {
    /// Returns the value for `key`, if present.
    fn lookup(&self, key: &str) -> Option<ParamValue>;

    /// Returns the value for `key` or a missing parameter error.
    fn get(&self, key: &str) -> Result<ParamValue> {
        self.lookup(key)
            .ok_or_else(|| RunSqlError::missing(key, "not provided"))
    }

    fn text(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            ParamValue::Text(s) => Ok(s),
            other => Err(wrong_type(key, "text", &other)),
        }
    }

    fn integer(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            ParamValue::Int(n) => Ok(n),
            other => Err(wrong_type(key, "integer", &other)),
        }
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            ParamValue::Bool(b) => Ok(b),
            other => Err(wrong_type(key, "bool", &other)),
        }
    }

    /// Like [`ParameterSource::text`], but absence is not an error.
    fn optional_text(&self, key: &str) -> Result<Option<String>> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_type(key, "text", &other)),
        }
    }
}

fn wrong_type(key: &str, expected: &str, found: &ParamValue) -> RunSqlError {
    RunSqlError::missing(
        key,
        format!("expected {expected}, found {}", found.type_name()),
    )
}

impl ParameterSource for HashMap<String, ParamValue> {
    fn lookup(&self, key: &str) -> Option<ParamValue> {
        HashMap::get(self, key).cloned()
    }
}

impl<T: ParameterSource + ?Sized> ParameterSource for &T {
    fn lookup(&self, key: &str) -> Option<ParamValue> {
        (**self).lookup(key)
    }
}

/// Several sources consulted in order; the first one with a key wins.
#[derive(Default)]
pub struct Layered<'a> {
    layers: Vec<&'a dyn ParameterSource>,
}

impl<'a> Layered<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source below the ones already added.
    pub fn then(mut self, source: &'a dyn ParameterSource) -> Self {
        self.layers.push(source);
        self
    }
}

impl ParameterSource for Layered<'_> {
    fn lookup(&self, key: &str) -> Option<ParamValue> {
        self.layers.iter().find_map(|layer| layer.lookup(key))
    }
}
