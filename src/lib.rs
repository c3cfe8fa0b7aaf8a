//! runsql - run one SQL statement against MySQL, PostgreSQL, SQLite or
//! SQL Server and encode the result as text, CSV, a list or records.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod encode;
pub mod error;
pub mod logging;
pub mod params;
pub mod query;
pub mod report;
