//! Integration tests for runsql.

pub mod connection_test;
pub mod runner_test;
pub mod sqlite_test;
