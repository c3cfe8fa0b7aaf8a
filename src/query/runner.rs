//! The query runner.
//!
//! Drives one request through a fixed sequence of stages:
//!
//! ```text
//! Idle -> DescriptorParsed -> AdapterSelected -> Connected -> Executed -> Encoded -> Closed
//! ```
//!
//! Any stage can fail. Once a connection is open it is closed exactly once,
//! whether the query succeeded, failed or ran out of time.

use super::limiter::{LimitPolicy, RowLimiter};
use super::QueryRequest;
use crate::db::{Backend, Column, Connection, ConnectionDescriptor, Connector, Counts, NativeConnector};
use crate::encode::{EncodedOutput, Encoder};
use crate::error::{Result, RunSqlError};
use crate::params::ParameterSource;
use crate::report::{count_label, Reporter};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// The encoded rows.
    pub output: EncodedOutput,

    /// Rows seen versus rows emitted.
    pub counts: Counts,

    /// Result columns.
    pub columns: Vec<Column>,

    pub backend: Backend,

    /// Time from connect to close.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    DescriptorParsed,
    AdapterSelected,
    Connected,
    Executed,
    Encoded,
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DescriptorParsed => "descriptor parsed",
            Self::AdapterSelected => "adapter selected",
            Self::Connected => "connected",
            Self::Executed => "executed",
            Self::Encoded => "encoded",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Query stage: {} -> {}", stage, next);
    *stage = next;
}

/// Runs queries through a [`Connector`].
#[derive(Clone)]
pub struct QueryRunner {
    connector: Arc<dyn Connector>,
    policy: LimitPolicy,
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRunner {
    /// Creates a runner using the native database drivers.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(NativeConnector))
    }

    /// Creates a runner that opens connections through `connector`.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            policy: LimitPolicy::CountThrough,
        }
    }

    /// Sets the row limit policy (count-through by default).
    pub fn with_policy(mut self, policy: LimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds a request from parameters and runs it.
    pub async fn run_with_parameters(
        &self,
        sql: &str,
        params: &dyn ParameterSource,
        reporter: &dyn Reporter,
    ) -> Result<QueryOutcome> {
        let request = QueryRequest::from_parameters(sql, params)?;
        self.run(&request, reporter).await
    }

    /// Runs one request.
    ///
    /// On success the count label and a final progress of 1.0 go to
    /// `reporter`. On failure nothing is reported and no partial output is
    /// returned.
    pub async fn run(&self, request: &QueryRequest, reporter: &dyn Reporter) -> Result<QueryOutcome> {
        let mut stage = Stage::Idle;
        let result = self.run_stages(request, reporter, &mut stage).await;

        match &result {
            Ok(outcome) => {
                debug!("{} query finished in {:?}", outcome.backend, outcome.elapsed);
                reporter.progress(1.0);
                reporter.count_label(&count_label(outcome.counts));
            }
            Err(e) => warn!("Query failed after stage '{stage}': {e}"),
        }
        result
    }

    async fn run_stages(
        &self,
        request: &QueryRequest,
        reporter: &dyn Reporter,
        stage: &mut Stage,
    ) -> Result<QueryOutcome> {
        let descriptor = ConnectionDescriptor::parse(&request.connection_url)?;
        advance(stage, Stage::DescriptorParsed);

        let backend = descriptor.backend;
        debug!("Selected {backend} adapter for {}", descriptor.display_string());
        advance(stage, Stage::AdapterSelected);

        let started = Instant::now();
        let mut connection = self.connector.connect(&descriptor).await?;
        advance(stage, Stage::Connected);

        let fetched = match request.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.fetch(connection.as_mut(), request, reporter, stage))
                    .await
                    .unwrap_or_else(|_| Err(timed_out(backend, &request.sql, limit)))
            }
            None => self.fetch(connection.as_mut(), request, reporter, stage).await,
        };

        // The cursor is gone by now, so the connection can be released.
        match connection.close().await {
            Ok(()) if fetched.is_ok() => advance(stage, Stage::Closed),
            Ok(()) => debug!("Connection closed after failure"),
            Err(e) => warn!("Failed to close {backend} connection: {e}"),
        }

        let (output, counts, columns) = fetched?;
        Ok(QueryOutcome {
            output,
            counts,
            columns,
            backend,
            elapsed: started.elapsed(),
        })
    }

    /// Executes the statement and encodes its rows.
    async fn fetch(
        &self,
        connection: &mut dyn Connection,
        request: &QueryRequest,
        reporter: &dyn Reporter,
        stage: &mut Stage,
    ) -> Result<(EncodedOutput, Counts, Vec<Column>)> {
        let mut cursor = connection.execute(&request.sql).await?;
        advance(stage, Stage::Executed);

        let columns = cursor.columns().to_vec();
        debug!("Result columns: {}", columns.len());

        let limit = request.options.row_limit;
        let mut encoder = Encoder::new(&columns, request.format, &request.options)?;
        let mut limiter = RowLimiter::new(cursor.as_mut(), limit, self.policy);

        while let Some(row) = limiter.next().await? {
            encoder.push(&row)?;
            if limit > 0 {
                reporter.progress(limiter.counts().emitted as f64 / limit as f64);
            }
        }

        let counts = limiter.counts();
        let output = encoder.finish()?;
        advance(stage, Stage::Encoded);
        Ok((output, counts, columns))
    }
}

fn timed_out(backend: Backend, sql: &str, limit: Duration) -> RunSqlError {
    RunSqlError::query(
        backend,
        sql,
        format!("timed out after {}s", limit.as_secs_f64()),
    )
}
