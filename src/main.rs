//! runsql - run one SQL statement and print the encoded result.

use runsql::cli::Cli;
use runsql::config::{Config, ConnectionConfig, EnvParameters};
use runsql::error::{Result, RunSqlError};
use runsql::logging;
use runsql::params::{keys, Layered, ParamValue};
use runsql::query::{QueryRequest, QueryRunner};
use runsql::report::StderrReporter;
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let sql = cli.read_sql(&mut io::stdin().lock())?;

    // Parameter precedence:
    // 1. CLI arguments (highest)
    // 2. Named connection from config
    // 3. Defaults and default connection from config
    // 4. Environment variables
    // 5. Built-in fallbacks
    let cli_params = cli.to_parameters()?;
    let named = named_connection(&cli, &config)?;
    let fallbacks = fallbacks();
    let params = Layered::new()
        .then(&cli_params)
        .then(&named)
        .then(&config)
        .then(&EnvParameters)
        .then(&fallbacks);

    let timeout = cli
        .timeout()
        .or(config.defaults.timeout.map(Duration::from_secs));
    let request = QueryRequest::from_parameters(sql, &params)?.with_timeout(timeout);
    debug!(
        "Connection: {}",
        ConnectionConfig::from_url(&request.connection_url).display_string()
    );

    let outcome = QueryRunner::new().run(&request, &StderrReporter).await?;

    outcome
        .output
        .write_to(&mut io::stdout().lock())
        .map_err(|e| RunSqlError::encoding(format!("Failed to write output: {e}")))
}

/// The `--connection NAME` entry from the config file, as parameters.
fn named_connection(cli: &Cli, config: &Config) -> Result<HashMap<String, ParamValue>> {
    let mut params = HashMap::new();

    if let Some(name) = cli.connection_name() {
        let connection = config.get_connection(Some(name)).ok_or_else(|| {
            RunSqlError::config(format!("Connection '{name}' not found in config file"))
        })?;
        params.insert(
            keys::CONNECTION_URL.to_string(),
            ParamValue::Text(connection.to_url()?),
        );
    }

    Ok(params)
}

/// Values used when nothing else sets them: no header, no row limit.
fn fallbacks() -> HashMap<String, ParamValue> {
    HashMap::from([
        (keys::HEADERS.to_string(), ParamValue::Bool(false)),
        (keys::ROW_LIMIT.to_string(), ParamValue::Int(0)),
    ])
}
