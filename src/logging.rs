//! Logging configuration for runsql.
//!
//! Logs go to stderr so that stdout carries only the encoded result.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset. The TDS driver is chatty at info level.
pub const DEFAULT_FILTER: &str = "info,tiberius=warn";

/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "debug,tiberius=info";

/// Returns the filter directive for the given verbosity.
pub fn filter_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Initializes logging to stderr.
///
/// `RUST_LOG` wins over `verbose`. Calling this more than once is harmless:
/// later calls leave the first subscriber in place.
pub fn init_stderr_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
