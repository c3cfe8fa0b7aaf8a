//! Count and progress reporting.
//!
//! The query runner tells a [`Reporter`] the final count label and how far it
//! got while reading rows. Reporters cannot fail the query: every method
//! returns nothing and may drop what it is given.

use crate::db::Counts;
use tokio::sync::watch;
use tracing::{debug, info};

/// Receives count labels and progress fractions from the query runner.
pub trait Reporter: Send + Sync {
    /// Called once per successful query with e.g. `Count: 1,204 (100)`.
    fn count_label(&self, label: &str);

    /// Fraction of the expected rows emitted so far, in `[0, 1]`.
    fn progress(&self, fraction: f64);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn count_label(&self, _label: &str) {}

    fn progress(&self, _fraction: f64) {}
}

/// Sends the label to the log at info level and progress at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn count_label(&self, label: &str) {
        info!("{label}");
    }

    fn progress(&self, fraction: f64) {
        debug!("Progress: {:.0}%", fraction * 100.0);
    }
}

/// Writes the label to stderr so it stays out of piped output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn count_label(&self, label: &str) {
        eprintln!("{label}");
    }

    fn progress(&self, _fraction: f64) {}
}

/// Publishes the latest label and progress on `watch` channels.
///
/// Only the most recent value is kept, so a slow receiver misses
/// intermediate updates and senders never wait.
#[derive(Debug)]
pub struct ChannelReporter {
    label: watch::Sender<String>,
    progress: watch::Sender<f64>,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving side.
    pub fn new() -> (Self, ReportReceiver) {
        let (label_tx, label_rx) = watch::channel(String::new());
        let (progress_tx, progress_rx) = watch::channel(0.0);
        (
            Self {
                label: label_tx,
                progress: progress_tx,
            },
            ReportReceiver {
                label: label_rx,
                progress: progress_rx,
            },
        )
    }
}

impl Reporter for ChannelReporter {
    fn count_label(&self, label: &str) {
        self.label.send_replace(label.to_string());
    }

    fn progress(&self, fraction: f64) {
        self.progress.send_replace(fraction.clamp(0.0, 1.0));
    }
}

/// Receiving side of a [`ChannelReporter`].
#[derive(Debug, Clone)]
pub struct ReportReceiver {
    label: watch::Receiver<String>,
    progress: watch::Receiver<f64>,
}

impl ReportReceiver {
    /// Latest count label; empty until one is published.
    pub fn label(&self) -> String {
        self.label.borrow().clone()
    }

    /// Latest progress fraction.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Waits for the next progress update. Returns `None` once the reporter is gone.
    pub async fn progress_changed(&mut self) -> Option<f64> {
        self.progress.changed().await.ok()?;
        Some(*self.progress.borrow_and_update())
    }
}

/// Formats counts for display: `Count: N`, or `Count: N (M)` when only `M`
/// of `N` rows were emitted.
pub fn count_label(counts: Counts) -> String {
    if counts.was_truncated() {
        format!(
            "Count: {} ({})",
            group_thousands(counts.total_seen),
            group_thousands(counts.emitted)
        )
    } else {
        format!("Count: {}", group_thousands(counts.total_seen))
    }
}

/// Formats a number with `,` between groups of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
