//! End-of-run summary
//!
//! The coordinator fills in a [`RunSummary`] as outcomes arrive; it is
//! logged when the run ends and optionally printed for the operator.

use crate::state::{AbortReason, RunState};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Counters and final state of one harvest run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub abort_reason: Option<AbortReason>,

    /// Page numbers placed on the work queue
    pub pages_enqueued: u64,

    /// Pages that produced an outcome (success or failure)
    pub pages_completed: u64,
    pub pages_succeeded: u64,
    pub pages_failed: u64,

    /// Pages fetched past the discovered last page
    pub pages_discarded: u64,

    pub records_accepted: u64,
    pub records_rejected: u64,
    pub records_written: usize,

    pub output_path: Option<PathBuf>,

    /// Set when the final write failed
    pub write_error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: RunState::Idle,
            abort_reason: None,
            pages_enqueued: 0,
            pages_completed: 0,
            pages_succeeded: 0,
            pages_failed: 0,
            pages_discarded: 0,
            records_accepted: 0,
            records_rejected: 0,
            records_written: 0,
            output_path: None,
            write_error: None,
            started_at,
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Failed pages as a fraction of completed pages
    pub fn failure_ratio(&self) -> f64 {
        if self.pages_completed == 0 {
            return 0.0;
        }
        self.pages_failed as f64 / self.pages_completed as f64
    }

    /// Emits the summary as one structured event
    pub fn log(&self) {
        let reason = self.abort_reason.as_ref().map(|r| r.to_string());

        if self.is_success() {
            tracing::info!(
                state = %self.state,
                pages_completed = self.pages_completed,
                pages_succeeded = self.pages_succeeded,
                pages_failed = self.pages_failed,
                records_written = self.records_written,
                records_rejected = self.records_rejected,
                duration_secs = self.duration_seconds().unwrap_or_default(),
                "run finished"
            );
        } else {
            tracing::error!(
                state = %self.state,
                reason = reason.as_deref().unwrap_or("unknown"),
                pages_completed = self.pages_completed,
                pages_succeeded = self.pages_succeeded,
                pages_failed = self.pages_failed,
                records_written = self.records_written,
                records_rejected = self.records_rejected,
                write_error = self.write_error.as_deref(),
                "run aborted"
            );
        }
    }
}

/// Prints the summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Run:");
    println!("  State: {}", summary.state);
    if let Some(reason) = &summary.abort_reason {
        println!("  Reason: {}", reason);
    }
    println!("  Started: {}", summary.started_at.to_rfc3339());
    if let Some(duration) = summary.duration_seconds() {
        println!("  Duration: {:.1}s", duration);
    }
    println!();

    println!("Pages:");
    println!("  Enqueued: {}", summary.pages_enqueued);
    println!("  Completed: {}", summary.pages_completed);
    println!("  Succeeded: {}", summary.pages_succeeded);
    println!(
        "  Failed: {} ({:.1}%)",
        summary.pages_failed,
        summary.failure_ratio() * 100.0
    );
    if summary.pages_discarded > 0 {
        println!("  Discarded past last page: {}", summary.pages_discarded);
    }
    println!();

    println!("Records:");
    println!("  Accepted: {}", summary.records_accepted);
    println!("  Rejected: {}", summary.records_rejected);
    println!("  Written: {}", summary.records_written);
    if let Some(path) = &summary.output_path {
        println!("  Output: {}", path.display());
    }
    if let Some(error) = &summary.write_error {
        println!("  Write error: {}", error);
    }
}
