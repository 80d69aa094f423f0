/// Run state definitions for tracking harvest progress
///
/// A run moves `Idle → Dispatching → Draining → Finalized`. Any non-terminal
/// state may move to `Aborted`.
use std::fmt;

/// Represents the current state of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    // ===== Active States =====
    /// Run has been configured but no page has been enqueued
    Idle,

    /// Pages are being enqueued and processed
    Dispatching,

    /// No more pages will be enqueued; waiting for in-flight pages
    Draining,

    // ===== Terminal States =====
    /// All pages were handled and the output file was written
    Finalized,

    /// A fatal-error threshold tripped, the run was interrupted, or the
    /// output could not be written
    Aborted,
}

impl RunState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    /// Returns true if the run finished without aborting
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Dispatching) => true,
            (Self::Dispatching, Self::Draining) => true,
            (Self::Draining, Self::Finalized) => true,
            (from, Self::Aborted) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a run ended in `RunState::Aborted`
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// Too many page failures in a row
    ConsecutiveFailures { count: u32, limit: u32 },

    /// Too large a share of completed pages failed
    FailureRatio { failed: u64, completed: u64, limit: f64 },

    /// The cancellation token was triggered from outside (e.g. Ctrl-C)
    Interrupted,

    /// The output file could not be written
    SinkFailed(String),

    /// A worker task panicked
    WorkerFailed(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsecutiveFailures { count, limit } => write!(
                f,
                "{} consecutive page failures (limit {})",
                count, limit
            ),
            Self::FailureRatio {
                failed,
                completed,
                limit,
            } => write!(
                f,
                "{} of {} pages failed (limit {:.0}%)",
                failed,
                completed,
                limit * 100.0
            ),
            Self::Interrupted => write!(f, "interrupted"),
            Self::SinkFailed(message) => write!(f, "output write failed: {}", message),
            Self::WorkerFailed(message) => write!(f, "worker failed: {}", message),
        }
    }
}
