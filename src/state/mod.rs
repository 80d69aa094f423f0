//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `RunState`: lifecycle of a whole run (idle, dispatching, draining, finalized, aborted)
//! - `AbortReason`: why a run ended in `Aborted`

mod run_state;

// Re-export main types
pub use run_state::{AbortReason, RunState};
