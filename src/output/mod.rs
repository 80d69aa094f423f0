//! Output module for writing harvested records and run reports
//!
//! This module handles:
//! - Buffering validated records and writing them to CSV atomically
//! - Summarizing a finished run
//! - Reading an output file back for statistics

mod csv_sink;
pub mod stats;
mod summary;
mod traits;

pub use csv_sink::CsvSink;
pub use stats::{load_statistics, print_statistics, read_records, OutputStatistics};
pub use summary::{print_summary, RunSummary};
pub use traits::{Sink, SinkError, SinkReport, SinkResult};
