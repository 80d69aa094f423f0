//! Sink trait and error types
//!
//! A sink collects validated records from every worker's page and writes
//! them out once, at the end of the run. Implementations must be
//! thread-safe; the coordinator holds them behind an `Arc<dyn Sink>`.

use crate::record::Record;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while buffering or writing records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to move output into place: {0}")]
    Persist(String),

    #[error("Record buffer lock poisoned")]
    Poisoned,

    #[error("Malformed output at line {line}: {message}")]
    Malformed { line: u64, message: String },
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// What a successful finalize produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// Number of data rows written
    pub records_written: usize,

    /// Where the output ended up, for file-backed sinks
    pub path: Option<PathBuf>,
}

/// Destination for validated records
pub trait Sink: Send + Sync {
    /// Buffers one record belonging to `page_number`
    fn append(&self, page_number: u32, record: Record) -> SinkResult<()>;

    /// Buffers a whole page of records in document order
    ///
    /// A page is only taken once; a repeated page is ignored and `false`
    /// returned.
    fn append_page(&self, page_number: u32, records: Vec<Record>) -> SinkResult<bool>;

    /// Writes everything buffered so far
    ///
    /// Output is ordered by page number, then by position within the page.
    fn finalize(&self) -> SinkResult<SinkReport>;
}
