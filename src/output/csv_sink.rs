//! CSV file sink
//!
//! Records are buffered per page and written in one pass on finalize. The
//! file is produced in a temporary file next to the target and then moved
//! over it, so readers never see a half-written output.

use crate::output::traits::{Sink, SinkError, SinkReport, SinkResult};
use crate::record::{Record, CSV_HEADER};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Sink writing a CSV file with a header row
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    pages: Mutex<BTreeMap<u32, Vec<Record>>>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    fn write_all(&self, pages: &BTreeMap<u32, Vec<Record>>) -> SinkResult<usize> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)?;
        let mut written = 0;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            writer.write_record(CSV_HEADER)?;

            for record in pages.values().flatten() {
                writer.write_record(record.to_csv_row())?;
                written += 1;
            }

            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path)
            .map_err(|e| SinkError::Persist(format!("{}: {}", self.path.display(), e.error)))?;

        Ok(written)
    }
}

impl Sink for CsvSink {
    fn append(&self, page_number: u32, record: Record) -> SinkResult<()> {
        let mut pages = self.pages.lock().map_err(|_| SinkError::Poisoned)?;
        pages.entry(page_number).or_default().push(record);
        Ok(())
    }

    fn append_page(&self, page_number: u32, records: Vec<Record>) -> SinkResult<bool> {
        let mut pages = self.pages.lock().map_err(|_| SinkError::Poisoned)?;

        if pages.contains_key(&page_number) {
            tracing::warn!(page = page_number, "page already buffered, ignoring duplicate");
            return Ok(false);
        }

        pages.insert(page_number, records);
        Ok(true)
    }

    fn finalize(&self) -> SinkResult<SinkReport> {
        let pages = self.pages.lock().map_err(|_| SinkError::Poisoned)?;
        let records_written = self.write_all(&pages)?;

        tracing::info!(
            path = %self.path.display(),
            records = records_written,
            "output written"
        );

        Ok(SinkReport {
            records_written,
            path: Some(self.path.clone()),
        })
    }
}
