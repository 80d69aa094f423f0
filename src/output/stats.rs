//! Statistics over a written output file
//!
//! This module reads a CSV produced by [`CsvSink`](super::CsvSink) back into
//! records and summarizes it for display.

use crate::output::traits::{SinkError, SinkResult};
use crate::record::{Availability, Rating, Record, CSV_HEADER};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Output file statistics summary
#[derive(Debug, Clone, Default)]
pub struct OutputStatistics {
    /// Number of data rows
    pub total_records: u64,

    /// Count of records by availability
    pub by_availability: HashMap<Availability, u64>,

    /// Count of records by rating
    pub by_rating: BTreeMap<Rating, u64>,

    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub mean_price: Option<Decimal>,
}

impl OutputStatistics {
    /// Builds statistics from records
    pub fn from_records(records: &[Record]) -> Self {
        let mut stats = Self {
            total_records: records.len() as u64,
            ..Self::default()
        };

        // None once the running sum leaves Decimal's range
        let mut total = Some(Decimal::ZERO);
        for record in records {
            *stats.by_availability.entry(record.availability).or_insert(0) += 1;
            *stats.by_rating.entry(record.rating).or_insert(0) += 1;

            stats.min_price = Some(stats.min_price.map_or(record.price, |p| p.min(record.price)));
            stats.max_price = Some(stats.max_price.map_or(record.price, |p| p.max(record.price)));
            total = total.and_then(|t| t.checked_add(record.price));
        }

        if !records.is_empty() {
            stats.mean_price = total
                .and_then(|t| t.checked_div(Decimal::from(records.len())))
                .map(|mean| mean.round_dp(2));
        }

        stats
    }
}

/// Reads an output file back into records
///
/// The header must match the column order the sink writes. Row errors carry
/// the line number they were found on.
pub fn read_records(path: &Path) -> SinkResult<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    if !headers.iter().eq(CSV_HEADER.iter().copied()) {
        return Err(SinkError::Malformed {
            line: 1,
            message: format!("unexpected header: {:?}", headers),
        });
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let record =
            Record::from_csv_row(&row).map_err(|message| SinkError::Malformed { line, message })?;
        records.push(record);
    }

    Ok(records)
}

/// Loads statistics from an output file
pub fn load_statistics(path: &Path) -> SinkResult<OutputStatistics> {
    let records = read_records(path)?;
    Ok(OutputStatistics::from_records(&records))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &OutputStatistics) {
    println!("=== Output Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!();

    println!("Availability:");
    for availability in Availability::all() {
        let count = stats.by_availability.get(&availability).copied().unwrap_or(0);
        println!(
            "  {}: {} ({:.1}%)",
            availability,
            count,
            percentage(count, stats.total_records)
        );
    }
    println!();

    println!("Rating:");
    for (rating, count) in &stats.by_rating {
        println!(
            "  {}: {} ({:.1}%)",
            rating,
            count,
            percentage(*count, stats.total_records)
        );
    }
    println!();

    if let (Some(min), Some(max)) = (stats.min_price, stats.max_price) {
        println!("Price:");
        println!("  Min: {}", min);
        println!("  Max: {}", max);
        match stats.mean_price {
            Some(mean) => println!("  Mean: {}", mean),
            None => println!("  Mean: n/a (sum out of range)"),
        }
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64) * 100.0
}
