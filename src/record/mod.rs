//! Record types flowing through the harvest pipeline
//!
//! Extracted markup becomes a [`RawRecord`] (untrusted text, every field
//! optional). The [`RecordValidator`] is the only way to turn one into a
//! [`Record`], the typed unit the sink writes out.
//!
//! # Components
//!
//! - `PageRequest` / `PageOutcome`: the unit of work and its result
//! - `RawRecord` / `Record`: extracted text and validated data
//! - `validator`: price, availability and rating normalization

mod validator;

pub use validator::{map_availability, map_rating, parse_price, RecordValidator, Rejection};

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A single listing page to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRequest {
    pub page_number: u32,
}

impl PageRequest {
    pub fn new(page_number: u32) -> Self {
        Self { page_number }
    }
}

/// Fields extracted verbatim from one item container
///
/// Absent markup is `None`; nothing here has been trimmed or checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub title: Option<String>,
    pub price_text: Option<String>,
    pub availability_text: Option<String>,
    pub rating_text: Option<String>,
    pub detail_url: Option<String>,
}

/// Stock status of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    InStock,
    OutOfStock,
    Unknown,
}

impl Availability {
    /// Canonical text used in the output file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "In stock",
            Self::OutOfStock => "Out of stock",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses the canonical text back; anything else is `None`
    pub fn from_canonical(s: &str) -> Option<Self> {
        match s {
            "In stock" => Some(Self::InStock),
            "Out of stock" => Some(Self::OutOfStock),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::InStock, Self::OutOfStock, Self::Unknown]
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Star rating, 1 through 5, or unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rating {
    Stars(u8),
    Unknown,
}

impl Rating {
    /// Builds a rating, mapping anything outside 1..=5 to `Unknown`
    pub fn from_stars(stars: u32) -> Self {
        match stars {
            1..=5 => Self::Stars(stars as u8),
            _ => Self::Unknown,
        }
    }

    pub fn stars(&self) -> Option<u8> {
        match self {
            Self::Stars(n) => Some(*n),
            Self::Unknown => None,
        }
    }

    /// Parses the canonical text back; anything else is `None`
    pub fn from_canonical(s: &str) -> Option<Self> {
        if s == "Unknown" {
            return Some(Self::Unknown);
        }
        match s.parse::<u32>() {
            Ok(n @ 1..=5) => Some(Self::Stars(n as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stars(n) => write!(f, "{}", n),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// A validated catalog item
///
/// Only [`RecordValidator`] constructs these from extracted text, so every
/// instance has a non-empty title, a non-negative price and an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub title: String,
    pub price: Decimal,
    pub availability: Availability,
    pub rating: Rating,
    pub url: Url,
}

/// Column order of the output file
pub const CSV_HEADER: [&str; 5] = ["title", "price", "availability", "rating", "url"];

impl Record {
    /// Renders the record as an output row in `CSV_HEADER` order
    pub fn to_csv_row(&self) -> [String; 5] {
        [
            self.title.clone(),
            self.price.to_string(),
            self.availability.as_str().to_string(),
            self.rating.to_string(),
            self.url.to_string(),
        ]
    }

    /// Rebuilds a record from an output row
    pub fn from_csv_row(row: &csv::StringRecord) -> Result<Self, String> {
        if row.len() != CSV_HEADER.len() {
            return Err(format!(
                "expected {} columns, got {}",
                CSV_HEADER.len(),
                row.len()
            ));
        }

        let title = row[0].to_string();
        if title.trim().is_empty() {
            return Err("empty title".to_string());
        }
        let price = Decimal::from_str(&row[1]).map_err(|e| format!("bad price '{}': {}", &row[1], e))?;
        let availability = Availability::from_canonical(&row[2])
            .ok_or_else(|| format!("unknown availability '{}'", &row[2]))?;
        let rating = Rating::from_canonical(&row[3])
            .ok_or_else(|| format!("unknown rating '{}'", &row[3]))?;
        let url = Url::parse(&row[4]).map_err(|e| format!("bad url '{}': {}", &row[4], e))?;

        Ok(Self {
            title,
            price,
            availability,
            rating,
            url,
        })
    }
}

/// Why a page produced no usable result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// 404/410: the page does not exist
    NotFound { status_code: u16 },

    /// Fetch failed after retries, or with a terminal status
    Fetch {
        kind: String,
        status_code: Option<u16>,
    },

    /// Markup could not be interpreted as a listing page
    Parse(String),
}

impl PageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { status_code } => write!(f, "not found (HTTP {})", status_code),
            Self::Fetch {
                kind,
                status_code: Some(code),
            } => write!(f, "{} (HTTP {})", kind, code),
            Self::Fetch {
                kind,
                status_code: None,
            } => f.write_str(kind),
            Self::Parse(message) => write!(f, "parse error: {}", message),
        }
    }
}

/// Everything one worker learned about one page
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page_number: u32,

    /// Accepted records in document order
    pub records: Vec<Record>,

    /// Number of items dropped by validation
    pub rejected: usize,

    pub has_more_pages: bool,

    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn failed(page_number: u32, error: PageError) -> Self {
        Self {
            page_number,
            records: Vec::new(),
            rejected: 0,
            has_more_pages: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
