//! Validation boundary between extracted text and typed records
//!
//! Rules:
//!
//! | Field | Bad input | Result |
//! |-------|-----------|--------|
//! | title | empty / absent | Rejection (`missing title`) |
//! | price | unparsable / negative / absent | Rejection (`bad price`) |
//! | url | unresolvable / absent | Rejection (`bad url`) |
//! | availability | unrecognized | `Availability::Unknown` |
//! | rating | out of range / unparsable | `Rating::Unknown` |

use crate::record::{Availability, RawRecord, Rating, Record};
use crate::url::resolve_url;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Why an extracted item was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing title")]
    MissingTitle,

    #[error("bad price: {raw:?}")]
    BadPrice { raw: Option<String> },

    #[error("bad url: {raw:?} ({reason})")]
    BadUrl { raw: Option<String>, reason: String },
}

impl Rejection {
    /// Short, fixed reason used in logs and counters
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing title",
            Self::BadPrice { .. } => "bad price",
            Self::BadUrl { .. } => "bad url",
        }
    }
}

/// Turns `RawRecord`s into `Record`s for one listing page
#[derive(Debug, Clone)]
pub struct RecordValidator {
    base_url: Url,
}

impl RecordValidator {
    /// Creates a validator resolving relative links against `base_url`
    /// (normally the URL of the page the items came from)
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Validates and normalizes one extracted item
    pub fn validate(&self, raw: &RawRecord) -> Result<Record, Rejection> {
        let title = raw
            .title
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .ok_or(Rejection::MissingTitle)?;

        let price = raw
            .price_text
            .as_deref()
            .and_then(parse_price)
            .ok_or_else(|| Rejection::BadPrice {
                raw: raw.price_text.clone(),
            })?;

        let url = match raw.detail_url.as_deref() {
            Some(href) => resolve_url(&self.base_url, href).map_err(|e| Rejection::BadUrl {
                raw: Some(href.to_string()),
                reason: e.to_string(),
            })?,
            None => {
                return Err(Rejection::BadUrl {
                    raw: None,
                    reason: "no link".to_string(),
                })
            }
        };

        let availability = raw
            .availability_text
            .as_deref()
            .map(map_availability)
            .unwrap_or(Availability::Unknown);

        let rating = raw
            .rating_text
            .as_deref()
            .map(map_rating)
            .unwrap_or(Rating::Unknown);

        Ok(Record {
            title,
            price,
            availability,
            rating,
            url,
        })
    }
}

/// Characters a price may carry around its number
const PRICE_DECORATION: &[char] = &['£', '$', '€', '¥', 'Â'];

/// Parses a price such as `£51.77` or `Â£1,299.00` into a non-negative decimal
///
/// Only currency symbols, encoding debris, thousands separators and
/// surrounding whitespace are dropped. Any other character makes the text
/// unparseable, as does a negative value.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let stripped: String = text
        .chars()
        .filter(|c| !PRICE_DECORATION.contains(c))
        .collect();

    let (negative, number) = match stripped.trim().strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, stripped.trim()),
    };

    let valid_chars = number
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ',');
    if !valid_chars || !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value = Decimal::from_str(&number.replace(',', "")).ok()?;
    if negative && !value.is_zero() {
        return None;
    }

    Some(value)
}

const OUT_OF_STOCK_MARKERS: &[&str] = &["out of stock", "sold out", "unavailable"];
const IN_STOCK_MARKERS: &[&str] = &["in stock", "available"];

/// Maps free availability text to the fixed vocabulary
///
/// Out-of-stock markers are checked first so "unavailable" never reads as
/// "available".
pub fn map_availability(text: &str) -> Availability {
    let normalized = collapse_whitespace(text).to_lowercase();

    if OUT_OF_STOCK_MARKERS.iter().any(|m| normalized.contains(m)) {
        Availability::OutOfStock
    } else if IN_STOCK_MARKERS.iter().any(|m| normalized.contains(m)) {
        Availability::InStock
    } else {
        Availability::Unknown
    }
}

/// Maps a rating indicator (`Three`, `3`, `star-rating Four`) to 1..=5
pub fn map_rating(text: &str) -> Rating {
    for token in text.split_whitespace() {
        let stars = match token.to_ascii_lowercase().as_str() {
            "zero" => Some(0),
            "one" => Some(1),
            "two" => Some(2),
            "three" => Some(3),
            "four" => Some(4),
            "five" => Some(5),
            other => other.parse::<u32>().ok(),
        };

        if let Some(stars) = stars {
            return Rating::from_stars(stars);
        }
    }

    Rating::Unknown
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
