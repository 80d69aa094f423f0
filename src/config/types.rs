use serde::Deserialize;

/// Main configuration structure for Catalog-Harvest
///
/// Every section and key has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub http: HttpConfig,
    pub limits: LimitsConfig,
    pub selectors: SelectorConfig,
    pub output: OutputConfig,
}

/// Which pages to fetch and how many workers fetch them
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Listing page URL with a `{}` placeholder for the page number
    pub url_template: String,

    /// First page number
    pub start_page: u32,

    /// Number of pages to fetch; `None` discovers the end from pagination
    pub page_count: Option<u32>,

    /// Number of concurrent workers
    pub workers: u32,

    /// Upper bound on pages enqueued when discovering the end
    pub max_pages: Option<u32>,

    /// Pages allowed in flight past the last confirmed page when discovering
    pub adaptive_lookahead: u32,

    /// Also fetch each item's detail page
    pub fetch_details: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            url_template: "https://books.toscrape.com/catalogue/page-{}.html".to_string(),
            start_page: 1,
            page_count: None,
            workers: 5,
            max_pages: None,
            adaptive_lookahead: 1,
            fetch_details: false,
        }
    }
}

/// Backoff strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// HTTP behavior: timeouts, retries, pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts per request, first attempt included
    pub max_retries: u32,

    /// Minimum spacing between any two outbound requests (milliseconds)
    pub rate_limit_ms: u64,

    pub backoff: BackoffKind,

    pub backoff_base_ms: u64,

    pub backoff_max_ms: u64,

    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            rate_limit_ms: 1000,
            backoff: BackoffKind::Exponential,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            user_agent: format!("catalog-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fatal-error thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitsConfig {
    /// Abort after this many page failures in a row
    pub max_consecutive_failures: u32,

    /// Abort when failed / completed pages exceeds this share
    pub max_failure_ratio: f64,

    /// Completed pages required before the ratio is checked
    pub min_pages_for_ratio: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            max_failure_ratio: 0.5,
            min_pages_for_ratio: 10,
        }
    }
}

/// CSS selectors locating items and their fields
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SelectorConfig {
    /// One match per catalog item
    pub item: String,

    pub title: String,

    /// Attribute on the title element holding the full title
    pub title_attribute: Option<String>,

    pub price: String,

    pub availability: String,

    /// Class carried by the rating element; its other classes are the rating
    pub rating_class: String,

    /// Filled-star markers counted inside the rating element, if the site
    /// draws ratings that way
    pub rating_marker: Option<String>,

    /// Element whose `href` is the item's detail page
    pub link: String,

    /// Pagination control present when another page follows
    pub next: String,

    pub detail_title: String,

    pub detail_availability: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: "article.product_pod".to_string(),
            title: "h3 a".to_string(),
            title_attribute: Some("title".to_string()),
            price: ".price_color".to_string(),
            availability: ".availability".to_string(),
            rating_class: "star-rating".to_string(),
            rating_marker: None,
            link: "h3 a".to_string(),
            next: "li.next a".to_string(),
            detail_title: ".product_main h1".to_string(),
            detail_availability: ".product_main .availability".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the CSV file written at the end of the run
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "books.csv".to_string(),
        }
    }
}
