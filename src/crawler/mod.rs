//! Crawler module for page fetching and processing
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with retry logic and global rate limiting
//! - Listing and detail page parsing
//! - Page-number scheduling and the worker pool
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod parser;
mod rate_limiter;
mod scheduler;
mod worker;

pub use coordinator::{run_harvest, Coordinator};
pub use fetcher::{build_http_client, Backoff, FailureKind, FetchResult, Fetcher, RetryPolicy};
pub use parser::{
    parse_detail, parse_listing, DetailFields, DetailSelectors, ListingSelectors, ParseError,
    ParsedListing,
};
pub use rate_limiter::RateLimiter;
pub use scheduler::{PageRange, PageScheduler, Settled};
pub use worker::{process_page, spawn_workers, WorkQueue, WorkerContext};

