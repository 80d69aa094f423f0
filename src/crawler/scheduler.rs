//! Page-number scheduling
//!
//! This module decides which page numbers are enqueued and when:
//! - Fixed mode enqueues a known range up front, exactly once per page
//! - Adaptive mode discovers the end from each page's "next" control
//!
//! In adaptive mode a page is *confirmed* once its predecessor reported a next
//! page (the start page is confirmed from the outset). Up to `lookahead` pages
//! may be in flight from the first unconfirmed one onward. Outcomes of pages
//! that are not yet confirmed are held back; once the end is known, held and
//! late outcomes past it are discarded so nothing beyond the last page is
//! ever written.

use crate::config::CrawlerConfig;
use crate::record::{PageOutcome, PageRequest};
use std::collections::{BTreeMap, BTreeSet};

/// Which pages a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRange {
    /// Exactly `count` pages starting at `start`
    Fixed { start: u32, count: u32 },

    /// Pages from `start` until one reports no next page
    Adaptive {
        start: u32,
        max_pages: Option<u32>,
        lookahead: u32,
    },
}

impl PageRange {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        match config.page_count {
            Some(count) => Self::Fixed {
                start: config.start_page,
                count,
            },
            None => Self::Adaptive {
                start: config.start_page,
                max_pages: config.max_pages,
                lookahead: config.adaptive_lookahead.max(1),
            },
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive { .. })
    }

    fn start(&self) -> u32 {
        match *self {
            Self::Fixed { start, .. } | Self::Adaptive { start, .. } => start,
        }
    }
}

/// What the coordinator should do with a finished page
#[derive(Debug, Clone)]
pub enum Settled {
    /// Count it and hand its records to the sink
    Accepted(PageOutcome),

    /// The page lies past the discovered last page
    Discarded(PageOutcome),
}

/// Tracks enqueued, in-flight and held pages for one run
#[derive(Debug)]
pub struct PageScheduler {
    range: PageRange,

    /// Next page number not yet enqueued
    next_page: u32,

    enqueued: u32,

    in_flight: BTreeSet<u32>,

    /// Highest page known to exist (adaptive)
    confirmed_through: u32,

    /// Last page, once known (adaptive)
    last_page: Option<u32>,

    /// Finished but unconfirmed pages (adaptive)
    held: BTreeMap<u32, PageOutcome>,

    /// Set when the run stops dispatching early
    closed: bool,
}

impl PageScheduler {
    pub fn new(range: PageRange) -> Self {
        let start = range.start();
        Self {
            range,
            next_page: start,
            enqueued: 0,
            in_flight: BTreeSet::new(),
            confirmed_through: start,
            last_page: None,
            held: BTreeMap::new(),
            closed: false,
        }
    }

    /// Pages that may be enqueued right now
    pub fn next_batch(&mut self) -> Vec<PageRequest> {
        let mut batch = Vec::new();

        while !self.closed && self.can_enqueue(self.next_page) {
            let page = self.next_page;
            batch.push(PageRequest::new(page));
            self.in_flight.insert(page);
            self.enqueued += 1;

            match page.checked_add(1) {
                Some(next) => self.next_page = next,
                None => {
                    self.closed = true;
                    break;
                }
            }
        }

        batch
    }

    fn can_enqueue(&self, page: u32) -> bool {
        match self.range {
            PageRange::Fixed { count, .. } => self.enqueued < count,
            PageRange::Adaptive {
                max_pages,
                lookahead,
                ..
            } => {
                if max_pages.is_some_and(|cap| self.enqueued >= cap) {
                    return false;
                }
                if self.last_page.is_some_and(|last| page > last) {
                    return false;
                }
                let window_end = self
                    .confirmed_through
                    .saturating_add(lookahead.saturating_sub(1));
                page <= window_end
            }
        }
    }

    /// True once no further page will ever be enqueued
    pub fn is_exhausted(&self) -> bool {
        if self.closed {
            return true;
        }

        match self.range {
            PageRange::Fixed { count, .. } => self.enqueued >= count,
            PageRange::Adaptive { max_pages, .. } => {
                max_pages.is_some_and(|cap| self.enqueued >= cap)
                    || self
                        .last_page
                        .is_some_and(|last| self.next_page > last)
            }
        }
    }

    /// Stops any further enqueueing (abort or interrupt)
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn enqueued(&self) -> u32 {
        self.enqueued
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The discovered last page, if known
    pub fn last_page(&self) -> Option<u32> {
        self.last_page
    }

    /// Records a finished page and returns every outcome that is now settled
    pub fn record(&mut self, outcome: PageOutcome) -> Vec<Settled> {
        self.in_flight.remove(&outcome.page_number);

        if !self.range.is_adaptive() {
            return vec![Settled::Accepted(outcome)];
        }

        let mut settled = Vec::new();
        self.held.insert(outcome.page_number, outcome);

        // Release held pages in order while they are confirmed or past the end
        while let Some((&page, _)) = self.held.iter().next() {
            let past_end = self.last_page.is_some_and(|last| page > last);
            if !past_end && page > self.confirmed_through {
                break;
            }

            let Some(outcome) = self.held.remove(&page) else {
                break;
            };

            if past_end {
                settled.push(Settled::Discarded(outcome));
            } else {
                self.learn(&outcome);
                settled.push(Settled::Accepted(outcome));
            }
        }

        // Pages held beyond a newly learned end can go too
        if let Some(last) = self.last_page {
            let beyond: Vec<u32> = self.held.range(last.saturating_add(1)..).map(|(p, _)| *p).collect();
            for page in beyond {
                if let Some(outcome) = self.held.remove(&page) {
                    settled.push(Settled::Discarded(outcome));
                }
            }
        }

        settled
    }

    /// Updates the discovered extent from a confirmed page's outcome
    fn learn(&mut self, outcome: &PageOutcome) {
        let page = outcome.page_number;

        let end = match &outcome.error {
            None if outcome.has_more_pages => {
                self.confirmed_through = self.confirmed_through.max(page.saturating_add(1));
                return;
            }
            None => page,
            // A missing page ends the sequence before it
            Some(error) if error.is_not_found() => page.saturating_sub(1),
            // Any other failure leaves the rest unknowable
            Some(_) => page,
        };

        self.last_page = Some(self.last_page.map_or(end, |last| last.min(end)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PageError;

    fn ok(page: u32, has_more: bool) -> PageOutcome {
        PageOutcome {
            page_number: page,
            records: Vec::new(),
            rejected: 0,
            has_more_pages: has_more,
            error: None,
        }
    }

    fn not_found(page: u32) -> PageOutcome {
        PageOutcome::failed(page, PageError::NotFound { status_code: 404 })
    }

    fn pages(batch: &[PageRequest]) -> Vec<u32> {
        batch.iter().map(|r| r.page_number).collect()
    }

    fn adaptive(lookahead: u32, max_pages: Option<u32>) -> PageScheduler {
        PageScheduler::new(PageRange::Adaptive {
            start: 1,
            max_pages,
            lookahead,
        })
    }

    fn accepted(settled: &[Settled]) -> Vec<u32> {
        settled
            .iter()
            .filter_map(|s| match s {
                Settled::Accepted(o) => Some(o.page_number),
                Settled::Discarded(_) => None,
            })
            .collect()
    }

    fn discarded(settled: &[Settled]) -> Vec<u32> {
        settled
            .iter()
            .filter_map(|s| match s {
                Settled::Discarded(o) => Some(o.page_number),
                Settled::Accepted(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_fixed_range_enqueues_exactly_count() {
        let mut scheduler = PageScheduler::new(PageRange::Fixed { start: 3, count: 4 });

        let batch = scheduler.next_batch();
        assert_eq!(pages(&batch), vec![3, 4, 5, 6]);
        assert!(scheduler.is_exhausted());

        // Nothing more, however often we ask
        assert!(scheduler.next_batch().is_empty());
        scheduler.record(ok(3, true));
        assert!(scheduler.next_batch().is_empty());
        assert_eq!(scheduler.enqueued(), 4);
    }

    #[test]
    fn test_fixed_range_accepts_everything() {
        let mut scheduler = PageScheduler::new(PageRange::Fixed { start: 1, count: 2 });
        scheduler.next_batch();

        let settled = scheduler.record(not_found(2));
        assert_eq!(accepted(&settled), vec![2]);
        assert_eq!(scheduler.in_flight(), 1);
    }

    #[test]
    fn test_adaptive_is_sequential_by_default() {
        let mut scheduler = adaptive(1, None);

        assert_eq!(pages(&scheduler.next_batch()), vec![1]);
        assert!(scheduler.next_batch().is_empty());

        assert_eq!(accepted(&scheduler.record(ok(1, true))), vec![1]);
        assert_eq!(pages(&scheduler.next_batch()), vec![2]);

        assert_eq!(accepted(&scheduler.record(ok(2, false))), vec![2]);
        assert!(scheduler.next_batch().is_empty());
        assert!(scheduler.is_exhausted());
        assert_eq!(scheduler.last_page(), Some(2));
    }

    #[test]
    fn test_adaptive_stops_at_page_without_next() {
        let mut scheduler = adaptive(1, None);
        let mut requested = Vec::new();

        loop {
            let batch = scheduler.next_batch();
            if batch.is_empty() {
                break;
            }
            for request in batch {
                requested.push(request.page_number);
                let has_more = request.page_number < 5;
                scheduler.record(ok(request.page_number, has_more));
            }
        }

        assert_eq!(requested, vec![1, 2, 3, 4, 5]);
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_adaptive_respects_max_pages() {
        let mut scheduler = adaptive(1, Some(2));

        scheduler.next_batch();
        scheduler.record(ok(1, true));
        assert_eq!(pages(&scheduler.next_batch()), vec![2]);
        scheduler.record(ok(2, true));

        assert!(scheduler.next_batch().is_empty());
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_lookahead_window() {
        let mut scheduler = adaptive(3, None);
        assert_eq!(pages(&scheduler.next_batch()), vec![1, 2, 3]);

        // Page 2 finishes first: held until page 1 confirms it
        assert!(scheduler.record(ok(2, true)).is_empty());

        let settled = scheduler.record(ok(1, true));
        assert_eq!(accepted(&settled), vec![1, 2]);

        // Confirmed through 3, window now reaches 5
        assert_eq!(pages(&scheduler.next_batch()), vec![4, 5]);
    }

    #[test]
    fn test_lookahead_discards_pages_past_end() {
        let mut scheduler = adaptive(3, None);
        scheduler.next_batch();

        // Speculative page 3 is a 404, page 2 done early
        assert!(scheduler.record(not_found(3)).is_empty());
        assert!(scheduler.record(ok(2, false)).is_empty());

        let settled = scheduler.record(ok(1, true));
        assert_eq!(accepted(&settled), vec![1, 2]);
        assert_eq!(discarded(&settled), vec![3]);
        assert_eq!(scheduler.last_page(), Some(2));
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_late_outcome_past_end_is_discarded() {
        let mut scheduler = adaptive(2, None);
        scheduler.next_batch();

        scheduler.record(ok(1, false));
        let settled = scheduler.record(ok(2, false));
        assert_eq!(discarded(&settled), vec![2]);
    }

    #[test]
    fn test_confirmed_not_found_ends_before_it() {
        let mut scheduler = adaptive(1, None);
        scheduler.next_batch();
        scheduler.record(ok(1, true));
        scheduler.next_batch();

        let settled = scheduler.record(not_found(2));
        // Counted as a page failure by the caller
        assert_eq!(accepted(&settled), vec![2]);
        assert_eq!(scheduler.last_page(), Some(1));
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_failure_ends_discovery() {
        let mut scheduler = adaptive(1, None);
        scheduler.next_batch();

        let failure = PageOutcome::failed(
            1,
            PageError::Fetch {
                kind: "timeout".to_string(),
                status_code: None,
            },
        );
        assert_eq!(accepted(&scheduler.record(failure)), vec![1]);
        assert!(scheduler.next_batch().is_empty());
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_close_stops_enqueueing() {
        let mut scheduler = adaptive(1, None);
        scheduler.next_batch();
        scheduler.close();

        scheduler.record(ok(1, true));
        assert!(scheduler.next_batch().is_empty());
        assert!(scheduler.is_exhausted());
    }

    #[test]
    fn test_range_from_config() {
        let mut config = CrawlerConfig::default();
        assert!(PageRange::from_config(&config).is_adaptive());

        config.page_count = Some(50);
        config.start_page = 2;
        assert_eq!(
            PageRange::from_config(&config),
            PageRange::Fixed { start: 2, count: 50 }
        );
    }
}
