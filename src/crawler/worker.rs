//! Page workers
//!
//! Each worker pulls page numbers from the shared queue and runs one page
//! through fetch, parse and validation, producing a [`PageOutcome`]. Page
//! failures are values, never panics; a worker only stops when the queue is
//! closed and empty, the result channel is gone, or the run is cancelled.

use crate::crawler::fetcher::{FailureKind, FetchResult, Fetcher};
use crate::crawler::parser::{parse_detail, parse_listing, DetailSelectors, ListingSelectors};
use crate::record::{PageError, PageOutcome, PageRequest, RawRecord, Record, RecordValidator};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared, read-only state every worker needs
#[derive(Debug)]
pub struct WorkerContext {
    pub fetcher: Fetcher,
    pub listing: ListingSelectors,

    /// Present when detail pages should be fetched for each record
    pub detail: Option<DetailSelectors>,
}

/// Receiving half of the work queue, shared by all workers
pub type WorkQueue = Arc<Mutex<mpsc::UnboundedReceiver<PageRequest>>>;

/// Runs a single page through the pipeline
pub async fn process_page(ctx: &WorkerContext, request: PageRequest) -> PageOutcome {
    let page = request.page_number;

    let url = match ctx.fetcher.page_url(page) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(page, error = %e, "cannot build page URL");
            return PageOutcome::failed(
                page,
                PageError::Fetch {
                    kind: FailureKind::InvalidUrl.as_str().to_string(),
                    status_code: None,
                },
            );
        }
    };

    let body = match ctx.fetcher.fetch_url(&url).await {
        FetchResult::Success { body, .. } => body,
        failure @ FetchResult::Failure { .. } => {
            return PageOutcome::failed(page, page_error(&failure));
        }
    };

    let parsed = match parse_listing(&body, &ctx.listing) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(page, url = %url, error = %e, "page could not be parsed");
            return PageOutcome::failed(page, PageError::Parse(e.to_string()));
        }
    };

    let validator = RecordValidator::new(url);
    let mut records = Vec::with_capacity(parsed.records.len());
    let mut rejected = 0;

    for raw in &parsed.records {
        match validator.validate(raw) {
            Ok(record) => records.push(record),
            Err(rejection) => {
                rejected += 1;
                tracing::warn!(
                    page,
                    reason = rejection.reason(),
                    detail = %rejection,
                    raw = ?raw,
                    "record rejected"
                );
            }
        }
    }

    if let Some(selectors) = &ctx.detail {
        let mut enriched = Vec::with_capacity(records.len());
        for record in records {
            enriched.push(enrich_record(&ctx.fetcher, selectors, record).await);
        }
        records = enriched;
    }

    PageOutcome {
        page_number: page,
        records,
        rejected,
        has_more_pages: parsed.has_more_pages,
        error: None,
    }
}

/// Maps a failed fetch to a page error
fn page_error(failure: &FetchResult) -> PageError {
    match failure {
        FetchResult::Failure {
            status_code: Some(status_code),
            ..
        } if failure.is_not_found() => PageError::NotFound {
            status_code: *status_code,
        },
        FetchResult::Failure {
            kind, status_code, ..
        } => PageError::Fetch {
            kind: kind.as_str().to_string(),
            status_code: *status_code,
        },
        FetchResult::Success { status_code, .. } => PageError::Fetch {
            kind: "unexpected_success".to_string(),
            status_code: Some(*status_code),
        },
    }
}

/// Fills in title and availability from the record's detail page
///
/// Any failure keeps the listing values.
async fn enrich_record(fetcher: &Fetcher, selectors: &DetailSelectors, record: Record) -> Record {
    let body = match fetcher.fetch_url(&record.url).await {
        FetchResult::Success { body, .. } => body,
        FetchResult::Failure { kind, status_code, .. } => {
            tracing::warn!(
                url = %record.url,
                kind = %kind,
                status = ?status_code,
                "detail page unavailable, keeping listing values"
            );
            return record;
        }
    };

    let detail = match parse_detail(&body, selectors) {
        Ok(detail) => detail,
        Err(e) => {
            tracing::warn!(url = %record.url, error = %e, "detail page could not be parsed");
            return record;
        }
    };

    let merged = RawRecord {
        title: detail
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(record.title.clone())),
        price_text: Some(record.price.to_string()),
        availability_text: detail
            .availability_text
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(record.availability.as_str().to_string())),
        rating_text: Some(record.rating.to_string()),
        detail_url: Some(record.url.to_string()),
    };

    match RecordValidator::new(record.url.clone()).validate(&merged) {
        Ok(enriched) => enriched,
        Err(rejection) => {
            tracing::warn!(url = %record.url, reason = rejection.reason(), "detail values rejected");
            record
        }
    }
}

/// Spawns `count` workers sharing one queue and one result channel
///
/// The caller's `results` sender is moved in; once every worker has exited
/// the result channel closes.
pub fn spawn_workers(
    count: usize,
    ctx: Arc<WorkerContext>,
    queue: WorkQueue,
    results: mpsc::UnboundedSender<PageOutcome>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                ctx.clone(),
                queue.clone(),
                results.clone(),
                cancel.clone(),
            ))
        })
        .collect()
}

async fn worker_loop(
    id: usize,
    ctx: Arc<WorkerContext>,
    queue: WorkQueue,
    results: mpsc::UnboundedSender<PageOutcome>,
    cancel: CancellationToken,
) {
    loop {
        let request = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                request = queue.recv() => request,
            }
        };

        let Some(request) = request else {
            break;
        };

        tracing::debug!(worker = id, page = request.page_number, "picked up page");
        let outcome = process_page(&ctx, request).await;

        if results.send(outcome).is_err() {
            break;
        }
    }

    tracing::debug!(worker = id, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;
    use crate::crawler::fetcher::{Backoff, RetryPolicy};
    use crate::crawler::rate_limiter::RateLimiter;
    use crate::record::{Availability, Rating};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"
        <html><body>
        <article class="product_pod">
          <h3><a href="a-light-in-the-attic/index.html" title="A Light in the Attic">A Light...</a></h3>
          <p class="star-rating Three"></p>
          <p class="price_color">£51.77</p>
          <p class="instock availability">In stock</p>
        </article>
        <article class="product_pod">
          <h3><a href="no-price/index.html" title="No Price">No Price</a></h3>
          <p class="star-rating One"></p>
          <p class="instock availability">In stock</p>
        </article>
        <ul class="pager"><li class="next"><a href="page-2.html">next</a></li></ul>
        </body></html>
    "#;

    fn context(server: &MockServer, details: bool) -> WorkerContext {
        let selectors = SelectorConfig::default();
        let policy = RetryPolicy {
            max_attempts: 2,
            timeout: Duration::from_secs(5),
            backoff: Backoff::Fixed(Duration::from_millis(10)),
        };
        let fetcher = Fetcher::new(
            reqwest::Client::new(),
            format!("{}/catalogue/page-{{}}.html", server.uri()),
            policy,
            Arc::new(RateLimiter::new(Duration::ZERO)),
        );

        WorkerContext {
            fetcher,
            listing: ListingSelectors::from_config(&selectors).unwrap(),
            detail: details.then(|| DetailSelectors::from_config(&selectors).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_process_page_validates_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogue/page-1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let ctx = context(&server, false);
        let outcome = process_page(&ctx, PageRequest::new(1)).await;

        assert!(outcome.is_success());
        assert!(outcome.has_more_pages);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.records.len(), 1);

        let record = &outcome.records[0];
        assert_eq!(record.title, "A Light in the Attic");
        assert_eq!(record.price.to_string(), "51.77");
        assert_eq!(record.availability, Availability::InStock);
        assert_eq!(record.rating, Rating::Stars(3));
        assert_eq!(
            record.url.as_str(),
            format!("{}/catalogue/a-light-in-the-attic/index.html", server.uri())
        );
    }

    #[tokio::test]
    async fn test_process_page_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server, false);
        let outcome = process_page(&ctx, PageRequest::new(7)).await;

        assert_eq!(outcome.page_number, 7);
        assert!(!outcome.is_success());
        assert!(outcome.error.as_ref().is_some_and(|e| e.is_not_found()));
    }

    #[tokio::test]
    async fn test_process_page_server_error_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let ctx = context(&server, false);
        let outcome = process_page(&ctx, PageRequest::new(1)).await;

        assert_eq!(
            outcome.error,
            Some(PageError::Fetch {
                kind: "http_error".to_string(),
                status_code: Some(500),
            })
        );
    }

    #[tokio::test]
    async fn test_process_page_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"books\": []}"))
            .mount(&server)
            .await;

        let ctx = context(&server, false);
        let outcome = process_page(&ctx, PageRequest::new(1)).await;

        assert!(matches!(outcome.error, Some(PageError::Parse(_))));
    }

    #[tokio::test]
    async fn test_detail_page_enrichment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogue/page-1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/catalogue/a-light-in-the-attic/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="product_main">
                     <h1>A Light in the Attic (Anniversary Edition)</h1>
                     <p class="availability">Out of stock</p>
                   </div>"#,
            ))
            .mount(&server)
            .await;

        let ctx = context(&server, true);
        let outcome = process_page(&ctx, PageRequest::new(1)).await;

        let record = &outcome.records[0];
        assert_eq!(record.title, "A Light in the Attic (Anniversary Edition)");
        assert_eq!(record.availability, Availability::OutOfStock);
        assert_eq!(record.rating, Rating::Stars(3));
    }

    #[tokio::test]
    async fn test_failed_detail_page_keeps_listing_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogue/page-1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/catalogue/a-light-in-the-attic/index.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context(&server, true);
        let outcome = process_page(&ctx, PageRequest::new(1)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.records[0].title, "A Light in the Attic");
        assert_eq!(outcome.records[0].availability, Availability::InStock);
    }

    #[tokio::test]
    async fn test_workers_drain_queue_then_exit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(6)
            .mount(&server)
            .await;

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        for page in 1..=6 {
            work_tx.send(PageRequest::new(page)).unwrap();
        }
        drop(work_tx);

        let handles = spawn_workers(
            3,
            Arc::new(context(&server, false)),
            Arc::new(Mutex::new(work_rx)),
            result_tx,
            CancellationToken::new(),
        );

        let mut pages = Vec::new();
        while let Some(outcome) = result_rx.recv().await {
            pages.push(outcome.page_number);
        }
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancelled_workers_stop_taking_work() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(0)
            .mount(&server)
            .await;

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        for page in 1..=4 {
            work_tx.send(PageRequest::new(page)).unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();

        spawn_workers(
            2,
            Arc::new(context(&server, false)),
            Arc::new(Mutex::new(work_rx)),
            result_tx,
            cancel,
        );

        assert!(result_rx.recv().await.is_none());
        drop(work_tx);
    }
}
