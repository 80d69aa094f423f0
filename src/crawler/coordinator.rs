//! Harvest coordinator - main run orchestration logic
//!
//! This module contains the dispatch loop that ties the run together:
//! - Building the shared HTTP client, rate limiter and worker pool
//! - Feeding page numbers to the work queue as the scheduler allows
//! - Aggregating page outcomes into the sink and the run summary
//! - Enforcing the fatal-error thresholds and handling interrupts
//! - Writing the output once every in-flight page is done

use crate::config::{validate, Config, LimitsConfig};
use crate::crawler::fetcher::{build_http_client, Fetcher, RetryPolicy};
use crate::crawler::parser::{DetailSelectors, ListingSelectors};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::scheduler::{PageRange, PageScheduler, Settled};
use crate::crawler::worker::{spawn_workers, WorkerContext};
use crate::output::{CsvSink, RunSummary, Sink};
use crate::record::{PageOutcome, PageRequest};
use crate::state::{AbortReason, RunState};
use crate::{ConfigError, HarvestError};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Progress is logged every this many completed pages
const PROGRESS_INTERVAL: u64 = 10;

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    context: Arc<WorkerContext>,
    sink: Arc<dyn Sink>,
    cancel: CancellationToken,
    state: RunState,
}

/// Failure bookkeeping for the abort thresholds
#[derive(Debug, Default)]
struct FailureTracker {
    consecutive: u32,
    failed: u64,
    completed: u64,
}

impl FailureTracker {
    /// Records one counted page and returns a reason if a threshold tripped
    fn record(&mut self, success: bool, limits: &LimitsConfig) -> Option<AbortReason> {
        self.completed += 1;

        if success {
            self.consecutive = 0;
        } else {
            self.failed += 1;
            self.consecutive += 1;
        }

        if self.consecutive > limits.max_consecutive_failures {
            return Some(AbortReason::ConsecutiveFailures {
                count: self.consecutive,
                limit: limits.max_consecutive_failures,
            });
        }

        if self.completed >= limits.min_pages_for_ratio {
            let ratio = self.failed as f64 / self.completed as f64;
            if ratio > limits.max_failure_ratio {
                return Some(AbortReason::FailureRatio {
                    failed: self.failed,
                    completed: self.completed,
                    limit: limits.max_failure_ratio,
                });
            }
        }

        None
    }
}

/// What woke the dispatch loop
enum Event {
    Outcome(Option<PageOutcome>),
    Cancelled,
}

impl Coordinator {
    /// Creates a coordinator writing to the configured CSV path
    ///
    /// # Arguments
    ///
    /// * `config` - Harvest configuration, validated here
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Invalid configuration, or the client could not be built
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let sink = Arc::new(CsvSink::new(&config.output.path));
        Self::with_sink(config, sink)
    }

    /// Creates a coordinator writing to a caller-supplied sink
    pub fn with_sink(config: Config, sink: Arc<dyn Sink>) -> Result<Self, HarvestError> {
        validate(&config)?;

        let client = build_http_client(&config.http)?;
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.http.rate_limit_ms,
        )));
        let fetcher = Fetcher::new(
            client,
            config.crawler.url_template.clone(),
            RetryPolicy::from_config(&config.http),
            limiter,
        );

        let listing = ListingSelectors::from_config(&config.selectors)
            .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
        let detail = if config.crawler.fetch_details {
            Some(
                DetailSelectors::from_config(&config.selectors)
                    .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            context: Arc::new(WorkerContext {
                fetcher,
                listing,
                detail,
            }),
            sink,
            cancel: CancellationToken::new(),
            state: RunState::Idle,
        })
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::error!(from = %self.state, to = %next, "illegal run state transition");
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "run state changed");
        self.state = next;
    }

    /// Runs the harvest to completion
    ///
    /// Page and record failures never end up here: they are counted in the
    /// returned summary. The run ends `Aborted` when a failure threshold
    /// trips, the token is cancelled, a worker dies, or the output cannot be
    /// written. Records from pages completed before an abort are still
    /// written.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        if self.state != RunState::Idle {
            return Err(HarvestError::AlreadyStarted(self.state));
        }

        let mut summary = RunSummary::new(Utc::now());
        let start_time = Instant::now();
        let range = PageRange::from_config(&self.config.crawler);
        let mut scheduler = PageScheduler::new(range);

        tracing::info!(
            range = ?range,
            workers = self.config.crawler.workers,
            rate_limit_ms = self.config.http.rate_limit_ms,
            max_attempts = self.config.http.max_retries,
            fetch_details = self.config.crawler.fetch_details,
            "starting harvest"
        );

        let (work_tx, work_rx) = mpsc::unbounded_channel::<PageRequest>();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<PageOutcome>();

        let handles = spawn_workers(
            self.config.crawler.workers as usize,
            self.context.clone(),
            Arc::new(Mutex::new(work_rx)),
            result_tx,
            self.cancel.clone(),
        );

        self.transition(RunState::Dispatching);
        let mut work_tx = Some(work_tx);
        let mut abort_reason: Option<AbortReason> = None;
        let mut failures = FailureTracker::default();
        let cancel = self.cancel.clone();

        self.enqueue(&mut scheduler, &mut work_tx, &mut summary);

        loop {
            let event = tokio::select! {
                outcome = result_rx.recv() => Event::Outcome(outcome),
                _ = cancel.cancelled(), if abort_reason.is_none() => Event::Cancelled,
            };

            let outcome = match event {
                Event::Outcome(Some(outcome)) => outcome,
                Event::Outcome(None) => break,
                Event::Cancelled => {
                    tracing::warn!("interrupted, waiting for in-flight pages");
                    abort_reason = Some(AbortReason::Interrupted);
                    scheduler.close();
                    work_tx = None;
                    continue;
                }
            };

            for settled in scheduler.record(outcome) {
                let outcome = match settled {
                    Settled::Accepted(outcome) => outcome,
                    Settled::Discarded(outcome) => {
                        summary.pages_discarded += 1;
                        tracing::debug!(
                            page = outcome.page_number,
                            last_page = ?scheduler.last_page(),
                            "discarding page past the last page"
                        );
                        continue;
                    }
                };

                let tripped = self.aggregate(outcome, range, &mut summary, &mut failures);

                if abort_reason.is_none() {
                    if let Some(reason) = tripped {
                        tracing::error!(reason = %reason, "aborting run");
                        abort_reason = Some(reason);
                        scheduler.close();
                        work_tx = None;
                        cancel.cancel();
                    }
                }

                if summary.pages_completed > 0 && summary.pages_completed % PROGRESS_INTERVAL == 0 {
                    let elapsed = start_time.elapsed().as_secs_f64();
                    tracing::info!(
                        "Progress: {} pages done ({} failed), {} records, {} in flight, {:.2} pages/sec",
                        summary.pages_completed,
                        summary.pages_failed,
                        summary.records_accepted,
                        scheduler.in_flight(),
                        summary.pages_completed as f64 / elapsed.max(f64::EPSILON)
                    );
                }
            }

            if abort_reason.is_none() {
                self.enqueue(&mut scheduler, &mut work_tx, &mut summary);
            }
        }

        drop(work_tx);

        // Workers can all exit on cancellation before the token is seen here
        if abort_reason.is_none() && cancel.is_cancelled() {
            abort_reason = Some(AbortReason::Interrupted);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task failed");
                if abort_reason.is_none() {
                    abort_reason = Some(AbortReason::WorkerFailed(e.to_string()));
                }
            }
        }

        // Whatever was collected is written, aborted or not
        match self.sink.finalize() {
            Ok(report) => {
                summary.records_written = report.records_written;
                summary.output_path = report.path;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to write output");
                summary.write_error = Some(e.to_string());
                if abort_reason.is_none() {
                    abort_reason = Some(AbortReason::SinkFailed(e.to_string()));
                }
            }
        }

        match abort_reason {
            None => {
                self.transition(RunState::Draining);
                self.transition(RunState::Finalized);
            }
            Some(reason) => {
                self.transition(RunState::Aborted);
                summary.abort_reason = Some(reason);
            }
        }

        summary.state = self.state;
        summary.finished_at = Some(Utc::now());
        summary.log();

        Ok(summary)
    }

    /// Moves every page the scheduler allows onto the work queue
    fn enqueue(
        &mut self,
        scheduler: &mut PageScheduler,
        work_tx: &mut Option<mpsc::UnboundedSender<PageRequest>>,
        summary: &mut RunSummary,
    ) {
        if let Some(tx) = work_tx.as_ref() {
            for request in scheduler.next_batch() {
                if tx.send(request).is_err() {
                    tracing::error!(page = request.page_number, "work queue closed unexpectedly");
                    scheduler.close();
                    break;
                }
                summary.pages_enqueued += 1;
            }
        }

        if scheduler.is_exhausted() && work_tx.take().is_some() {
            tracing::debug!(enqueued = scheduler.enqueued(), "all pages enqueued");
            self.transition(RunState::Draining);
        }
    }

    /// Folds one accepted outcome into the summary and the sink
    fn aggregate(
        &self,
        outcome: PageOutcome,
        range: PageRange,
        summary: &mut RunSummary,
        failures: &mut FailureTracker,
    ) -> Option<AbortReason> {
        let page = outcome.page_number;
        summary.pages_completed += 1;
        summary.records_rejected += outcome.rejected as u64;

        if let Some(error) = &outcome.error {
            summary.pages_failed += 1;
            if range.is_adaptive() && error.is_not_found() {
                tracing::warn!(
                    page,
                    error = %error,
                    "page advertised by its predecessor was not found"
                );
            } else {
                tracing::warn!(page, error = %error, "page failed");
            }
            return failures.record(false, &self.config.limits);
        }

        summary.pages_succeeded += 1;
        let count = outcome.records.len();
        tracing::info!(
            page,
            records = count,
            rejected = outcome.rejected,
            has_more = outcome.has_more_pages,
            "page complete"
        );

        if count > 0 {
            match self.sink.append_page(page, outcome.records) {
                Ok(true) => summary.records_accepted += count as u64,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(page, error = %e, "failed to buffer records");
                    return Some(AbortReason::SinkFailed(e.to_string()));
                }
            }
        }

        failures.record(true, &self.config.limits)
    }
}

/// Runs a complete harvest with a CSV sink
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::load_config;
/// use catalog_harvest::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config).await?;
/// println!("{} records written", summary.records_written);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config) -> Result<RunSummary, HarvestError> {
    let mut coordinator = Coordinator::new(config)?;
    coordinator.run().await
}
