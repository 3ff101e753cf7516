//! Bounded dispatcher: a fixed-size worker pool draining one batch of URLs.
//!
//! This module provides the `DownloadEngine` which seeds a shared work queue
//! with every request of a batch, runs exactly `concurrency` workers over it,
//! waits until every request has a terminal outcome, and then shuts the pool
//! down gracefully.
//!
//! # Overview
//!
//! ```text
//! urls ─► WorkQueue (seeded, closed) ─► worker × concurrency ─► HttpClient::transfer
//!                                              │
//!                                              └─► outcome channel ─► join ─► BatchReport
//! ```
//!
//! Workers suspend only while pulling the next request and during network
//! I/O. A [`CancellationToken`] is checked at the pull point: cancelling it
//! stops dispatch, lets in-flight transfers finish, and turns every request
//! still queued into a [`DownloadError::Cancelled`] outcome.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkfetch_core::{DownloadEngine, HttpClient, OutputDir, ProgressReporter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(4)?;
//! let client = HttpClient::new();
//! let sink = Arc::new(OutputDir::reset("./output").await?);
//! let reporter = Arc::new(ProgressReporter::default());
//! let urls = vec!["https://example.com/a-t3.nc".to_string()];
//! let report = engine.run_batch(urls, &client, sink, reporter).await;
//! println!("succeeded: {}, failed: {}", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::error::DownloadError;
use super::progress::ProgressReporter;
use super::sink::OutputDir;
use super::HttpClient;
use crate::config::DownloadConfig;

/// Error type for download engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// One URL submitted to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Position of the URL in the submitted batch.
    pub index: usize,
    /// The URL to fetch.
    pub url: String,
}

/// Terminal result of one transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The whole body was written to `path`.
    Success {
        /// Requested URL.
        url: String,
        /// Destination file.
        path: PathBuf,
        /// Bytes written, equal to the file size.
        bytes: u64,
    },
    /// The transfer ended without a complete file.
    Failure {
        /// Requested URL.
        url: String,
        /// Why it failed.
        error: DownloadError,
    },
}

impl TransferOutcome {
    /// The URL this outcome belongs to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    /// Returns `true` for [`TransferOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Bytes written on success.
    #[must_use]
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Success { bytes, .. } => Some(*bytes),
            Self::Failure { .. } => None,
        }
    }

    /// Destination file on success.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success { path, .. } => Some(path),
            Self::Failure { .. } => None,
        }
    }

    /// Failure reason.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}

/// Statistics from a batch run.
///
/// Uses atomic counters for thread-safe updates from concurrent workers.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    bytes: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully completed transfers.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed transfers, cancelled ones included.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of requests that never ran because of cancellation.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the total number of outcomes recorded (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    /// Returns the bytes written by successful transfers.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Returns the number of transfers currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneous transfers observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Success { bytes, .. } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes, Ordering::SeqCst);
            }
            TransferOutcome::Failure { error, .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                if matches!(error, DownloadError::Cancelled { .. }) {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    fn enter_flight(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }
}

/// Decrements the in-flight gauge when a transfer ends, however it ends.
struct InFlightGuard<'a> {
    stats: &'a DownloadStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Outcomes of one drained batch, in submission order.
#[derive(Debug)]
pub struct BatchReport {
    outcomes: Vec<TransferOutcome>,
    stats: DownloadStats,
    cancelled: bool,
}

impl BatchReport {
    /// All outcomes, one per submitted URL, in submission order.
    #[must_use]
    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    /// Consumes the report, returning its outcomes.
    #[must_use]
    pub fn into_outcomes(self) -> Vec<TransferOutcome> {
        self.outcomes
    }

    /// Counters gathered while the batch ran.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Number of successful transfers.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed transfers.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Number of submitted URLs.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` when every transfer succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(TransferOutcome::is_success)
    }

    /// Iterates over failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Returns `true` when the batch was cancelled before it drained.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Shared queue of pending requests.
///
/// Seeded with the whole batch and closed before any worker pulls, so an
/// empty queue means no request will ever arrive again.
#[derive(Debug)]
struct WorkQueue {
    rx: Mutex<mpsc::UnboundedReceiver<TransferRequest>>,
}

impl WorkQueue {
    fn seeded(requests: Vec<TransferRequest>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for request in requests {
            // Receiver is alive in this scope.
            let _ = tx.send(request);
        }
        // Dropping the only sender closes the queue.
        drop(tx);
        Self { rx: Mutex::new(rx) }
    }

    /// Waits for the next request.
    ///
    /// Returns `None` once the queue is empty and closed, or as soon as
    /// `stop` is cancelled.
    async fn pull(&self, stop: &CancellationToken) -> Option<TransferRequest> {
        let mut rx = tokio::select! {
            biased;
            () = stop.cancelled() => return None,
            guard = self.rx.lock() => guard,
        };
        tokio::select! {
            biased;
            () = stop.cancelled() => None,
            next = rx.recv() => next,
        }
    }

    /// Removes every request that was never dispatched.
    async fn drain_remaining(&self) -> Vec<TransferRequest> {
        let mut rx = self.rx.lock().await;
        let mut remaining = Vec::new();
        while let Ok(request) = rx.try_recv() {
            remaining.push(request);
        }
        remaining
    }
}

/// Everything a worker shares with the rest of the pool.
struct WorkerContext {
    queue: Arc<WorkQueue>,
    stop: CancellationToken,
    client: HttpClient,
    sink: Arc<OutputDir>,
    reporter: Arc<ProgressReporter>,
    stats: Arc<DownloadStats>,
    outcomes: mpsc::UnboundedSender<(usize, TransferOutcome)>,
}

/// Download engine running one bounded worker pool per batch.
///
/// # Concurrency Model
///
/// - Exactly `concurrency` Tokio tasks are spawned per batch
/// - Workers share one queue, one [`HttpClient`] and one [`OutputDir`]
/// - Each worker loops `Idle → Fetching → Streaming → Idle` until the queue
///   is empty and closed, or the stop token fires
/// - Failures are outcomes, never retries
#[derive(Debug)]
pub struct DownloadEngine {
    /// Configured worker pool size.
    concurrency: usize,
    /// Batch-level cancellation.
    cancel: CancellationToken,
}

impl DownloadEngine {
    /// Creates a new download engine with the specified worker pool size.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use bulkfetch_core::DownloadEngine;
    ///
    /// let engine = DownloadEngine::new(4).unwrap();
    /// assert_eq!(engine.concurrency(), 4);
    /// assert!(DownloadEngine::new(0).is_err());
    /// ```
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating download engine");

        Ok(Self {
            concurrency,
            cancel: CancellationToken::new(),
        })
    }

    /// Creates an engine sized from a [`DownloadConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] for an out-of-range value.
    pub fn from_config(config: &DownloadConfig) -> Result<Self, EngineError> {
        Self::new(config.concurrency)
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns a handle that cancels the running (or next) batch.
    ///
    /// Cancellation stops dispatch at the queue-pull point; transfers already
    /// in flight run to their terminal outcome.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads every URL through the worker pool and waits for the drain.
    ///
    /// Returns only after each URL has exactly one outcome and every worker
    /// has acknowledged shutdown. Individual transfer failures never make
    /// this method fail.
    #[instrument(skip_all, fields(requests = urls.len(), concurrency = self.concurrency))]
    pub async fn run_batch(
        &self,
        urls: Vec<String>,
        client: &HttpClient,
        sink: Arc<OutputDir>,
        reporter: Arc<ProgressReporter>,
    ) -> BatchReport {
        let total = urls.len();
        let requests: Vec<TransferRequest> = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| TransferRequest { index, url })
            .collect();
        let request_urls: Vec<String> = requests.iter().map(|r| r.url.clone()).collect();

        info!(total, concurrency = self.concurrency, "batch started");

        let queue = Arc::new(WorkQueue::seeded(requests));
        let stats = Arc::new(DownloadStats::new());
        let stop = self.cancel.child_token();
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let workers: Vec<JoinHandle<()>> = (0..self.concurrency)
            .map(|worker_id| {
                let ctx = WorkerContext {
                    queue: Arc::clone(&queue),
                    stop: stop.clone(),
                    client: client.clone(),
                    sink: Arc::clone(&sink),
                    reporter: Arc::clone(&reporter),
                    stats: Arc::clone(&stats),
                    outcomes: outcome_tx.clone(),
                };
                tokio::spawn(run_worker(worker_id, ctx))
            })
            .collect();
        // Workers hold the remaining senders; the channel closes when all exit.
        drop(outcome_tx);

        let mut slots: Vec<Option<TransferOutcome>> =
            std::iter::repeat_with(|| None).take(total).collect();
        let mut resolved = 0;
        while resolved < total {
            let Some((index, outcome)) = outcome_rx.recv().await else {
                break; // every worker has exited
            };
            if let Some(slot) = slots.get_mut(index) {
                if slot.replace(outcome).is_none() {
                    resolved += 1;
                }
            }
        }

        debug!(resolved, total, "join complete, stopping workers");
        stop.cancel();
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        let cancelled = self.cancel.is_cancelled();
        for request in queue.drain_remaining().await {
            let outcome = TransferOutcome::Failure {
                error: DownloadError::cancelled(&request.url),
                url: request.url,
            };
            stats.record(&outcome);
            if let Some(slot) = slots.get_mut(request.index) {
                *slot = Some(outcome);
            }
        }

        let outcomes: Vec<TransferOutcome> = slots
            .into_iter()
            .zip(request_urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    warn!(url = %url, "request lost with its worker");
                    let outcome = TransferOutcome::Failure {
                        error: DownloadError::worker_lost(&url),
                        url,
                    };
                    stats.record(&outcome);
                    outcome
                })
            })
            .collect();

        // All worker clones were dropped when the handles completed.
        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| snapshot(&shared));

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            cancelled = stats.cancelled(),
            bytes = stats.bytes(),
            total,
            "batch drained"
        );

        BatchReport {
            outcomes,
            stats,
            cancelled,
        }
    }
}

/// Worker loop: pull, transfer, report, until the queue closes or `stop` fires.
async fn run_worker(worker_id: usize, ctx: WorkerContext) {
    debug!(worker_id, "worker idle");

    while let Some(request) = ctx.queue.pull(&ctx.stop).await {
        debug!(worker_id, index = request.index, url = %request.url, "worker fetching");

        let outcome = {
            let _in_flight = ctx.stats.enter_flight();
            ctx.client
                .transfer(&request.url, &ctx.sink, &ctx.reporter)
                .await
        };
        ctx.stats.record(&outcome);

        if ctx.outcomes.send((request.index, outcome)).is_err() {
            warn!(worker_id, "dispatcher stopped listening, worker exiting");
            break;
        }
        debug!(worker_id, "worker idle");
    }

    debug!(worker_id, "worker stopped");
}

fn snapshot(shared: &DownloadStats) -> DownloadStats {
    let copy = DownloadStats::new();
    copy.completed.store(shared.completed(), Ordering::SeqCst);
    copy.failed.store(shared.failed(), Ordering::SeqCst);
    copy.cancelled.store(shared.cancelled(), Ordering::SeqCst);
    copy.bytes.store(shared.bytes(), Ordering::SeqCst);
    copy.peak_in_flight
        .store(shared.peak_in_flight(), Ordering::SeqCst);
    copy
}
