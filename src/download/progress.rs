//! Throttled per-file progress reporting.
//!
//! Transfers report their cumulative byte count after every chunk; the
//! reporter collapses those events into one log line per `threshold` bytes.
//! Reporting is advisory and can never fail a transfer.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::constants::{DEFAULT_LOG_THRESHOLD, MIB};

/// Optional listener for transfer lifecycle events (e.g. a terminal spinner).
///
/// Implementations must be cheap and must not block; they run on the worker
/// that owns the transfer.
pub trait ProgressObserver: Send + Sync {
    /// A transfer received a 200 response and is about to stream.
    fn transfer_started(&self, _filename: &str) {}

    /// `bytes` more bytes were written for `filename`.
    fn bytes_written(&self, _filename: &str, _bytes: u64) {}

    /// A transfer reached a terminal outcome. Also called for transfers that
    /// failed before `transfer_started` (bad URL, connect error, non-200).
    fn transfer_finished(&self, _filename: &str, _succeeded: bool) {}
}

/// Progress sink shared by every worker in a batch.
///
/// State is keyed by filename. Each key is only touched by the worker that
/// owns that transfer, so concurrent reports for different files never
/// contend beyond the map's shard locks.
///
/// Two transfers that derive the same filename and overlap share one entry:
/// the first `finish` drops it and the next `report` starts again from zero,
/// so the progress lines for that name undercount. The sink warns about such
/// collisions when the second file is opened.
pub struct ProgressReporter {
    threshold: u64,
    files: DashMap<String, FileProgress>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("threshold", &self.threshold)
            .field("tracked", &self.files.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_THRESHOLD)
    }
}

impl ProgressReporter {
    /// Creates a reporter that logs every `threshold` bytes per file.
    ///
    /// A zero threshold is treated as one byte.
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            files: DashMap::new(),
            observer: None,
        }
    }

    /// Attaches an observer that receives every lifecycle event.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Bytes between two progress lines for the same file.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Marks the start of a transfer.
    pub fn start(&self, filename: &str, url: &str) {
        self.files
            .insert(filename.to_string(), FileProgress::default());
        info!(filename, url, "transfer started");
        if let Some(observer) = &self.observer {
            observer.transfer_started(filename);
        }
    }

    /// Records that `filename` has `bytes_so_far` bytes on disk.
    ///
    /// Returns `true` when a progress line was emitted.
    pub fn report(&self, filename: &str, bytes_so_far: u64) -> bool {
        let mut state = self.files.entry(filename.to_string()).or_default();
        let delta = bytes_so_far.saturating_sub(state.seen);
        state.seen = bytes_so_far;
        let should_log = bytes_so_far.saturating_sub(state.logged) >= self.threshold;
        if should_log {
            state.logged = bytes_so_far;
        }
        drop(state);

        if let Some(observer) = &self.observer {
            observer.bytes_written(filename, delta);
        }
        if !should_log {
            return false;
        }

        #[allow(clippy::cast_precision_loss)]
        let downloaded_mib = bytes_so_far as f64 / MIB as f64;
        info!(filename, downloaded_mib, "downloading");
        true
    }

    /// Drops the state for `filename`; called on every terminal outcome.
    pub fn finish(&self, filename: &str, succeeded: bool) {
        self.files.remove(filename);
        if let Some(observer) = &self.observer {
            observer.transfer_finished(filename, succeeded);
        }
    }

    /// Number of transfers currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.files.len()
    }
}

/// Running counters for one file.
#[derive(Debug, Default, Clone, Copy)]
struct FileProgress {
    /// Last cumulative count reported.
    seen: u64,
    /// Cumulative count at the last emitted line.
    logged: u64,
}
