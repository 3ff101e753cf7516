//! Progress UI (spinner) for download runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bulkfetch_core::ProgressObserver;
use bulkfetch_core::download::MIB;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner fed by transfer lifecycle events.
///
/// Hidden when the terminal is not interactive; the counters still update.
pub(crate) struct SpinnerObserver {
    bar: ProgressBar,
    total: usize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
    current: Mutex<Option<String>>,
}

impl SpinnerObserver {
    pub(crate) fn new(use_spinner: bool, total: usize) -> Self {
        let bar = if use_spinner {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        let observer = Self {
            bar,
            total,
            finished: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            current: Mutex::new(None),
        };
        observer.refresh();
        observer
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn refresh(&self) {
        self.bar.set_message(self.message());
    }

    fn message(&self) -> String {
        let done = self.finished.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        let mib = self.bytes.load(Ordering::SeqCst) as f64 / MIB as f64;
        let current = self
            .current
            .lock()
            .ok()
            .and_then(|name| name.clone())
            .unwrap_or_else(|| "queue".to_string());
        format!(
            "[{}/{}] {mib:.1} MiB, {failed} failed, downloading {current}...",
            done.min(self.total),
            self.total
        )
    }
}

impl ProgressObserver for SpinnerObserver {
    fn transfer_started(&self, filename: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(filename.to_string());
        }
        self.refresh();
    }

    fn bytes_written(&self, _filename: &str, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
        self.refresh();
    }

    fn transfer_finished(&self, _filename: &str, succeeded: bool) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        if !succeeded {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.refresh();
    }
}
