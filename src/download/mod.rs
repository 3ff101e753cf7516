//! HTTP download engine for streaming files to disk.
//!
//! This module provides the pieces of one bulk download batch: a managed
//! output directory, a streaming transfer per URL, a bounded worker pool and
//! throttled progress reporting.
//!
//! # Features
//!
//! - Streaming downloads in fixed-size chunks (memory-efficient for large files)
//! - Filenames taken from the last URL path segment
//! - Configurable timeouts (30s connect, 5min idle read by default)
//! - Bounded concurrency with graceful drain and cancellation
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkfetch_core::download::{DownloadEngine, HttpClient, OutputDir, ProgressReporter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(OutputDir::reset("./output").await?);
//! let report = DownloadEngine::new(4)?
//!     .run_batch(
//!         vec!["https://example.com/a-t3.nc".to_string()],
//!         &HttpClient::new(),
//!         sink,
//!         Arc::new(ProgressReporter::default()),
//!     )
//!     .await;
//! println!("Downloaded {} of {}", report.succeeded(), report.total());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod progress;
mod sink;

pub use client::{ClientSettings, HttpClient};
pub use constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_LOG_THRESHOLD, MIB};
pub use engine::{
    BatchReport, DownloadEngine, DownloadStats, EngineError, TransferOutcome, TransferRequest,
};
pub use error::{DownloadError, FailureKind};
pub use filename::derive_filename;
pub use progress::{ProgressObserver, ProgressReporter};
pub use sink::{OutputDir, SinkError, SinkFile};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
