//! Bulkfetch Core Library
//!
//! This library provides the core of the bulkfetch tool: given an ordered list
//! of file URLs and a concurrency limit, it downloads every payload into a
//! freshly reset directory, streaming each response to disk in fixed-size
//! chunks and logging throttled progress per file.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Download configuration, validation and TOML file loading
//! - [`download`] - Output sink, streaming transfer, progress reporting and
//!   the bounded worker-pool dispatcher

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;

// Re-export commonly used types
pub use config::{ConfigError, DownloadConfig};
pub use download::{
    BatchReport, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_LOG_THRESHOLD, DownloadEngine,
    DownloadError, DownloadStats, EngineError, FailureKind, HttpClient, OutputDir, ProgressObserver,
    ProgressReporter, SinkError, SinkFile, TransferOutcome, TransferRequest, derive_filename,
};
