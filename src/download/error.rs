//! Error types for the download module.
//!
//! This module defines structured errors for per-transfer failures. None of
//! these abort a batch: each is converted into a failed
//! [`TransferOutcome`](super::TransferOutcome) at the transfer boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a single URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or body read timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any response status other than 200.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned a non-200 status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination file.
    ///
    /// The partially written file is left on disk.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is malformed or does not name a file.
    #[error("invalid URL: {url} ({reason})")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
        /// Why the URL was rejected.
        reason: &'static str,
    },

    /// The batch was cancelled before this request was dispatched.
    #[error("cancelled before download started: {url}")]
    Cancelled {
        /// The URL that was never fetched.
        url: String,
    },

    /// The worker handling this request stopped without reporting an outcome.
    #[error("worker stopped before finishing {url}")]
    WorkerLost {
        /// The URL that was in flight.
        url: String,
    },
}

/// Coarse classification of a [`DownloadError`] for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Non-200 response.
    HttpStatus,
    /// Connection, TLS or timeout failure.
    Network,
    /// Destination write failure.
    Write,
    /// URL could not be used.
    InvalidUrl,
    /// Never dispatched or lost with its worker.
    Cancelled,
}

impl FailureKind {
    /// Returns the stable label used in log fields and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpStatus => "http_status",
            Self::Network => "network",
            Self::Write => "write",
            Self::InvalidUrl => "invalid_url",
            Self::Cancelled => "cancelled",
        }
    }
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    ///
    /// Timeouts are promoted to [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates a lost-worker error.
    pub fn worker_lost(url: impl Into<String>) -> Self {
        Self::WorkerLost { url: url.into() }
    }

    /// Classifies this error for summaries.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HttpStatus { .. } => FailureKind::HttpStatus,
            Self::Network { .. } | Self::Timeout { .. } => FailureKind::Network,
            Self::Io { .. } => FailureKind::Write,
            Self::InvalidUrl { .. } => FailureKind::InvalidUrl,
            Self::Cancelled { .. } | Self::WorkerLost { .. } => FailureKind::Cancelled,
        }
    }
}

// No blanket `From<reqwest::Error>` / `From<std::io::Error>`: every variant
// needs the url or path, which the source errors don't carry.
