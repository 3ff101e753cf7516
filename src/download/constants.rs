//! Constants for the download module (chunking, progress cadence, timeouts).

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default bytes copied per read/write step (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = MIB;

/// Smallest accepted chunk size (1 KiB).
pub const MIN_CHUNK_SIZE: u64 = 1024;

/// Largest accepted chunk size (64 MiB).
pub const MAX_CHUNK_SIZE: u64 = 64 * MIB;

/// Default bytes between progress lines for one file (10 MiB).
pub const DEFAULT_LOG_THRESHOLD: u64 = 10 * MIB;

/// Default worker pool size.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Upper bound for either timeout (1 hour).
pub const MAX_TIMEOUT_SECS: u64 = 3600;
