//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use bulkfetch_core::DownloadConfig;
use clap::Parser;

/// Default listing suffix for discovered files.
pub const DEFAULT_SUFFIX: &str = "-t3.nc";

/// Bulk download files over HTTP into a fresh directory.
///
/// URLs come from positional arguments, an input file, a JSON listing
/// endpoint, or stdin (one per line). The output directory is deleted and
/// recreated on every run.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when none are given)
    pub urls: Vec<String>,

    /// Destination directory, wiped at start [default: output]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 4]
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Bytes per read/write step (1024-67108864) [default: 1048576]
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Bytes between progress lines per file [default: 10485760]
    #[arg(long)]
    pub log_threshold: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Connect timeout in seconds (1-3600) [default: 30]
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Idle read timeout in seconds (1-3600) [default: 300]
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Config file (TOML) [default: $XDG_CONFIG_HOME/bulkfetch/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read URLs from a file, one per line
    #[arg(short = 'i', long)]
    pub input_file: Option<PathBuf>,

    /// Discover URLs from a JSON directory listing
    #[arg(long)]
    pub listing_url: Option<String>,

    /// Keep listing entries ending with this suffix (with --listing-url)
    #[arg(long, default_value = DEFAULT_SUFFIX, allow_hyphen_values = true)]
    pub suffix: String,

    /// Exit with status 1 if any download failed
    #[arg(long)]
    pub fail_on_error: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    /// Overlays the flags given on the command line onto `config`.
    #[must_use]
    pub fn apply_to(&self, mut config: DownloadConfig) -> DownloadConfig {
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(threshold) = self.log_threshold {
            config.log_threshold = threshold;
        }
        if self.insecure {
            config.tls_verify = false;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.read_timeout {
            config.read_timeout_secs = secs;
        }
        config
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
