//! Download configuration: defaults, TOML file loading and validation.
//!
//! Values are layered, lowest precedence first: built-in defaults, the TOML
//! config file, then command-line flags. [`DownloadConfig::validate`] must
//! pass before any filesystem or network activity.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_LOG_THRESHOLD,
    MAX_CHUNK_SIZE, MAX_CONCURRENCY, MAX_TIMEOUT_SECS, MIN_CHUNK_SIZE, MIN_CONCURRENCY,
    READ_TIMEOUT_SECS,
};

/// Default destination directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Errors building a [`DownloadConfig`]. All are fatal before the batch starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Worker count outside the allowed range.
    #[error(
        "invalid concurrency {value}: expected {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Chunk size outside the allowed range.
    #[error("invalid chunk size {value} bytes: expected {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}")]
    InvalidChunkSize {
        /// The rejected value.
        value: u64,
    },

    /// Progress log threshold of zero.
    #[error("invalid log threshold {value} bytes: must be at least 1")]
    InvalidLogThreshold {
        /// The rejected value.
        value: u64,
    },

    /// Timeout outside the allowed range.
    #[error("invalid `{field}` {value}s: expected 1..={MAX_TIMEOUT_SECS}")]
    InvalidTimeout {
        /// Name of the timeout setting.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Settings for one bulk download run.
///
/// Every field may be omitted from a config file; missing keys take the
/// built-in default.
///
/// ```toml
/// concurrency = 8
/// chunk_size = 2097152
/// output_dir = "/data/forecasts"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Number of workers (1..=100).
    pub concurrency: usize,
    /// Bytes per read/write step.
    pub chunk_size: u64,
    /// Bytes between two progress lines for the same file.
    pub log_threshold: u64,
    /// Verify TLS certificates.
    pub tls_verify: bool,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum idle time between reads in seconds.
    pub read_timeout_secs: u64,
    /// Destination directory; wiped at the start of every run.
    pub output_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_threshold: DEFAULT_LOG_THRESHOLD,
            tls_verify: true,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl DownloadConfig {
    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize {
                value: self.chunk_size,
            });
        }
        if self.log_threshold == 0 {
            return Err(ConfigError::InvalidLogThreshold { value: 0 });
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Parses a config from TOML text.
    ///
    /// `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Loads a config file. Values are not validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads `explicit` if given, else the default config file when present,
    /// else the built-in defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`load_file`](Self::load_file) errors. A missing default
    /// file is not an error; a missing explicit file is.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load_file(&path),
            _ => Ok(Self::default()),
        }
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
        return Err(ConfigError::InvalidTimeout { field, value });
    }
    Ok(())
}

/// Location of the user config file, from `XDG_CONFIG_HOME` or `HOME`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = xdg_config_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            home.filter(|v| !v.is_empty())
                .map(|h| PathBuf::from(h).join(".config"))
        })?;
    Some(base.join("bulkfetch").join("config.toml"))
}
