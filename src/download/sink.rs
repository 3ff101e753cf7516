//! Output sink: the managed destination directory for one batch.
//!
//! [`OutputDir::reset`] gives the batch a clean directory; every transfer then
//! writes through a [`SinkFile`] obtained from [`OutputDir::open_for_write`].
//! A `SinkFile` owns its file descriptor, so it is released on every exit path,
//! including a worker task being dropped mid-transfer.

use std::path::{Path, PathBuf};

use dashmap::DashSet;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;

/// Errors preparing the destination directory. Fatal for the whole batch.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination exists but is not a directory.
    #[error("output path {path} exists and is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// Removing the previous destination failed.
    #[error("failed to remove output directory {path}: {source}")]
    Remove {
        /// The directory that could not be removed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Creating the destination failed.
    #[error("failed to create output directory {path}: {source}")]
    Create {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// A destination directory that was reset to empty for the current batch.
///
/// Shared across workers behind an `Arc`; distinct files may be created
/// concurrently.
#[derive(Debug)]
pub struct OutputDir {
    root: PathBuf,
    /// Filenames opened during this batch, for collision detection.
    claimed: DashSet<String>,
}

impl OutputDir {
    /// Deletes `path` recursively if present, then recreates it empty.
    ///
    /// Calling this on an already-empty directory succeeds and leaves it empty.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the path is a regular file or the filesystem
    /// denies removal or creation.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn reset(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let root = path.as_ref().to_path_buf();

        match tokio::fs::symlink_metadata(&root).await {
            Ok(meta) if meta.is_dir() => {
                debug!("removing previous output directory");
                tokio::fs::remove_dir_all(&root)
                    .await
                    .map_err(|source| SinkError::Remove {
                        path: root.clone(),
                        source,
                    })?;
            }
            Ok(_) => return Err(SinkError::NotADirectory { path: root }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(SinkError::Remove {
                    path: root.clone(),
                    source,
                });
            }
        }

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| SinkError::Create {
                path: root.clone(),
                source,
            })?;

        info!(dir = %root.display(), "output directory ready");
        Ok(Self {
            root,
            claimed: DashSet::new(),
        })
    }

    /// Returns the managed directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates (or truncates) `filename` inside the managed directory.
    ///
    /// Opening the same name twice in one batch logs a collision; the later
    /// writer replaces the earlier file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be created.
    pub async fn open_for_write(&self, filename: &str) -> Result<SinkFile, DownloadError> {
        let path = self.root.join(filename);

        if !self.claimed.insert(filename.to_string()) {
            warn!(
                filename,
                path = %path.display(),
                "filename collision: another URL in this batch maps to the same file, last writer wins; progress lines for this name may be inaccurate while both transfers run"
            );
        }

        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        debug!(path = %path.display(), "opened destination file");

        Ok(SinkFile {
            path,
            file,
            bytes_written: 0,
        })
    }
}

/// Scoped, write-only handle to one destination file.
///
/// Dropping the handle closes the descriptor; [`SinkFile::finish`] flushes
/// first and reports the final size.
#[derive(Debug)]
pub struct SinkFile {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl SinkFile {
    /// Appends `chunk` to the file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the write fails.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(self.path.clone(), e))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes pending writes and closes the file, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the flush fails.
    pub async fn finish(mut self) -> Result<u64, DownloadError> {
        self.file
            .flush()
            .await
            .map_err(|e| DownloadError::io(self.path.clone(), e))?;
        Ok(self.bytes_written)
    }

    /// Flushes pending writes without closing, so a partial file reflects
    /// every chunk handed to it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the flush fails.
    pub async fn flush(&mut self) -> Result<(), DownloadError> {
        self.file
            .flush()
            .await
            .map_err(|e| DownloadError::io(self.path.clone(), e))
    }

    /// Path of the destination file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes handed to the file so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
