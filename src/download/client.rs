//! HTTP client wrapper and the streaming transfer of one URL.
//!
//! This module provides the `HttpClient` struct which owns the shared
//! connection pool and TLS context, and streams a 200 response body to an
//! [`OutputDir`] in fixed-size chunks.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, READ_TIMEOUT_SECS};
use super::engine::TransferOutcome;
use super::error::DownloadError;
use super::filename::derive_filename;
use super::progress::ProgressReporter;
use super::sink::{OutputDir, SinkFile};
use crate::config::DownloadConfig;

/// Settings baked into an [`HttpClient`] at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Bytes per read/write step.
    pub chunk_size: u64,
    /// Verify certificate chain and hostname.
    pub tls_verify: bool,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time between two reads of the response.
    pub read_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tls_verify: true,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

impl From<&DownloadConfig> for ClientSettings {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            tls_verify: config.tls_verify,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }
}

/// HTTP client for streaming downloads.
///
/// Create once per batch and clone into workers: clones share one connection
/// pool and one TLS context.
///
/// # Example
///
/// ```no_run
/// use bulkfetch_core::{HttpClient, OutputDir, ProgressReporter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let out = OutputDir::reset("./output").await?;
/// let reporter = ProgressReporter::default();
/// let outcome = client
///     .transfer("https://example.com/data/a-t3.nc", &out, &reporter)
///     .await;
/// println!("succeeded: {}", outcome.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    chunk_size: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default settings (TLS verification on).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_settings(ClientSettings::default())
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns the underlying `reqwest::Error` if the TLS backend or connector
    /// cannot be initialised.
    #[instrument(level = "debug")]
    pub fn with_settings(settings: ClientSettings) -> Result<Self, reqwest::Error> {
        if !settings.tls_verify {
            warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .danger_accept_invalid_certs(!settings.tls_verify)
            .user_agent(concat!("bulkfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            chunk_size: usize::try_from(settings.chunk_size).unwrap_or(usize::MAX).max(1),
        })
    }

    /// Creates a client from a validated [`DownloadConfig`].
    ///
    /// # Errors
    ///
    /// See [`with_settings`](Self::with_settings).
    pub fn from_config(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        Self::with_settings(ClientSettings::from(config))
    }

    /// Configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs one transfer to a terminal outcome.
    ///
    /// Never returns an error: every failure is logged and folded into
    /// [`TransferOutcome::Failure`].
    #[instrument(skip(self, sink, reporter), fields(url = %url))]
    pub async fn transfer(
        &self,
        url: &str,
        sink: &OutputDir,
        reporter: &ProgressReporter,
    ) -> TransferOutcome {
        match self.stream_to_sink(url, sink, reporter).await {
            Ok((path, bytes)) => TransferOutcome::Success {
                url: url.to_string(),
                path,
                bytes,
            },
            Err(error) => {
                warn!(url, kind = error.kind().as_str(), error = %error, "transfer failed");
                TransferOutcome::Failure {
                    url: url.to_string(),
                    error,
                }
            }
        }
    }

    /// GETs `url` and streams a 200 body into `sink`.
    ///
    /// Any status other than 200 fails before a destination file is created.
    /// A failure after streaming began leaves the partial file on disk,
    /// holding every byte received up to the failure.
    ///
    /// `reporter.finish` runs exactly once on every exit path, including
    /// failures before the response arrived.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL does not name a file
    /// - The request fails (network error, timeout)
    /// - The server returns a status other than 200
    /// - The body stream breaks or writing to disk fails
    pub async fn stream_to_sink(
        &self,
        url: &str,
        sink: &OutputDir,
        reporter: &ProgressReporter,
    ) -> Result<(PathBuf, u64), DownloadError> {
        let filename = match derive_filename(url) {
            Ok(filename) => filename,
            Err(error) => {
                reporter.finish(url, false);
                return Err(error);
            }
        };
        let mut tracked = TrackedTransfer::new(reporter, &filename);
        debug!(filename = %filename, "starting request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        tracked.begin(url);
        let mut file = sink.open_for_write(&filename).await?;
        let path = file.path().to_path_buf();

        if let Err(error) = copy_body(response, url, &mut file, &tracked, self.chunk_size).await {
            if let Err(flush_error) = file.flush().await {
                debug!(error = %flush_error, "flushing partial file failed");
            }
            return Err(error);
        }
        let bytes = file.finish().await?;
        tracked.succeed();

        info!(path = %path.display(), bytes, "transfer complete");
        Ok((path, bytes))
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Copies the body chunk by chunk, reporting the running total after each write.
async fn copy_body(
    response: reqwest::Response,
    url: &str,
    file: &mut SinkFile,
    tracked: &TrackedTransfer<'_>,
    chunk_size: usize,
) -> Result<(), DownloadError> {
    let mut stream = response.bytes_stream();
    let mut buffer = ChunkBuffer::new(chunk_size);

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                // Keep what was received.
                if !buffer.is_empty() {
                    file.write_chunk(buffer.as_slice()).await?;
                    tracked.report(file.bytes_written());
                }
                return Err(DownloadError::network(url, e));
            }
        };
        let mut rest = &frame[..];
        while !rest.is_empty() {
            rest = buffer.fill(rest);
            if buffer.is_full() {
                file.write_chunk(buffer.as_slice()).await?;
                buffer.clear();
                tracked.report(file.bytes_written());
            }
        }
    }

    if !buffer.is_empty() {
        file.write_chunk(buffer.as_slice()).await?;
        buffer.clear();
        tracked.report(file.bytes_written());
    }
    Ok(())
}

/// Fixed-capacity staging buffer between network frames and disk writes.
///
/// Holds at most `capacity` bytes, so per-transfer payload memory is one
/// chunk plus the frame currently being consumed.
#[derive(Debug)]
pub(crate) struct ChunkBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl ChunkBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Copies as much of `data` as fits and returns the remainder.
    pub(crate) fn fill<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        let take = (self.capacity - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        &data[take..]
    }

    pub(crate) fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    pub(crate) fn allocated(&self) -> usize {
        self.buf.capacity()
    }
}

/// Ties a transfer's progress state to its scope.
///
/// Armed before the request is sent. Dropping without
/// [`succeed`](Self::succeed) reports a failed finish, so the observer hears
/// about every terminal outcome and the reporter's per-file state is cleared
/// on every exit path.
struct TrackedTransfer<'a> {
    reporter: &'a ProgressReporter,
    filename: &'a str,
    done: bool,
}

impl<'a> TrackedTransfer<'a> {
    fn new(reporter: &'a ProgressReporter, filename: &'a str) -> Self {
        Self {
            reporter,
            filename,
            done: false,
        }
    }

    /// The response was accepted and streaming starts.
    fn begin(&self, url: &str) {
        self.reporter.start(self.filename, url);
    }

    fn report(&self, bytes_so_far: u64) {
        self.reporter.report(self.filename, bytes_so_far);
    }

    fn succeed(&mut self) {
        self.done = true;
        self.reporter.finish(self.filename, true);
    }
}

impl Drop for TrackedTransfer<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.reporter.finish(self.filename, false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fresh_sink(temp: &TempDir) -> OutputDir {
        OutputDir::reset(temp.path().join("output")).await.unwrap()
    }

    fn small_chunk_client(chunk_size: u64) -> HttpClient {
        HttpClient::with_settings(ClientSettings {
            chunk_size,
            ..ClientSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_chunk_buffer_never_exceeds_capacity() {
        let mut buffer = ChunkBuffer::new(4);
        let rest = buffer.fill(b"abcdefghij");
        assert_eq!(rest, b"efghij");
        assert!(buffer.is_full());
        assert_eq!(buffer.as_slice(), b"abcd");
        buffer.clear();

        let rest = buffer.fill(b"xy");
        assert!(rest.is_empty());
        assert!(!buffer.is_full());
        assert_eq!(buffer.allocated(), 4);
    }

    #[test]
    fn test_chunk_buffer_zero_capacity_clamped() {
        let mut buffer = ChunkBuffer::new(0);
        let rest = buffer.fill(b"ab");
        assert_eq!(rest, b"b");
        assert!(buffer.is_full());
    }

    #[test]
    fn test_client_settings_default_verifies_tls() {
        let settings = ClientSettings::default();
        assert!(settings.tls_verify);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_client_settings_from_config() {
        let config = DownloadConfig {
            chunk_size: 4096,
            tls_verify: false,
            connect_timeout_secs: 5,
            read_timeout_secs: 7,
            ..DownloadConfig::default()
        };
        let settings = ClientSettings::from(&config);
        assert_eq!(settings.chunk_size, 4096);
        assert!(!settings.tls_verify);
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.read_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_transfer_success_writes_exact_bytes() {
        let mock_server = MockServer::start().await;
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/data/a-t3.nc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let reporter = ProgressReporter::new(1024);
        let client = small_chunk_client(1024);

        let url = format!("{}/data/a-t3.nc", mock_server.uri());
        let outcome = client.transfer(&url, &sink, &reporter).await;

        match outcome {
            TransferOutcome::Success { path, bytes, .. } => {
                assert_eq!(bytes, 10_000);
                assert_eq!(std::fs::read(path).unwrap(), body);
            }
            TransferOutcome::Failure { error, .. } => panic!("unexpected failure: {error}"),
        }
        assert_eq!(reporter.tracked(), 0, "progress state must be released");
    }

    #[tokio::test]
    async fn test_transfer_non_200_creates_no_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/b-t3.nc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let reporter = ProgressReporter::default();

        let url = format!("{}/data/b-t3.nc", mock_server.uri());
        let outcome = HttpClient::new().transfer(&url, &sink, &reporter).await;

        match outcome {
            TransferOutcome::Failure { error, .. } => {
                assert!(matches!(
                    error,
                    DownloadError::HttpStatus { status: 404, .. }
                ));
            }
            TransferOutcome::Success { .. } => panic!("404 must fail"),
        }
        assert!(!sink.path().join("b-t3.nc").exists());
        assert_eq!(reporter.tracked(), 0);
    }

    #[tokio::test]
    async fn test_transfer_2xx_other_than_200_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/partial.nc"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"part".to_vec()))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let url = format!("{}/partial.nc", mock_server.uri());
        let outcome = HttpClient::new()
            .transfer(&url, &sink, &ProgressReporter::default())
            .await;

        assert!(!outcome.is_success());
        assert!(!sink.path().join("partial.nc").exists());
    }

    #[tokio::test]
    async fn test_transfer_empty_body_creates_empty_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c-t3.nc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let url = format!("{}/c-t3.nc", mock_server.uri());
        let outcome = HttpClient::new()
            .transfer(&url, &sink, &ProgressReporter::default())
            .await;

        assert_eq!(outcome.bytes(), Some(0));
        let meta = std::fs::metadata(sink.path().join("c-t3.nc")).unwrap();
        assert_eq!(meta.len(), 0);
    }

    #[tokio::test]
    async fn test_transfer_invalid_url_fails_without_request() {
        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let outcome = HttpClient::new()
            .transfer("https://example.com/dir/", &sink, &ProgressReporter::default())
            .await;

        match outcome {
            TransferOutcome::Failure { error, .. } => {
                assert!(matches!(error, DownloadError::InvalidUrl { .. }));
            }
            TransferOutcome::Success { .. } => panic!("directory URL must fail"),
        }
        assert_eq!(std::fs::read_dir(sink.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_connection_refused_is_network_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let url = format!("http://127.0.0.1:{port}/a.nc");
        let outcome = HttpClient::new()
            .transfer(&url, &sink, &ProgressReporter::default())
            .await;

        match outcome {
            TransferOutcome::Failure { error, .. } => {
                assert_eq!(error.kind(), crate::download::FailureKind::Network);
            }
            TransferOutcome::Success { .. } => panic!("refused connection must fail"),
        }
        assert!(!sink.path().join("a.nc").exists());
    }

    #[derive(Default)]
    struct Finishes {
        started: std::sync::atomic::AtomicUsize,
        failed: std::sync::Mutex<Vec<String>>,
    }

    impl crate::download::ProgressObserver for Finishes {
        fn transfer_started(&self, _filename: &str) {
            self.started
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        fn transfer_finished(&self, filename: &str, succeeded: bool) {
            if !succeeded {
                self.failed.lock().unwrap().push(filename.to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_failures_before_streaming_reach_the_observer() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b-t3.nc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let observer = std::sync::Arc::new(Finishes::default());
        let reporter = ProgressReporter::default().with_observer(observer.clone());
        let client = HttpClient::new();

        let not_found = format!("{}/b-t3.nc", mock_server.uri());
        let refused = format!("http://127.0.0.1:{port}/gone.nc");
        for url in [not_found.as_str(), refused.as_str(), "https://example.com/dir/"] {
            let outcome = client.transfer(url, &sink, &reporter).await;
            assert!(!outcome.is_success(), "{url}");
        }

        assert_eq!(
            observer.started.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(
            *observer.failed.lock().unwrap(),
            vec![
                "b-t3.nc".to_string(),
                "gone.nc".to_string(),
                "https://example.com/dir/".to_string(),
            ]
        );
        assert_eq!(reporter.tracked(), 0);
    }

    #[tokio::test]
    async fn test_transfer_read_timeout_is_network_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.nc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let sink = fresh_sink(&temp).await;
        let client = HttpClient::with_settings(ClientSettings {
            read_timeout: Duration::from_millis(300),
            ..ClientSettings::default()
        })
        .unwrap();

        let url = format!("{}/slow.nc", mock_server.uri());
        let outcome = client
            .transfer(&url, &sink, &ProgressReporter::default())
            .await;

        match outcome {
            TransferOutcome::Failure { error, .. } => {
                assert_eq!(error.kind(), crate::download::FailureKind::Network);
            }
            TransferOutcome::Success { .. } => panic!("delayed response must time out"),
        }
    }
}
