//! Minimal HTTP/1.1 server that measures how many requests it serves at once.
//!
//! Every response is delayed, carries `Connection: close`, and returns the
//! same body, so overlapping requests from a worker pool are observable. A
//! truncated variant promises more bytes than it sends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
}

pub struct ProbeServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

impl ProbeServer {
    pub async fn start(delay: Duration, body: Vec<u8>) -> Self {
        let declared = body.len();
        Self::spawn(delay, body, declared).await
    }

    /// Advertises `declared` bytes but closes after sending `body`, so the
    /// client sees the connection drop mid-body.
    pub async fn start_truncated(declared: usize, body: Vec<u8>) -> Self {
        assert!(declared > body.len());
        Self::spawn(Duration::ZERO, body, declared).await
    }

    async fn spawn(delay: Duration, body: Vec<u8>, declared: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());
        let body = Arc::new(body);

        let shared = Arc::clone(&counters);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counters = Arc::clone(&shared);
                let body = Arc::clone(&body);
                tokio::spawn(serve(stream, counters, delay, body, declared));
            }
        });

        Self {
            addr,
            counters,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Requests currently being served.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of requests ever served at the same time.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Requests that received a response.
    pub fn served(&self) -> usize {
        self.counters.served.load(Ordering::SeqCst)
    }

    /// Polls until `n` requests are in progress.
    pub async fn wait_for_active(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.active() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

impl Drop for ProbeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    counters: Arc<Counters>,
    delay: Duration,
    body: Arc<Vec<u8>>,
    declared: usize,
) {
    let mut request = Vec::new();
    let mut buf = [0_u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
    counters.peak.fetch_max(now, Ordering::SeqCst);

    tokio::time::sleep(delay).await;

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&body).await;
    let _ = stream.shutdown().await;

    counters.served.fetch_add(1, Ordering::SeqCst);
    counters.active.fetch_sub(1, Ordering::SeqCst);
}
