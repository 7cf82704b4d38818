//! Logical server facade and tracked connections.
//!
//! A [`LogicalServer`] presents one named pool to the host proxy. Dialing
//! runs the pool's strategy, opens the TCP connection under the dial
//! deadline, records the attempt into the chosen backend's window and hands
//! back a [`TrackedConn`] whose teardown detaches the player exactly once.

use std::net::{SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::history::HistoryManager;
use crate::load_balancer::backend::{Backend, BackendStats};
use crate::load_balancer::{filter_available, health_score, Strategy};
use crate::observability::metrics;
use crate::proxy::{Player, ProxyServer};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("no available backend for server {server}")]
    NoBackendAvailable { server: String },

    #[error("failed to connect to backend {backend}: {source}")]
    DialFailed {
        backend: String,
        #[source]
        source: std::io::Error,
    },
}

/// One named pool of backends, registered with the host proxy.
pub struct LogicalServer {
    name: String,
    backends: Vec<Arc<Backend>>,
    strategy: Box<dyn Strategy>,
    jitter_threshold: f64,
    dial_timeout: Duration,
    default_addr: Option<SocketAddr>,
    history: Arc<HistoryManager>,
}

impl LogicalServer {
    pub fn new(
        name: String,
        backends: Vec<Arc<Backend>>,
        strategy: Box<dyn Strategy>,
        jitter_threshold: f64,
        dial_timeout: Duration,
        history: Arc<HistoryManager>,
    ) -> Self {
        // Hosts that expect a single concrete address get the first
        // backend's resolution.
        let default_addr = backends
            .first()
            .and_then(|backend| backend.addr().to_socket_addrs().ok())
            .and_then(|mut addrs| addrs.next());

        Self {
            name,
            backends,
            strategy,
            jitter_threshold,
            dial_timeout,
            default_addr,
            history,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.default_addr
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn available_count(&self) -> usize {
        self.backends
            .iter()
            .filter(|backend| backend.is_available())
            .count()
    }

    /// Open a backend connection for `player`.
    ///
    /// The elapsed dial time lands in the backend's window whether or not
    /// the dial succeeds; a failed dial also extends the failure streak.
    /// There is no internal retry: the next player connect is the retry
    /// unit.
    pub async fn dial(&self, player: &dyn Player) -> Result<TrackedConn, DialError> {
        let Some(backend) =
            self.strategy
                .select(&self.backends, self.jitter_threshold, &self.history)
        else {
            metrics::record_dial(&self.name, false);
            return Err(DialError::NoBackendAvailable {
                server: self.name.clone(),
            });
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.dial_timeout, TcpStream::connect(backend.addr())).await;
        let latency = start.elapsed();
        backend.record_latency(latency);

        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                backend.record_failure();
                metrics::record_dial(&self.name, false);
                return Err(DialError::DialFailed {
                    backend: backend.addr().to_string(),
                    source: err,
                });
            }
            Err(_) => {
                backend.record_failure();
                metrics::record_dial(&self.name, false);
                return Err(DialError::DialFailed {
                    backend: backend.addr().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timed out"),
                });
            }
        };

        backend.record_success();
        backend.attach_player(player.username());
        metrics::record_dial(&self.name, true);

        tracing::debug!(
            server = %self.name,
            backend = %backend.addr(),
            player = %player.username(),
            latency_ms = latency.as_millis() as u64,
            "Player dialed backend"
        );

        Ok(TrackedConn::new(stream, backend, player.username().to_string()))
    }

    /// Per-backend snapshots with the relative score each backend would be
    /// selected by, including the history adjustment.
    pub fn scored_stats(&self) -> Vec<ScoredBackend> {
        let available = filter_available(&self.backends);
        let (min_latency, min_jitter) = health_score::pool_minimums(&available);

        self.backends
            .iter()
            .map(|backend| ScoredBackend {
                score: health_score::score_backend(backend, min_latency, min_jitter, &self.history),
                stats: backend.stats(),
            })
            .collect()
    }
}

#[async_trait]
impl ProxyServer for LogicalServer {
    fn name(&self) -> &str {
        LogicalServer::name(self)
    }

    fn addr(&self) -> Option<SocketAddr> {
        LogicalServer::addr(self)
    }

    async fn dial(&self, player: &dyn Player) -> Result<TrackedConn, DialError> {
        LogicalServer::dial(self, player).await
    }
}

/// One backend's snapshot together with its current selection score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredBackend {
    pub stats: BackendStats,
    pub score: i32,
}

/// A backend connection that detaches its player exactly once, on shutdown
/// or drop, whichever comes first. The wrapper assumes single use; it holds
/// its backend only to run the detach.
pub struct TrackedConn {
    stream: TcpStream,
    backend: Arc<Backend>,
    player: String,
    released: AtomicBool,
}

impl std::fmt::Debug for TrackedConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedConn")
            .field("player", &self.player)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

impl TrackedConn {
    fn new(stream: TcpStream, backend: Arc<Backend>, player: String) -> Self {
        Self {
            stream,
            backend,
            player,
            released: AtomicBool::new(false),
        }
    }

    /// Address of the backend this connection is attached to.
    pub fn backend_addr(&self) -> &str {
        self.backend.addr()
    }

    /// Detach the player from the backend. Safe to call any number of
    /// times; only the first call decrements.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::Relaxed) {
            self.backend.detach_player(&self.player);
        }
    }
}

impl Drop for TrackedConn {
    fn drop(&mut self) {
        self.release();
    }
}

impl AsyncRead for TrackedConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        this.release();
        Pin::new(&mut this.stream).poll_shutdown(cx)
    }
}
