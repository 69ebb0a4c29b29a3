//! Transport seam between the streaming engine and the wire.
//!
//! The engine never owns connection lifecycle: a [`Transport`] is
//! constructed, connected, and (if desired) reconnected by the caller,
//! then passed into the session controller by reference. Workers only
//! ever call [`send`](Transport::send).
//!
//! Two implementations ship with the crate: [`TcpTransport`] for a real
//! pixel-flooding server, and [`MemoryTransport`], which collects writes
//! in memory for tests and dry runs.

use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

// ── Transport ────────────────────────────────────────────────────

/// A fire-and-forget byte sink shared by all streaming workers.
///
/// `send` must be atomic with respect to its own buffer: concurrent
/// callers may interleave whole buffers in any order, but never bytes
/// within one call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one buffer to the wire. May block on socket backpressure.
    async fn send(&self, buf: &[u8]) -> std::io::Result<()>;

    /// Whether the underlying connection is still believed usable.
    fn is_connected(&self) -> bool;
}

// ── TcpTransport ─────────────────────────────────────────────────

/// TCP transport over a persistent stream connection.
///
/// Nagle's algorithm is disabled — the whole point of the protocol is
/// saturating the socket with writes. A failed write latches the
/// transport into a disconnected state; recovery means the caller
/// connecting a fresh transport and restarting the session.
pub struct TcpTransport {
    stream: tokio::sync::Mutex<TcpStream>,
    connected: AtomicBool,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect to a pixel-flooding server.
    pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "transport connected");

        Ok(Self {
            stream: tokio::sync::Mutex::new(stream),
            connected: AtomicBool::new(true),
            peer,
        })
    }

    /// Wrap an already-established stream.
    pub fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: tokio::sync::Mutex::new(stream),
            connected: AtomicBool::new(true),
            peer,
        }
    }

    /// The server this transport writes to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, buf: &[u8]) -> std::io::Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport is disconnected",
            ));
        }

        // Holding the lock across write_all keeps the buffer contiguous
        // on the wire.
        let mut stream = self.stream.lock().await;
        match stream.write_all(buf).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ── MemoryTransport ──────────────────────────────────────────────

/// In-memory transport for tests and `--dry-run` streaming.
///
/// Records every buffer it is handed; can be switched into a failing
/// state to exercise worker failure paths.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: StdMutex<Vec<Vec<u8>>>,
    send_count: AtomicUsize,
    bytes_sent: AtomicU64,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `send` calls so far.
    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::Acquire)
    }

    /// Total bytes accepted so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Acquire)
    }

    /// Drain and return everything sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *sent)
    }

    /// Make every subsequent `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, buf: &[u8]) -> std::io::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory transport set to fail",
            ));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(buf.to_vec());
        self.send_count.fetch_add(1, Ordering::AcqRel);
        self.bytes_sent.fetch_add(buf.len() as u64, Ordering::AcqRel);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::Acquire)
    }
}

// ── Tests ────────────────────────────────────────────────────────
