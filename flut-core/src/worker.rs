//! Streaming worker pool — persistent senders that re-transmit the
//! current frame's chunks until their generation is superseded.
//!
//! Each worker is a plain loop on a tokio task (never recursion — these
//! run for hours). Cancellation is cooperative: every iteration compares
//! the generation token captured at spawn time against the live token
//! and exits on mismatch. There is no forced termination anywhere, so a
//! stale worker performs at most one extra send after a stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sequence::Sequencer;
use crate::transport::Transport;

/// Pause between sends so siblings and the control task get scheduled.
const YIELD_INTERVAL: Duration = Duration::from_millis(1);

/// Poll interval while the sequencer is idle (nothing to send yet).
const IDLE_POLL: Duration = Duration::from_millis(5);

// ── WorkerPool ───────────────────────────────────────────────────

/// A bounded set of persistent sender tasks bound to one generation.
///
/// The pool is spawned once per stream start and never resized; changing
/// the worker count requires a restart, which bumps the generation and
/// spawns a fresh pool while the old one drains itself.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    generation: u64,
}

impl WorkerPool {
    /// Spawn exactly `count` workers bound to `generation`.
    ///
    /// Workers exit on their own when `live` no longer matches
    /// `generation` or when a send fails; `active` tracks how many are
    /// still running.
    pub fn spawn(
        count: usize,
        generation: u64,
        live: Arc<AtomicU64>,
        sequencer: Arc<Sequencer>,
        transport: Arc<dyn Transport>,
        active: Arc<AtomicUsize>,
    ) -> Self {
        let workers = (0..count)
            .map(|slot| {
                let live = Arc::clone(&live);
                let sequencer = Arc::clone(&sequencer);
                let transport = Arc::clone(&transport);
                let active = Arc::clone(&active);
                tokio::spawn(run_worker(
                    slot, count, generation, live, sequencer, transport, active,
                ))
            })
            .collect();

        Self {
            workers,
            generation,
        }
    }

    /// Number of workers this pool was spawned with.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The generation token the pool is bound to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ── Worker loop ──────────────────────────────────────────────────

async fn run_worker(
    slot: usize,
    pool_size: usize,
    generation: u64,
    live: Arc<AtomicU64>,
    sequencer: Arc<Sequencer>,
    transport: Arc<dyn Transport>,
    active: Arc<AtomicUsize>,
) {
    active.fetch_add(1, Ordering::SeqCst);
    debug!(slot, generation, "streaming worker started");

    loop {
        // Generation check before every unit of work — the sole
        // cancellation path.
        if live.load(Ordering::SeqCst) != generation {
            debug!(slot, generation, "generation superseded; worker exiting");
            break;
        }

        let chunk_count = sequencer.chunk_count();
        if chunk_count == 0 {
            // Idle sequencer (stopping or mid-rebuild); re-poll shortly.
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        }

        // With one worker per chunk each slot keeps its own chunk;
        // otherwise a uniformly random pick keeps leftover chunks from
        // being systematically under-served.
        let index = if pool_size == chunk_count {
            slot
        } else {
            rand::thread_rng().gen_range(0..chunk_count)
        };

        let Some(payload) = sequencer.current_payload(index) else {
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        if let Err(error) = transport.send(&payload).await {
            // Disconnects are fatal for the worker; reconnecting is the
            // caller's job, via a fresh transport and a restart.
            warn!(slot, %error, "send failed; worker terminating");
            break;
        }

        tokio::time::sleep(YIELD_INTERVAL).await;
    }

    active.fetch_sub(1, Ordering::SeqCst);
}

// ── Tests ────────────────────────────────────────────────────────
