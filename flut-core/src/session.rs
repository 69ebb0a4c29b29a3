//! Session controller — orchestrates Start/Stop/Restart and owns the
//! worker pool.
//!
//! State machine: **Stopped → Starting → Running → Stopped**. Restart is
//! a stop immediately followed by a start; stop is idempotent. Every run
//! is bound to a generation token (a monotonically increasing counter);
//! bumping it is the only cancellation mechanism — live workers compare
//! their captured token before each send and drain themselves out.
//!
//! Frames are only rebuilt when the image set or scale changed since the
//! previous build. Origin or duration tweaks reuse the retained frames —
//! and through their chunk caches the already-encoded [`ChunkSet`]s — so
//! a restart re-derives nothing but the `OFFSET` headers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::chunk::ChunkSet;
use crate::error::FlutError;
use crate::frame::Frame;
use crate::grid::PixelGrid;
use crate::sequence::{Sequence, SequenceEntry, Sequencer};
use crate::transport::Transport;
use crate::worker::WorkerPool;

// ── Parameters & status ──────────────────────────────────────────

/// Everything a stream start needs.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Decoded images, one per animation frame.
    pub grids: Vec<Arc<PixelGrid>>,
    /// Resampling factor applied to every image.
    pub scale: f32,
    /// Streaming origin, carried in the `OFFSET` header of every payload.
    pub origin: (u32, u32),
    /// Number of persistent sender tasks.
    pub worker_count: usize,
    /// Number of chunks each frame buffer is split into.
    pub chunk_count: usize,
    /// Randomize pixel order (dithering).
    pub shuffled: bool,
    /// Per-frame display durations: either one entry applied to every
    /// frame, or exactly one per image.
    pub durations: Vec<Duration>,
}

impl StreamParams {
    /// Reject invalid parameters before any state is touched.
    pub fn validate(&self) -> Result<(), FlutError> {
        if self.grids.is_empty() {
            return Err(FlutError::EmptyImageSet);
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(FlutError::InvalidScale(self.scale));
        }
        if self.worker_count == 0 {
            return Err(FlutError::InvalidWorkerCount(self.worker_count));
        }
        if self.chunk_count == 0 {
            return Err(FlutError::InvalidChunkCount(self.chunk_count));
        }
        if self.durations.len() != 1 && self.durations.len() != self.grids.len() {
            return Err(FlutError::DurationCountMismatch {
                frames: self.grids.len(),
                durations: self.durations.len(),
            });
        }
        Ok(())
    }

    fn duration_for(&self, index: usize) -> Duration {
        if self.durations.len() == 1 {
            self.durations[0]
        } else {
            self.durations[index]
        }
    }
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatus {
    pub running: bool,
    /// Workers still alive; shrinks as workers hit transport failures.
    pub active_workers: usize,
    /// Resolution of the frame currently being streamed.
    pub frame_size: Option<(u32, u32)>,
}

// ── Internal state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Starting,
    Running,
}

/// Frames retained from the previous build, reusable while the image
/// set and scale are unchanged. Dithering is deliberately not part of
/// the key: frames are shuffle-independent, and each frame's chunk
/// cache already memoizes per `(chunk_count, shuffled)`.
struct BuiltFrames {
    grids: Vec<Arc<PixelGrid>>,
    scale: f32,
    frames: Vec<Arc<Frame>>,
}

impl BuiltFrames {
    fn matches(&self, params: &StreamParams) -> bool {
        self.scale.to_bits() == params.scale.to_bits()
            && self.grids.len() == params.grids.len()
            && self
                .grids
                .iter()
                .zip(&params.grids)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

struct ControlState {
    phase: Phase,
    built: Option<BuiltFrames>,
    pool: Option<WorkerPool>,
}

// ── SessionController ────────────────────────────────────────────

/// Owns the sequence, the generation token, and the worker pool.
///
/// The transport is injected and caller-owned; its connect/reconnect
/// lifecycle never belongs to the controller.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    sequencer: Arc<Sequencer>,
    generation: Arc<AtomicU64>,
    active_workers: Arc<AtomicUsize>,
    control: Mutex<ControlState>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sequencer: Arc::new(Sequencer::new()),
            generation: Arc::new(AtomicU64::new(0)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            control: Mutex::new(ControlState {
                phase: Phase::Stopped,
                built: None,
                pool: None,
            }),
        }
    }

    /// The shared sequencer, for the caller's cadence loop to drive
    /// [`advance`](Sequencer::advance) on.
    pub fn sequencer(&self) -> Arc<Sequencer> {
        Arc::clone(&self.sequencer)
    }

    /// The current generation token.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start streaming with `params`.
    ///
    /// No-op while another start is in flight. An implicit stop runs
    /// first when already running. Validation and build failures abort
    /// the start with no partial state: the sequencer stays idle and the
    /// retained frame cache is untouched.
    pub fn start(&self, params: &StreamParams) -> Result<(), FlutError> {
        params.validate()?;

        let (token, reusable) = {
            let mut ctl = self.lock();
            match ctl.phase {
                Phase::Starting => {
                    debug!("start ignored; a start is already in flight");
                    return Ok(());
                }
                Phase::Running => self.halt(&mut ctl),
                Phase::Stopped => {}
            }
            ctl.phase = Phase::Starting;

            let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let reusable = ctl
                .built
                .as_ref()
                .filter(|built| built.matches(params))
                .map(|built| built.frames.clone());
            (token, reusable)
        };

        // The build runs outside the lock; a concurrent stop bumps the
        // generation and the build abandons itself at the next check.
        match self.assemble(params, token, reusable) {
            Ok(Some((frames, sequence))) => {
                let mut ctl = self.lock();
                if self.generation.load(Ordering::SeqCst) != token || ctl.phase != Phase::Starting
                {
                    debug!(generation = token, "start superseded during build");
                    return Ok(());
                }

                self.sequencer.load(sequence);
                let pool = WorkerPool::spawn(
                    params.worker_count,
                    token,
                    Arc::clone(&self.generation),
                    Arc::clone(&self.sequencer),
                    Arc::clone(&self.transport),
                    Arc::clone(&self.active_workers),
                );

                ctl.built = Some(BuiltFrames {
                    grids: params.grids.clone(),
                    scale: params.scale,
                    frames,
                });
                ctl.pool = Some(pool);
                ctl.phase = Phase::Running;

                info!(
                    generation = token,
                    workers = params.worker_count,
                    chunks = params.chunk_count,
                    frames = params.grids.len(),
                    shuffled = params.shuffled,
                    "streaming started"
                );
                Ok(())
            }
            Ok(None) => {
                // Superseded mid-build (a stop won the race).
                let mut ctl = self.lock();
                if ctl.phase == Phase::Starting {
                    ctl.phase = Phase::Stopped;
                }
                Ok(())
            }
            Err(e) => {
                let mut ctl = self.lock();
                if ctl.phase == Phase::Starting {
                    ctl.phase = Phase::Stopped;
                }
                Err(e)
            }
        }
    }

    /// Stop streaming. Idempotent; returns without waiting for workers —
    /// they observe the bumped generation within their poll interval.
    pub fn stop(&self) {
        let mut ctl = self.lock();
        self.halt(&mut ctl);
    }

    /// Stop, then start with `params`.
    pub fn restart(&self, params: &StreamParams) -> Result<(), FlutError> {
        self.stop();
        self.start(params)
    }

    /// Current session snapshot.
    pub fn status(&self) -> StreamStatus {
        let running = self.lock().phase == Phase::Running;
        StreamStatus {
            running,
            active_workers: self.active_workers.load(Ordering::SeqCst),
            frame_size: self.sequencer.frame_size(),
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn halt(&self, ctl: &mut ControlState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.sequencer.reset();
        ctl.pool = None;
        if ctl.phase != Phase::Stopped {
            info!(generation, "streaming stopped");
        }
        ctl.phase = Phase::Stopped;
    }

    /// Build (or reuse) frames and assemble the sequence. Returns
    /// `Ok(None)` when the generation moved on mid-build.
    #[allow(clippy::type_complexity)]
    fn assemble(
        &self,
        params: &StreamParams,
        token: u64,
        reusable: Option<Vec<Arc<Frame>>>,
    ) -> Result<Option<(Vec<Arc<Frame>>, Sequence)>, FlutError> {
        let frames = match reusable {
            Some(frames) => {
                debug!("image set and scale unchanged; reusing built frames");
                frames
            }
            None => {
                let mut frames = Vec::with_capacity(params.grids.len());
                for grid in &params.grids {
                    if self.generation.load(Ordering::SeqCst) != token {
                        return Ok(None);
                    }
                    frames.push(Arc::new(Frame::build(grid, params.scale, (0, 0))?));
                }
                frames
            }
        };

        let mut entries = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            // Cache hit whenever this frame was partitioned with the
            // same chunk count and dithering mode before.
            let chunks: Arc<ChunkSet> = frame.partition(params.chunk_count, params.shuffled)?;
            entries.push(SequenceEntry {
                frame: Arc::clone(frame),
                chunks,
                duration: params.duration_for(index),
            });
        }

        let sequence = Sequence::new(entries, params.origin)?;
        Ok(Some((frames, sequence)))
    }
}

// ── Tests ────────────────────────────────────────────────────────
