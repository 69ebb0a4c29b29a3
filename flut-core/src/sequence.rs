//! Frame sequence and the time-based sequencer that cycles through it.
//!
//! A [`Sequence`] is the ordered list of streamable frames for one run:
//! per frame, the built [`Frame`], its partitioned [`ChunkSet`], a display
//! duration, and the prebuilt per-chunk payloads (`OFFSET` header plus
//! chunk bytes) that workers send verbatim.
//!
//! The [`Sequencer`] is the single synchronization point between the
//! control side (which calls [`advance`](Sequencer::advance) on a fixed
//! cadence) and the streaming workers (which pull the current payloads).
//! It exposes only pull-based queries — no callbacks, no event loop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::chunk::ChunkSet;
use crate::error::FlutError;
use crate::frame::Frame;
use crate::protocol;

// ── Sequence ─────────────────────────────────────────────────────

/// One frame of a sequence: the built frame, its chunk partition, and
/// how long it stays current in an animation.
#[derive(Debug, Clone)]
pub struct SequenceEntry {
    pub frame: Arc<Frame>,
    pub chunks: Arc<ChunkSet>,
    pub duration: Duration,
}

/// An ordered, non-empty list of streamable frames sharing one origin.
#[derive(Debug)]
pub struct Sequence {
    entries: Vec<SequenceEntry>,
    origin: (u32, u32),
    /// Per entry, per chunk: `OFFSET` header + chunk bytes, prebuilt so a
    /// worker send is a single atomic buffer.
    payloads: Vec<Vec<Bytes>>,
}

impl Sequence {
    /// Assemble a sequence and prebuild its wire payloads.
    ///
    /// The `OFFSET` header is prepended to every chunk rather than sent
    /// separately: the server keeps no reliable per-connection state
    /// between writes, and a single buffer cannot interleave with other
    /// workers' sends.
    pub fn new(entries: Vec<SequenceEntry>, origin: (u32, u32)) -> Result<Self, FlutError> {
        if entries.is_empty() {
            return Err(FlutError::EmptySequence);
        }

        let header = protocol::encode_offset(origin.0, origin.1);
        let payloads = entries
            .iter()
            .map(|entry| {
                entry
                    .chunks
                    .chunks()
                    .iter()
                    .map(|chunk| {
                        let mut buf = BytesMut::with_capacity(header.len() + chunk.len());
                        buf.put_slice(&header);
                        buf.put_slice(chunk);
                        buf.freeze()
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            entries,
            origin,
            payloads,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }
}

// ── Sequencer ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SequencerState {
    sequence: Option<Sequence>,
    index: usize,
    accumulated: Duration,
}

/// Shared cursor over a [`Sequence`].
///
/// Two states: **Idle** (no sequence loaded — every query returns
/// `None`/zero) and **Active**. Mutation and reads go through one
/// internal lock; critical sections only clone `Arc`s and `Bytes`
/// handles, so workers never hold the lock across a send.
#[derive(Debug, Default)]
pub struct Sequencer {
    state: Mutex<SequencerState>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SequencerState> {
        // State stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load a sequence, replacing any previous one. Idle → Active.
    pub fn load(&self, sequence: Sequence) {
        let mut state = self.lock();
        state.sequence = Some(sequence);
        state.index = 0;
        state.accumulated = Duration::ZERO;
    }

    /// Drop the loaded sequence. Active → Idle.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.sequence = None;
        state.index = 0;
        state.accumulated = Duration::ZERO;
    }

    pub fn is_active(&self) -> bool {
        self.lock().sequence.is_some()
    }

    /// Account for `elapsed` wall time and step the current index while
    /// the accumulated time covers the current frame's duration.
    ///
    /// Single-frame sequences never advance. Returns the new index when
    /// it changed.
    pub fn advance(&self, elapsed: Duration) -> Option<usize> {
        let mut state = self.lock();

        let len = state.sequence.as_ref().map_or(0, Sequence::len);
        if len <= 1 {
            return None;
        }

        state.accumulated += elapsed;

        let mut stepped = false;
        loop {
            let Some(seq) = state.sequence.as_ref() else {
                break;
            };
            let duration = seq.entries[state.index].duration;
            // A zero duration would spin the loop forever.
            if duration.is_zero() || state.accumulated < duration {
                break;
            }
            state.accumulated -= duration;
            state.index = (state.index + 1) % len;
            stepped = true;
        }

        stepped.then_some(state.index)
    }

    /// The active `(frame, chunk set)` pair, or `None` when Idle.
    pub fn current(&self) -> Option<(Arc<Frame>, Arc<ChunkSet>)> {
        let state = self.lock();
        let seq = state.sequence.as_ref()?;
        let entry = &seq.entries[state.index];
        Some((Arc::clone(&entry.frame), Arc::clone(&entry.chunks)))
    }

    /// The current frame's prebuilt payload for one chunk index.
    pub fn current_payload(&self, chunk: usize) -> Option<Bytes> {
        let state = self.lock();
        let seq = state.sequence.as_ref()?;
        seq.payloads[state.index].get(chunk).cloned()
    }

    /// Chunk count of the current frame; 0 when Idle.
    pub fn chunk_count(&self) -> usize {
        let state = self.lock();
        state
            .sequence
            .as_ref()
            .map_or(0, |seq| seq.payloads[state.index].len())
    }

    /// Resolution of the current frame, or `None` when Idle.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        let state = self.lock();
        let seq = state.sequence.as_ref()?;
        Some(seq.entries[state.index].frame.size())
    }

    /// Index of the current frame; 0 when Idle.
    pub fn current_index(&self) -> usize {
        self.lock().index
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{PixelGrid, Rgba};

    fn entry(color: Rgba, millis: u64) -> SequenceEntry {
        let grid = PixelGrid::new(1, 1, vec![color]).unwrap();
        let frame = Arc::new(Frame::build(&grid, 1.0, (0, 0)).unwrap());
        let chunks = frame.partition(1, false).unwrap();
        SequenceEntry {
            frame,
            chunks,
            duration: Duration::from_millis(millis),
        }
    }

    fn three_frame_sequencer() -> Sequencer {
        let entries = vec![
            entry(Rgba::opaque(0xff, 0, 0), 100),
            entry(Rgba::opaque(0, 0xff, 0), 100),
            entry(Rgba::opaque(0, 0, 0xff), 100),
        ];
        let sequencer = Sequencer::new();
        sequencer.load(Sequence::new(entries, (0, 0)).unwrap());
        sequencer
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(matches!(
            Sequence::new(Vec::new(), (0, 0)),
            Err(FlutError::EmptySequence)
        ));
    }

    #[test]
    fn payload_prepends_offset_header() {
        let seq = Sequence::new(vec![entry(Rgba::opaque(0xff, 0, 0), 100)], (7, 9)).unwrap();
        let sequencer = Sequencer::new();
        sequencer.load(seq);

        let payload = sequencer.current_payload(0).unwrap();
        assert_eq!(&payload[..], b"OFFSET 7 9\nPX 0 0 ff0000\n");
    }

    #[test]
    fn idle_queries_are_empty() {
        let sequencer = Sequencer::new();
        assert!(!sequencer.is_active());
        assert!(sequencer.current().is_none());
        assert!(sequencer.current_payload(0).is_none());
        assert_eq!(sequencer.chunk_count(), 0);
        assert!(sequencer.frame_size().is_none());
        assert!(sequencer.advance(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn advance_cycles_with_wraparound() {
        let sequencer = three_frame_sequencer();

        // 250 ms over 100 ms frames: 0 → 1 → 2.
        assert_eq!(sequencer.advance(Duration::from_millis(250)), Some(2));
        assert_eq!(sequencer.current_index(), 2);

        // Another 50 ms completes the third frame's window and wraps.
        assert_eq!(sequencer.advance(Duration::from_millis(50)), Some(0));
    }

    #[test]
    fn advance_accumulates_across_calls() {
        let sequencer = three_frame_sequencer();

        assert_eq!(sequencer.advance(Duration::from_millis(60)), None);
        assert_eq!(sequencer.advance(Duration::from_millis(60)), Some(1));
        assert_eq!(sequencer.current_index(), 1);
    }

    #[test]
    fn single_frame_never_advances() {
        let sequencer = Sequencer::new();
        let seq = Sequence::new(vec![entry(Rgba::opaque(1, 2, 3), 10)], (0, 0)).unwrap();
        sequencer.load(seq);

        assert_eq!(sequencer.advance(Duration::from_secs(60)), None);
        assert_eq!(sequencer.current_index(), 0);
    }

    #[test]
    fn reset_returns_to_idle() {
        let sequencer = three_frame_sequencer();
        assert!(sequencer.is_active());

        sequencer.reset();
        assert!(!sequencer.is_active());
        assert!(sequencer.current().is_none());
    }

    #[test]
    fn load_resets_cursor() {
        let sequencer = three_frame_sequencer();
        sequencer.advance(Duration::from_millis(150));
        assert_eq!(sequencer.current_index(), 1);

        let entries = vec![
            entry(Rgba::opaque(1, 1, 1), 100),
            entry(Rgba::opaque(2, 2, 2), 100),
        ];
        sequencer.load(Sequence::new(entries, (0, 0)).unwrap());
        assert_eq!(sequencer.current_index(), 0);
    }
}
