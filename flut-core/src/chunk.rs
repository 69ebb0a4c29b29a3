//! Chunk partitioner — splits one encoded buffer into contiguous slices
//! for parallel transmission.
//!
//! A [`ChunkSet`] partitions the encoded `PX` lines of a frame into
//! `chunk_count` contiguous byte slices, cut on line boundaries so no
//! `PX` command is ever torn across two senders. Concatenating the
//! chunks in index order reconstitutes the full buffer exactly.
//!
//! With `shuffled` set, the pixel list is uniformly permuted *before*
//! encoding, so a partially painted frame appears as scattered dots
//! instead of a top-to-bottom sweep (dithering mode).

use bytes::Bytes;
use rand::seq::SliceRandom;

use crate::error::FlutError;
use crate::protocol::{self, PlacedPixel};

// ── ChunkSet ─────────────────────────────────────────────────────

/// One encoded frame buffer split into contiguous chunks.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    /// The full encoded buffer the chunks slice into.
    buffer: Bytes,
    /// Contiguous, line-aligned slices of `buffer`, in order.
    chunks: Vec<Bytes>,
    /// Number of `PX` lines in `buffer`.
    line_count: usize,
    /// Whether the pixel order was randomized before encoding.
    shuffled: bool,
}

impl ChunkSet {
    /// Encode `pixels` and split the result into `chunk_count` slices.
    ///
    /// All chunks except the last hold `floor(lines / chunk_count)` lines;
    /// the last absorbs the remainder. `chunk_count` may exceed the pixel
    /// count — leading chunks then come out empty and the last takes
    /// everything.
    pub fn build(
        pixels: &[PlacedPixel],
        chunk_count: usize,
        shuffled: bool,
    ) -> Result<Self, FlutError> {
        if chunk_count == 0 {
            return Err(FlutError::InvalidChunkCount(chunk_count));
        }

        let mut permuted;
        let pixels = if shuffled {
            permuted = pixels.to_vec();
            permuted.shuffle(&mut rand::thread_rng());
            permuted.as_slice()
        } else {
            pixels
        };

        let (buffer, line_starts) = protocol::encode_lines(pixels);

        let lines = pixels.len();
        let step = lines / chunk_count;

        // Byte offset where the line at `index` starts; one past the last
        // line maps to the buffer end.
        let offset_at = |index: usize| line_starts.get(index).copied().unwrap_or(buffer.len());

        let mut chunks = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let start = offset_at(i * step);
            let end = if i + 1 == chunk_count {
                buffer.len()
            } else {
                offset_at((i + 1) * step)
            };
            chunks.push(buffer.slice(start..end));
        }

        Ok(Self {
            buffer,
            chunks,
            line_count: lines,
            shuffled,
        })
    }

    /// The full encoded buffer.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// The partition, in index order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// One chunk by index.
    pub fn chunk(&self, index: usize) -> Option<&Bytes> {
        self.chunks.get(index)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of `PX` lines across the whole buffer.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn shuffled(&self) -> bool {
        self.shuffled
    }
}

// ── Tests ────────────────────────────────────────────────────────
