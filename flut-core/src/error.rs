//! Domain-specific error types for the pixel streaming engine.
//!
//! All fallible operations return `Result<T, FlutError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the streaming engine.
#[derive(Debug, Error)]
pub enum FlutError {
    // ── Input validation ─────────────────────────────────────────
    /// Scale factors must be finite and strictly positive.
    #[error("invalid scale factor {0} (must be finite and > 0)")]
    InvalidScale(f32),

    /// The scaled frame rounds to zero area in at least one axis.
    #[error("scaled frame has no area: {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    /// Chunk counts must be at least 1.
    #[error("invalid chunk count {0} (must be at least 1)")]
    InvalidChunkCount(usize),

    /// Worker counts must be at least 1.
    #[error("invalid worker count {0} (must be at least 1)")]
    InvalidWorkerCount(usize),

    /// A stream was started with no images loaded.
    #[error("image set is empty")]
    EmptyImageSet,

    /// A sequence must contain at least one frame.
    #[error("sequence contains no frames")]
    EmptySequence,

    /// Frame durations must be given once for all frames or once per frame.
    #[error("duration count mismatch: {frames} frames, {durations} durations")]
    DurationCountMismatch { frames: usize, durations: usize },

    // ── Pixel grid errors ────────────────────────────────────────
    /// The raw sample buffer does not match the declared dimensions.
    #[error("grid dimension mismatch: {width}x{height} needs {expected} samples, got {actual}")]
    GridDimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Grids must have a non-zero width and height.
    #[error("grid has no area: {width}x{height}")]
    EmptyGrid { width: u32, height: u32 },

    // ── Transport errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),
}
