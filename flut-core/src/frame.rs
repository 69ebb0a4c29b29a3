//! Frame builder — turns a decoded bitmap into a canonical opaque-pixel
//! list at a target scale, plus the per-frame chunk cache.
//!
//! Building is pure: the same grid, scale, and offset always produce the
//! same pixel order (row-major), byte for byte. That determinism is what
//! makes the chunk cache safe to reuse across stream restarts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};

use crate::chunk::ChunkSet;
use crate::error::FlutError;
use crate::grid::{PixelGrid, Rgba};
use crate::protocol::PlacedPixel;

// ── Frame ────────────────────────────────────────────────────────

/// One still image's opaque pixels at a given scale, ready for encoding.
///
/// A frame is immutable once built. It owns the memoized [`ChunkSet`]s
/// derived from it, keyed by `(chunk_count, shuffled)`; rebuilding the
/// frame (rescale, reload) drops the cache with it.
pub struct Frame {
    size: (u32, u32),
    scale_factor: f32,
    pixels: Vec<PlacedPixel>,
    cache: Mutex<HashMap<(usize, bool), Arc<ChunkSet>>>,
}

impl Frame {
    /// Build a frame from `grid`, resampled by `scale`, with every
    /// surviving coordinate translated by `offset`.
    ///
    /// The target size is `round(original * scale)` per axis; resampling
    /// is bilinear and skipped entirely at `scale == 1.0`. The grid is
    /// scanned in row-major order and pixels with alpha 0 are dropped.
    ///
    /// The streaming origin is normally carried by the `OFFSET` header,
    /// not baked in here — pass `(0, 0)` unless composing several images
    /// into one coordinate space. With a zero offset all coordinates lie
    /// in `[0, w) × [0, h)`.
    pub fn build(grid: &PixelGrid, scale: f32, offset: (i64, i64)) -> Result<Self, FlutError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FlutError::InvalidScale(scale));
        }

        let width = (grid.width() as f32 * scale).round() as u32;
        let height = (grid.height() as f32 * scale).round() as u32;
        if width == 0 || height == 0 {
            return Err(FlutError::EmptyFrame { width, height });
        }

        let mut pixels = Vec::new();
        let mut push = |x: u32, y: u32, color: Rgba| {
            if !color.is_transparent() {
                pixels.push(PlacedPixel::new(
                    x as i64 + offset.0,
                    y as i64 + offset.1,
                    color,
                ));
            }
        };

        if scale == 1.0 {
            for y in 0..height {
                for x in 0..width {
                    // In bounds by construction at scale 1.
                    if let Some(color) = grid.get(x, y) {
                        push(x, y, color);
                    }
                }
            }
        } else {
            let resized = imageops::resize(&to_image(grid), width, height, FilterType::Triangle);
            for (x, y, px) in resized.enumerate_pixels() {
                push(x, y, Rgba::new(px.0[0], px.0[1], px.0[2], px.0[3]));
            }
        }

        Ok(Self {
            size: (width, height),
            scale_factor: scale,
            pixels,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Split this frame's encoded buffer into `chunk_count` slices,
    /// optionally shuffling pixel order first.
    ///
    /// Results are memoized per `(chunk_count, shuffled)`: a second call
    /// with the same key returns the cached set without re-encoding.
    /// Re-deriving a multi-megabyte buffer is the dominant cost of a
    /// stream start, so toggling Stop/Start with unchanged parameters
    /// must stay cheap.
    pub fn partition(&self, chunk_count: usize, shuffled: bool) -> Result<Arc<ChunkSet>, FlutError> {
        if chunk_count == 0 {
            return Err(FlutError::InvalidChunkCount(chunk_count));
        }

        // A poisoned lock still guards a valid memo table.
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(set) = cache.get(&(chunk_count, shuffled)) {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(ChunkSet::build(&self.pixels, chunk_count, shuffled)?);
        cache.insert((chunk_count, shuffled), Arc::clone(&set));
        Ok(set)
    }

    /// Target resolution `(width, height)` after scaling.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// The opaque pixels, in row-major build order.
    pub fn pixels(&self) -> &[PlacedPixel] {
        &self.pixels
    }

    /// Number of opaque pixels.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.size)
            .field("scale_factor", &self.scale_factor)
            .field("opaque_pixels", &self.pixels.len())
            .finish()
    }
}

/// Copy a grid into an `image` buffer for resampling.
fn to_image(grid: &PixelGrid) -> image::RgbaImage {
    image::RgbaImage::from_fn(grid.width(), grid.height(), |x, y| {
        // from_fn only asks for in-bounds coordinates.
        let px = grid.get(x, y).unwrap_or(Rgba::new(0, 0, 0, 0));
        image::Rgba([px.r, px.g, px.b, px.a])
    })
}

// ── Tests ────────────────────────────────────────────────────────
