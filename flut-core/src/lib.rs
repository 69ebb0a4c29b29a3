//! # flut-core
//!
//! Pixel streaming engine for ack-less "pixel-flooding" canvas servers:
//! clients saturate a TCP connection with redundant `PX x y RRGGBB[AA]`
//! writes; throughput, not any single write, determines the visual
//! result.
//!
//! This crate contains:
//! - **Grid**: `PixelGrid`, `Rgba` — the decoded-bitmap data model
//! - **Frame**: `Frame` — opaque-pixel lists at a target scale, with a
//!   memoized chunk cache
//! - **Protocol**: the `PX`/`OFFSET` text encoder
//! - **Chunk**: `ChunkSet` — line-aligned buffer partitioning for
//!   parallel senders, with optional dithering shuffle
//! - **Sequence**: `Sequence`, `Sequencer` — time-cycled frame animation
//! - **Worker**: `WorkerPool` — persistent senders with cooperative,
//!   generation-token cancellation
//! - **Session**: `SessionController` — Start/Stop/Restart orchestration
//! - **Transport**: the caller-owned connection seam (`TcpTransport`,
//!   `MemoryTransport`)
//! - **Error**: `FlutError` — typed, `thiserror`-based error hierarchy

pub mod chunk;
pub mod error;
pub mod frame;
pub mod grid;
pub mod protocol;
pub mod sequence;
pub mod session;
pub mod transport;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use chunk::ChunkSet;
pub use error::FlutError;
pub use frame::Frame;
pub use grid::{PixelGrid, Rgba};
pub use protocol::PlacedPixel;
pub use sequence::{Sequence, SequenceEntry, Sequencer};
pub use session::{SessionController, StreamParams, StreamStatus};
pub use transport::{MemoryTransport, TcpTransport, Transport};
pub use worker::WorkerPool;
