//! Buffer management for the packet hot path.
//!
//! - [`BufferPool`]: pre-allocated, reusable byte buffers shared by every
//!   connection in the process, so per-frame encoding does not churn the heap.
//! - [`FrameRing`]: fixed-capacity circular store that stages captured frames
//!   between a synchronous producer thread and the async send pump.

mod pool;
mod ring;

pub use pool::{BufferPool, PoolStats, PooledBuf};
pub use ring::FrameRing;
