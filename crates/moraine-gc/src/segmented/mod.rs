//! Chunked element storage with pooled buffer reuse.
//!
//! A [`SegmentedArray`] stores elements in fixed-capacity
//! [`SegmentBuffer`]s linked into a chain. Arrays do not free their buffers
//! when cleared; they return them to a shared [`SegmentBufferFreeList`], so
//! the next array that grows picks them up without touching the allocator.
//! This keeps the record path cheap when many regions fill and drain their
//! arrays in every collection cycle.

mod array;
mod buffer;
mod free_list;

pub use array::{AllocOptions, SegmentedArray};
pub use buffer::SegmentBuffer;
pub use free_list::{BufferChain, SegmentBufferFreeList};
