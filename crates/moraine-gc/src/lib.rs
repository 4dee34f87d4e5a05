//! Evacuation-failure tracking for a region-based garbage collector.
//!
//! `moraine-gc` records, per heap region, the addresses of objects that
//! could not be evacuated during a collection pause, and replays them in
//! **ascending address order** so a fix-up pass can repair their
//! self-forwarding pointers before the world resumes. Entries are stored as
//! **32-bit in-region offsets** in chains of fixed-size segment buffers,
//! and the buffers of all regions recycle through one shared free list, so
//! the record path stays allocation-free once the pool is warm.
//!
//! # Features
//!
//! - **Compact records**: a failed address costs 4 bytes, not a pointer
//! - **Pooled buffers**: regions grow from and release to a shared free list
//! - **Sorted replay**: each recorded address is delivered exactly once per
//!   record, in ascending order
//! - **Race-free registration**: any number of workers can report the same
//!   region; exactly one registration wins
//!
//! # Quick Start
//!
//! ```
//! use std::ptr::NonNull;
//! use moraine_gc::{EvacFailureSet, SafepointScope};
//!
//! // A small stand-in for a heap region.
//! let mut region = [0u8; 64];
//! let bottom = NonNull::new(region.as_mut_ptr()).unwrap();
//!
//! // A worker records the objects it failed to evacuate.
//! let mut set = EvacFailureSet::new(0, bottom);
//! unsafe {
//!     set.record(NonNull::new_unchecked(bottom.as_ptr().add(24)));
//!     set.record(NonNull::new_unchecked(bottom.as_ptr().add(8)));
//! }
//!
//! // At the safepoint, the fix-up pass replays them in address order.
//! let _safepoint = SafepointScope::new();
//! set.pre_iterate();
//! let mut replayed = Vec::new();
//! set.iterate(|addr| replayed.push(addr.as_ptr() as usize - bottom.as_ptr() as usize));
//! set.post_iterate();
//!
//! assert_eq!(replayed, vec![8, 24]);
//! assert!(set.is_empty());
//! ```
//!
//! # Thread Safety
//!
//! Each [`EvacFailureSet`] has a single owner at a time; recording takes
//! `&mut self`. The shared pieces behind the sets, the buffer free list and
//! the [`EvacFailureRegions`] registry, are safe under any number of
//! concurrent callers. The replay phases run only inside a stop-the-world
//! pause, marked by holding a [`SafepointScope`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod evac;
pub mod offset;
pub mod region;
pub mod safepoint;
pub mod segmented;
pub mod tracing;

// Re-export public API
pub use evac::{
    global_free_list, ClaimBitmap, EvacFailureRegions, EvacFailureSet, BUFFER_CAPACITY,
};
pub use offset::{OffsetCodec, OffsetInRegion};
pub use region::{RegionIdx, LOG_REGION_BYTES, MIN_OBJECT_BYTES, REGION_BYTES, REGION_MASK};
pub use safepoint::{is_at_safepoint, SafepointScope};
pub use segmented::{
    AllocOptions, BufferChain, SegmentBuffer, SegmentBufferFreeList, SegmentedArray,
};
