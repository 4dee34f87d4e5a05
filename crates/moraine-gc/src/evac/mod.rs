//! Recording and replay of evacuation failures.
//!
//! When an evacuation pause cannot copy an object out of its region, the
//! object stays put with a self-forwarding pointer and its address must be
//! revisited before the pause ends. This module collects those addresses:
//! a [`EvacFailureSet`] per region stores them compactly while workers race
//! through the heap, and [`EvacFailureRegions`] remembers which regions
//! need the fix-up pass at all. Replay is sorted by address so the fix-up
//! walk advances monotonically through each region.

mod iter;
pub mod regions;
pub mod set;

use std::sync::{Arc, LazyLock};

use crate::offset::OffsetInRegion;
use crate::segmented::SegmentBufferFreeList;

pub use regions::{ClaimBitmap, EvacFailureRegions};
pub use set::EvacFailureSet;

/// Offsets stored per segment buffer.
pub const BUFFER_CAPACITY: u32 = 256;

/// Cap on buffers one region's set may chain.
///
/// Effectively unbounded: a worker may record the same object any number
/// of times, so chain growth is limited only by the allocator.
pub(crate) const MAX_REGION_BUFFERS: usize = usize::MAX;

/// The process-wide free list every [`EvacFailureSet`] draws from by
/// default.
///
/// Buffers released by one region's [`EvacFailureSet::post_iterate`] are
/// handed to the next region that grows, across all collection cycles.
/// [`SegmentBufferFreeList::free_all`] trims the pool when the heap wants
/// the memory back.
pub fn global_free_list() -> &'static Arc<SegmentBufferFreeList<OffsetInRegion>> {
    static FREE_LIST: LazyLock<Arc<SegmentBufferFreeList<OffsetInRegion>>> =
        LazyLock::new(|| Arc::new(SegmentBufferFreeList::new()));
    &FREE_LIST
}
