//! Per-region record set for evacuation failures.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::offset::{OffsetCodec, OffsetInRegion};
use crate::region::RegionIdx;
use crate::safepoint;
use crate::segmented::{AllocOptions, SegmentBufferFreeList, SegmentedArray};

use super::iter::SortedSnapshot;
use super::{global_free_list, BUFFER_CAPACITY, MAX_REGION_BUFFERS};

#[cfg(feature = "tracing")]
use crate::tracing::internal::{log_phase_end, log_phase_start, trace_phase, EvacPhase};

/// The addresses of one region's objects that failed to evacuate.
///
/// During the evacuation phase the owning worker thread calls
/// [`EvacFailureSet::record`] for every object it could not copy out of the
/// region. Addresses are stored as [`OffsetInRegion`] values in a chain of
/// pooled segment buffers, so recording is an encode and an append.
///
/// After evacuation, still inside the pause, the fix-up driver runs the
/// replay protocol:
///
/// 1. [`EvacFailureSet::pre_iterate`] snapshots and sorts the offsets,
/// 2. [`EvacFailureSet::iterate`] delivers each failed object's address in
///    ascending order, exactly as many times as it was recorded,
/// 3. [`EvacFailureSet::post_iterate`] discards the snapshot and returns
///    every buffer to the shared free list.
///
/// The set is then empty and ready for the next cycle. Running the protocol
/// on a set with no records is legal and delivers nothing.
pub struct EvacFailureSet {
    region_idx: RegionIdx,
    codec: OffsetCodec,
    offsets: SegmentedArray<OffsetInRegion>,
    snapshot: SortedSnapshot,
}

impl EvacFailureSet {
    /// Create a set for the region `region_idx` whose lowest address is
    /// `bottom`, drawing buffers from the process-wide free list.
    #[must_use]
    pub fn new(region_idx: RegionIdx, bottom: NonNull<u8>) -> Self {
        Self::with_free_list(region_idx, bottom, Arc::clone(global_free_list()))
    }

    /// Create a set that recycles buffers through a caller-supplied free
    /// list instead of the process-wide one.
    #[must_use]
    pub fn with_free_list(
        region_idx: RegionIdx,
        bottom: NonNull<u8>,
        free_list: Arc<SegmentBufferFreeList<OffsetInRegion>>,
    ) -> Self {
        Self {
            region_idx,
            codec: OffsetCodec::new(bottom),
            offsets: SegmentedArray::new(
                AllocOptions::new(BUFFER_CAPACITY, MAX_REGION_BUFFERS),
                free_list,
            ),
            snapshot: SortedSnapshot::new(),
        }
    }

    /// Record the address of an object that failed to evacuate.
    ///
    /// `addr` must lie within this set's region; debug builds assert it.
    /// Recording the same address more than once is allowed, and the
    /// duplicate is replayed as often as it was recorded.
    pub fn record(&mut self, addr: NonNull<u8>) {
        debug_assert!(
            !self.snapshot.is_prepared(),
            "record while an iteration is in progress"
        );
        self.offsets.push(self.codec.to_offset(addr));
    }

    /// Snapshot and sort the recorded offsets for replay.
    pub fn pre_iterate(&mut self) {
        #[cfg(feature = "tracing")]
        let _span = trace_phase(EvacPhase::Sort, self.region_idx);
        #[cfg(feature = "tracing")]
        log_phase_start(EvacPhase::Sort, self.region_idx, self.num_recorded());

        self.snapshot.prepare(&self.offsets);

        #[cfg(feature = "tracing")]
        log_phase_end(EvacPhase::Sort, self.region_idx, self.num_recorded());
    }

    /// Deliver every recorded address in ascending order.
    ///
    /// Must run inside a global safepoint, after
    /// [`EvacFailureSet::pre_iterate`]; debug builds assert both.
    pub fn iterate(&self, f: impl FnMut(NonNull<u8>)) {
        safepoint::assert_at_safepoint();

        #[cfg(feature = "tracing")]
        let _span = trace_phase(EvacPhase::Iterate, self.region_idx);

        self.snapshot.iterate(&self.codec, self.offsets.num_elems(), f);
    }

    /// Drop the snapshot and hand the whole buffer chain back to the free
    /// list, leaving the set empty for the next cycle.
    pub fn post_iterate(&mut self) {
        #[cfg(feature = "tracing")]
        let _span = trace_phase(EvacPhase::Release, self.region_idx);
        #[cfg(feature = "tracing")]
        log_phase_start(EvacPhase::Release, self.region_idx, self.num_recorded());

        self.snapshot.release();
        self.offsets.drop_all();

        #[cfg(feature = "tracing")]
        log_phase_end(EvacPhase::Release, self.region_idx, 0);
    }

    /// Number of recorded failures, duplicates included.
    #[must_use]
    pub fn num_recorded(&self) -> usize {
        self.offsets.num_elems()
    }

    /// Whether no failure has been recorded since the last cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Index of the region this set belongs to.
    #[must_use]
    pub const fn region_idx(&self) -> RegionIdx {
        self.region_idx
    }

    /// Bottom address of the region this set belongs to.
    #[must_use]
    pub const fn bottom(&self) -> NonNull<u8> {
        self.codec.bottom()
    }

    /// Bytes of buffer memory this set currently holds.
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.offsets.mem_size()
    }
}
