//! Sorted replay of recorded offsets.

use std::ptr::NonNull;

use crate::offset::{OffsetCodec, OffsetInRegion};
use crate::segmented::SegmentedArray;

/// Transient flatten-and-sort stage between recording and replay.
///
/// [`SortedSnapshot::prepare`] copies every recorded offset out of the
/// buffer chain into one exactly-sized vector and sorts it. The snapshot
/// then backs any number of [`SortedSnapshot::iterate`] calls until
/// [`SortedSnapshot::release`] discards it. Preparing an empty array is
/// legal and produces an empty snapshot without allocating.
pub(crate) struct SortedSnapshot {
    offsets: Option<Vec<OffsetInRegion>>,
}

impl SortedSnapshot {
    pub(crate) const fn new() -> Self {
        Self { offsets: None }
    }

    pub(crate) const fn is_prepared(&self) -> bool {
        self.offsets.is_some()
    }

    /// Flatten the array's buffers in insertion order, then sort ascending.
    ///
    /// Duplicate offsets survive; an unstable sort is enough because equal
    /// offsets are indistinguishable.
    pub(crate) fn prepare(&mut self, array: &SegmentedArray<OffsetInRegion>) {
        debug_assert!(!self.is_prepared(), "snapshot already prepared");
        let mut offsets = Vec::with_capacity(array.num_elems());
        array.for_each_slice(|slice| offsets.extend_from_slice(slice));
        debug_assert_eq!(offsets.len(), array.num_elems());
        offsets.sort_unstable();
        self.offsets = Some(offsets);
    }

    /// Deliver each snapshot entry, decoded to an absolute address, in
    /// ascending order.
    ///
    /// `expected` is the owning array's current element count; a mismatch
    /// means entries were recorded after [`SortedSnapshot::prepare`].
    pub(crate) fn iterate(
        &self,
        codec: &OffsetCodec,
        expected: usize,
        mut f: impl FnMut(NonNull<u8>),
    ) {
        debug_assert!(self.is_prepared(), "iterate without a prepared snapshot");
        let Some(offsets) = self.offsets.as_ref() else {
            return;
        };
        debug_assert_eq!(
            offsets.len(),
            expected,
            "entries were recorded between pre_iterate and iterate"
        );
        for &offset in offsets {
            f(codec.from_offset(offset));
        }
    }

    /// Discard the snapshot.
    pub(crate) fn release(&mut self) {
        debug_assert!(self.is_prepared(), "release without a prepared snapshot");
        self.offsets = None;
    }
}
