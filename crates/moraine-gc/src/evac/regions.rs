//! Registry of regions with at least one evacuation failure.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

use crate::region::RegionIdx;
use crate::safepoint;

/// A fixed-size bitmap whose bits can each be claimed exactly once.
///
/// Claiming is an atomic `fetch_or`, so any number of threads can race on
/// the same bit and exactly one of them wins.
pub struct ClaimBitmap {
    words: Box<[AtomicU64]>,
    num_bits: usize,
}

impl ClaimBitmap {
    const BITS_PER_WORD: usize = 64;

    /// Create a bitmap with `num_bits` unclaimed bits.
    #[must_use]
    pub fn new(num_bits: usize) -> Self {
        let num_words = num_bits.div_ceil(Self::BITS_PER_WORD);
        let words = (0..num_words).map(|_| AtomicU64::new(0)).collect();
        Self { words, num_bits }
    }

    /// Claim bit `idx`, returning `true` only for the claiming caller.
    ///
    /// Bits beyond the bitmap's size cannot be claimed; out-of-range
    /// indices return `false`.
    pub fn claim(&self, idx: usize) -> bool {
        if idx >= self.num_bits {
            return false;
        }
        let mask = 1u64 << (idx % Self::BITS_PER_WORD);
        let prev = self.words[idx / Self::BITS_PER_WORD].fetch_or(mask, Ordering::AcqRel);
        prev & mask == 0
    }

    /// Whether bit `idx` has been claimed.
    ///
    /// Out-of-range indices read as unclaimed.
    #[must_use]
    pub fn is_claimed(&self, idx: usize) -> bool {
        if idx >= self.num_bits {
            return false;
        }
        let mask = 1u64 << (idx % Self::BITS_PER_WORD);
        self.words[idx / Self::BITS_PER_WORD].load(Ordering::Acquire) & mask != 0
    }

    /// Release every claim.
    ///
    /// Callers must make sure no claim is racing with the clear.
    pub fn clear_all(&self) {
        for word in &self.words {
            word.store(0, Ordering::Release);
        }
    }

    /// Bits in this bitmap.
    #[must_use]
    pub const fn num_bits(&self) -> usize {
        self.num_bits
    }
}

/// Which regions recorded at least one evacuation failure this cycle.
///
/// Workers call [`EvacFailureRegions::record`] for every failed object;
/// the claim bitmap collapses that to exactly one registration per region,
/// and the queue preserves the order in which regions first failed. At the
/// safepoint the fix-up driver drains the queue to find the record sets it
/// has to visit, then resets the registry for the next cycle.
pub struct EvacFailureRegions {
    claimed: ClaimBitmap,
    regions: SegQueue<RegionIdx>,
    num_failed: AtomicUsize,
}

impl EvacFailureRegions {
    /// Create a registry covering `max_regions` regions.
    #[must_use]
    pub fn new(max_regions: usize) -> Self {
        Self {
            claimed: ClaimBitmap::new(max_regions),
            regions: SegQueue::new(),
            num_failed: AtomicUsize::new(0),
        }
    }

    /// Register a failure in `region_idx`.
    ///
    /// Returns `true` exactly once per region per cycle, no matter how many
    /// threads race on it; the winner's registration is what
    /// [`EvacFailureRegions::drain`] later delivers. Indices beyond the
    /// registry's capacity are never registered.
    pub fn record(&self, region_idx: RegionIdx) -> bool {
        if self.claimed.claim(region_idx as usize) {
            self.regions.push(region_idx);
            self.num_failed.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Whether `region_idx` has failed this cycle.
    ///
    /// Indices beyond the registry's capacity have never failed.
    #[must_use]
    pub fn contains(&self, region_idx: RegionIdx) -> bool {
        self.claimed.is_claimed(region_idx as usize)
    }

    /// Deliver every failed region exactly once, in first-failure order.
    ///
    /// Must run inside a global safepoint; debug builds assert it.
    pub fn drain(&self, mut f: impl FnMut(RegionIdx)) {
        safepoint::assert_at_safepoint();

        #[cfg(feature = "tracing")]
        let _span = crate::tracing::internal::trace_cycle(
            "evac_fixup",
            crate::tracing::internal::next_cycle_id(),
        );

        while let Some(idx) = self.regions.pop() {
            f(idx);
        }
    }

    /// Forget all claims, readying the registry for the next cycle.
    ///
    /// Any region still queued (because the cycle was abandoned before a
    /// drain) is discarded.
    pub fn reset(&self) {
        while self.regions.pop().is_some() {}
        self.claimed.clear_all();
        self.num_failed.store(0, Ordering::Relaxed);
    }

    /// Regions that failed this cycle.
    #[must_use]
    pub fn num_regions_failed(&self) -> usize {
        self.num_failed.load(Ordering::Relaxed)
    }

    /// Whether any region failed this cycle.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.num_regions_failed() > 0
    }
}
