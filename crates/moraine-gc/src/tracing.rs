//! Evacuation-failure tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for the record-and-replay protocol.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Phases of the per-region replay protocol (sort/iterate/release).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EvacPhase {
        /// Flatten and sort the recorded offsets.
        Sort,
        /// Deliver the sorted addresses to the fix-up closure.
        Iterate,
        /// Return the buffers to the shared free list.
        Release,
    }

    /// Stable identifier for one fix-up cycle.
    ///
    /// This ID correlates all events emitted while one safepoint drains the
    /// failed-region registry. It is a monotonically increasing counter
    /// that starts at 1 and wraps on overflow (which is effectively
    /// infinite for practical collection frequencies).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CycleId(pub u64);

    /// Global counter for generating unique cycle IDs.
    static NEXT_CYCLE_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique cycle ID.
    pub fn next_cycle_id() -> CycleId {
        CycleId(NEXT_CYCLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span covering one drain of the failed-region registry.
    pub fn trace_cycle(kind: &str, cycle_id: CycleId) -> span::EnteredSpan {
        span!(Level::DEBUG, "evac_cycle", kind = kind, cycle_id = cycle_id.0).entered()
    }

    /// Create a span for one replay phase of one region.
    pub fn trace_phase(phase: EvacPhase, region_idx: u32) -> span::EnteredSpan {
        span!(Level::DEBUG, "evac_phase", phase = ?phase, region_idx).entered()
    }

    /// Log the start of a replay phase.
    pub fn log_phase_start(phase: EvacPhase, region_idx: u32, entries: usize) {
        tracing::debug!(phase = ?phase, region_idx, entries, "phase_start");
    }

    /// Log the end of a replay phase.
    pub fn log_phase_end(phase: EvacPhase, region_idx: u32, entries: usize) {
        tracing::debug!(phase = ?phase, region_idx, entries, "phase_end");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CycleId(pub u64);

    /// Stub function when tracing is disabled.
    pub fn next_cycle_id() -> CycleId {
        CycleId(0)
    }
}

pub use internal::CycleId;
