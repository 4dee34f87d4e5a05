//! Concurrency tests for recording across parallel worker threads.
//!
//! Sets are single-owner, so the shared surfaces under test are the buffer
//! free list (get during recording, bulk_add during cleanup) and the
//! failed-region registry's claim race.

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;

use moraine_gc::{EvacFailureRegions, EvacFailureSet, SafepointScope, SegmentBufferFreeList};

#[cfg(miri)]
const RECORDS_PER_THREAD: usize = 96;
#[cfg(not(miri))]
const RECORDS_PER_THREAD: usize = 600;

#[cfg(miri)]
const CHURN_ROUNDS: usize = 2;
#[cfg(not(miri))]
const CHURN_ROUNDS: usize = 25;

const NUM_THREADS: usize = 4;
const SLOT_BYTES: usize = 8;

/// Region bottom pointer that may cross into a worker thread.
#[derive(Clone, Copy)]
struct RegionBottom(NonNull<u8>);

// SAFETY: every test hands each worker a disjoint slice of one backing
// allocation, and nothing dereferences the pointer.
unsafe impl Send for RegionBottom {}

/// One worker's result: its set plus the deltas it recorded, sorted.
struct Worker {
    set: EvacFailureSet,
    deltas: Vec<usize>,
}

// ============================================================================
// Recording in parallel must stay region-local
// ============================================================================

#[test]
fn concurrent_recording_stays_region_local() {
    let region_bytes = RECORDS_PER_THREAD * SLOT_BYTES;
    let mut backing = vec![0u8; NUM_THREADS * region_bytes];
    let base = backing.as_mut_ptr();
    let pool = Arc::new(SegmentBufferFreeList::new());

    let workers: Vec<Worker> = thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let pool = Arc::clone(&pool);
                // SAFETY: each worker gets a disjoint slice of the backing
                // allocation; all later pointer math stays inside it.
                let bottom =
                    RegionBottom(NonNull::new(unsafe { base.add(t * region_bytes) }).unwrap());
                s.spawn(move || {
                    // Capture the Send wrapper whole, not its NonNull field.
                    let bottom = bottom;
                    let mut set = EvacFailureSet::with_free_list(t as u32, bottom.0, pool);
                    let mut deltas = Vec::new();
                    // Record back to front so the replay has to sort.
                    for i in (0..RECORDS_PER_THREAD).rev() {
                        let delta = i * SLOT_BYTES;
                        // SAFETY: delta stays inside this worker's slice.
                        set.record(unsafe {
                            NonNull::new_unchecked(bottom.0.as_ptr().add(delta))
                        });
                        deltas.push(delta);
                    }
                    deltas.sort_unstable();
                    Worker { set, deltas }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let _safepoint = SafepointScope::new();
    for (t, mut worker) in workers.into_iter().enumerate() {
        worker.set.pre_iterate();
        let lo = base as usize + t * region_bytes;
        let hi = lo + region_bytes;
        let mut replayed = Vec::new();
        worker.set.iterate(|addr| {
            let raw = addr.as_ptr() as usize;
            assert!(raw >= lo && raw < hi, "address escaped worker {t}'s region");
            replayed.push(raw - lo);
        });
        worker.set.post_iterate();
        assert_eq!(replayed, worker.deltas, "worker {t} replay mismatch");
    }
}

// ============================================================================
// Pool stays consistent under get/bulk_add churn
// ============================================================================

#[test]
fn pool_survives_concurrent_churn() {
    let region_bytes = RECORDS_PER_THREAD * SLOT_BYTES;
    let mut backing = vec![0u8; NUM_THREADS * region_bytes];
    let base = backing.as_mut_ptr();
    let pool = Arc::new(SegmentBufferFreeList::new());

    thread::scope(|s| {
        for t in 0..NUM_THREADS {
            let pool = Arc::clone(&pool);
            // SAFETY: disjoint per-worker slices, as above.
            let bottom =
                RegionBottom(NonNull::new(unsafe { base.add(t * region_bytes) }).unwrap());
            s.spawn(move || {
                // Capture the Send wrapper whole, not its NonNull field.
                let bottom = bottom;
                for _ in 0..CHURN_ROUNDS {
                    let mut set =
                        EvacFailureSet::with_free_list(t as u32, bottom.0, Arc::clone(&pool));
                    for i in 0..RECORDS_PER_THREAD {
                        // SAFETY: in-slice displacement.
                        set.record(unsafe {
                            NonNull::new_unchecked(bottom.0.as_ptr().add(i * SLOT_BYTES))
                        });
                    }
                    // Dropping the set splices its whole chain back.
                }
            });
        }
    });

    // Quiescent now: every buffer ever allocated is parked in the pool, and
    // the counters must agree with the chain free_all walks.
    let parked = pool.num_buffers();
    assert!(parked > 0);
    assert_eq!(pool.free_all(), parked);
    assert_eq!(pool.num_buffers(), 0);
    assert_eq!(pool.mem_size(), 0);
}

// ============================================================================
// Registry claims are exactly-once under races
// ============================================================================

#[test]
fn racing_workers_claim_each_region_once() {
    const NUM_REGIONS: u32 = 64;

    let registry = Arc::new(EvacFailureRegions::new(NUM_REGIONS as usize));

    let wins_per_thread: Vec<Vec<u32>> = thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                s.spawn(move || {
                    let mut wins = Vec::new();
                    for region in 0..NUM_REGIONS {
                        if registry.record(region) {
                            wins.push(region);
                        }
                    }
                    wins
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut all_wins: Vec<u32> = wins_per_thread.into_iter().flatten().collect();
    all_wins.sort_unstable();
    let expected: Vec<u32> = (0..NUM_REGIONS).collect();
    assert_eq!(all_wins, expected, "some region was claimed twice or not at all");
    assert_eq!(registry.num_regions_failed(), NUM_REGIONS as usize);

    let _safepoint = SafepointScope::new();
    let mut drained = Vec::new();
    registry.drain(|idx| drained.push(idx));
    drained.sort_unstable();
    assert_eq!(drained, expected);
}
