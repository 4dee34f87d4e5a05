//! Heap region geometry.
//!
//! The heap is carved into fixed-size, power-of-two-aligned regions. Region
//! size is a compile-time constant so that per-region bookkeeping (such as
//! the offset encoding in [`crate::offset`]) can rely on it without carrying
//! runtime configuration around.

/// Log2 of the region size in bytes.
pub const LOG_REGION_BYTES: u32 = 22;

/// Size of each heap region in bytes (4 MiB).
pub const REGION_BYTES: usize = 1 << LOG_REGION_BYTES;

/// Mask for extracting the region base from an address within it.
pub const REGION_MASK: usize = !(REGION_BYTES - 1);

/// Smallest object the heap can hold, in bytes.
///
/// Used to bound the number of objects a region can contain.
pub const MIN_OBJECT_BYTES: usize = 8;

/// Index of a region within the heap.
pub type RegionIdx = u32;

// Any in-region byte displacement must fit the u32 offset encoding.
const _: () = assert!(LOG_REGION_BYTES < 32);
const _: () = assert!(REGION_BYTES % MIN_OBJECT_BYTES == 0);

/// Maximum number of objects a single region can hold.
#[must_use]
pub const fn max_objects_per_region() -> usize {
    REGION_BYTES / MIN_OBJECT_BYTES
}
