//! Compact in-region address encoding.
//!
//! Every address inside a region can be expressed as a byte displacement
//! from the region's bottom, which fits in a `u32` as long as regions stay
//! below 4 GiB (guaranteed by a compile-time check in [`crate::region`]).
//! Storing displacements instead of full pointers halves the footprint of
//! the recorded entries on 64-bit targets.

use std::ptr::NonNull;

use crate::region::REGION_BYTES;

/// Byte displacement of an object from its region's bottom address.
///
/// Ordering follows address order within the region, so a sorted run of
/// offsets decodes to a sorted run of addresses. The default value is the
/// region bottom itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct OffsetInRegion(u32);

impl OffsetInRegion {
    pub(crate) const fn new(offset: u32) -> Self {
        Self(offset)
    }

    /// Raw byte displacement from the region bottom.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Translates between absolute addresses and [`OffsetInRegion`] values,
/// relative to one region's bottom address.
///
/// The codec never dereferences the region memory; it only performs
/// address arithmetic against the bottom pointer.
#[derive(Debug, Clone, Copy)]
pub struct OffsetCodec {
    bottom: NonNull<u8>,
}

// SAFETY: the codec stores the region's bottom address purely for pointer
// arithmetic and never reads or writes through it.
unsafe impl Send for OffsetCodec {}
// SAFETY: all methods take `&self` and only compute; there is no interior
// mutability.
unsafe impl Sync for OffsetCodec {}

impl OffsetCodec {
    /// Create a codec for the region whose lowest address is `bottom`.
    #[must_use]
    pub const fn new(bottom: NonNull<u8>) -> Self {
        Self { bottom }
    }

    /// Bottom address of the region this codec is bound to.
    #[must_use]
    pub const fn bottom(&self) -> NonNull<u8> {
        self.bottom
    }

    /// Encode an address within the region as an offset.
    ///
    /// Addresses outside `[bottom, bottom + REGION_BYTES)` are a caller bug;
    /// they are caught by assertions in debug builds only.
    #[must_use]
    pub fn to_offset(&self, addr: NonNull<u8>) -> OffsetInRegion {
        let base = self.bottom.as_ptr() as usize;
        let raw = addr.as_ptr() as usize;
        debug_assert!(
            raw >= base,
            "address {raw:#x} below region bottom {base:#x}"
        );
        let delta = raw.wrapping_sub(base);
        debug_assert!(
            delta < REGION_BYTES,
            "address {raw:#x} outside the region at {base:#x}"
        );
        #[allow(clippy::cast_possible_truncation)]
        let offset = OffsetInRegion::new(delta as u32);
        debug_assert_eq!(self.from_offset(offset), addr);
        offset
    }

    /// Decode an offset back into the absolute address it was taken from.
    #[must_use]
    pub fn from_offset(&self, offset: OffsetInRegion) -> NonNull<u8> {
        debug_assert!(
            (offset.get() as usize) < REGION_BYTES,
            "offset {} exceeds region size",
            offset.get()
        );
        // SAFETY: a valid offset stays inside the region mapped at `bottom`,
        // so the result is within the same allocation and non-null.
        unsafe { NonNull::new_unchecked(self.bottom.as_ptr().add(offset.get() as usize)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_stub() -> (Box<[u8; 64]>, NonNull<u8>) {
        let mut mem = Box::new([0u8; 64]);
        let bottom = NonNull::new(mem.as_mut_ptr()).unwrap();
        (mem, bottom)
    }

    #[test]
    fn round_trips_addresses() {
        let (_mem, bottom) = region_stub();
        let codec = OffsetCodec::new(bottom);
        for delta in [0usize, 1, 8, 63] {
            // SAFETY: `delta` stays inside the 64-byte stub allocation.
            let addr = unsafe { NonNull::new_unchecked(bottom.as_ptr().add(delta)) };
            let offset = codec.to_offset(addr);
            assert_eq!(offset.get() as usize, delta);
            assert_eq!(codec.from_offset(offset), addr);
        }
    }

    #[test]
    fn offset_order_matches_address_order() {
        let (_mem, bottom) = region_stub();
        let codec = OffsetCodec::new(bottom);
        // SAFETY: both displacements are inside the stub allocation.
        let (lo, hi) = unsafe {
            (
                NonNull::new_unchecked(bottom.as_ptr().add(8)),
                NonNull::new_unchecked(bottom.as_ptr().add(40)),
            )
        };
        assert!(codec.to_offset(lo) < codec.to_offset(hi));
    }

    #[test]
    fn bottom_encodes_as_zero() {
        let (_mem, bottom) = region_stub();
        let codec = OffsetCodec::new(bottom);
        assert_eq!(codec.to_offset(bottom).get(), 0);
        assert_eq!(codec.from_offset(OffsetInRegion::new(0)), bottom);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside the region")]
    fn rejects_address_past_region_end() {
        // Fabricated addresses; never dereferenced.
        let bottom = NonNull::new(0x10_0000 as *mut u8).unwrap();
        let codec = OffsetCodec::new(bottom);
        let past_end = NonNull::new((0x10_0000 + REGION_BYTES) as *mut u8).unwrap();
        let _ = codec.to_offset(past_end);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "below region bottom")]
    fn rejects_address_below_bottom() {
        let bottom = NonNull::new(0x10_0000 as *mut u8).unwrap();
        let codec = OffsetCodec::new(bottom);
        let below = NonNull::new(0x0f_fff8 as *mut u8).unwrap();
        let _ = codec.to_offset(below);
    }
}
