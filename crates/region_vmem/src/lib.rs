use std::io;

#[cfg(all(unix, not(miri)))]
mod unix;
#[cfg(all(unix, not(miri)))]
use unix as os;

#[cfg(all(windows, not(miri)))]
mod windows;
#[cfg(all(windows, not(miri)))]
use windows as os;

#[cfg(miri)]
mod shim;
#[cfg(miri)]
use shim as os;

pub use os::page_size;

/// Returns the system allocation granularity.
///
/// On Windows, this is typically 64KB. On Unix, this is typically the system
/// page size. Reservations are always aligned to at least this granularity.
pub fn allocation_granularity() -> usize {
    #[cfg(all(windows, not(miri)))]
    {
        os::allocation_granularity()
    }
    #[cfg(all(unix, not(miri)))]
    {
        os::page_size()
    }
    #[cfg(miri)]
    {
        os::allocation_granularity()
    }
}

/// A reserved span of virtual memory, readable and writable.
///
/// The span is unmapped when this handle is dropped.
#[derive(Debug)]
pub struct Reservation {
    inner: os::ReservationInner,
}

impl Reservation {
    /// Returns a pointer to the start of the reservation.
    ///
    /// The pointer honors the alignment the reservation was created with and
    /// stays valid for the lifetime of the handle.
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Returns the usable length of the reservation in bytes.
    ///
    /// At least the length requested; the OS rounds it up to page
    /// granularity.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

// SAFETY: the reservation owns its mapping outright; handing the handle (or
// the pointer) to another thread does not change who unmaps it.
unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

/// Configuration for creating a reservation.
#[derive(Debug, Clone)]
pub struct ReserveOptions {
    len: usize,
    align: usize,
    populate: bool,
}

impl ReserveOptions {
    /// Creates a new `ReserveOptions` with default settings (length 0).
    /// You must set a length before reserving.
    pub fn new() -> Self {
        Self {
            len: 0,
            align: 1,
            populate: false,
        }
    }

    /// Sets the length of the reservation in bytes.
    pub fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Sets the alignment of the reservation's start address in bytes.
    ///
    /// Must be a power of two. Alignments up to the system page size are
    /// free; larger ones are honored exactly, not as a hint. Heap regions
    /// want their own size here so offset math can mask an address down to
    /// its region bottom.
    pub fn align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Sets whether to pre-populate (prefault) the page tables.
    ///
    /// On Linux, this adds `MAP_POPULATE`.
    pub fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Reserves an anonymous read-write span per this configuration.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if the length is zero or the alignment is
    /// not a power of two, and with the OS error if the mapping itself
    /// cannot be created.
    pub fn reserve(&self) -> io::Result<Reservation> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }
        if !self.align.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "alignment must be a power of two",
            ));
        }

        let inner = os::ReservationInner::reserve(self.len, self.align, self.populate)?;
        Ok(Reservation { inner })
    }
}

impl Default for ReserveOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_page_size() {
        let ps = page_size();
        assert!(ps > 0);
        assert_eq!(ps & (ps - 1), 0, "Page size should be power of 2");
    }

    #[test]
    fn test_allocation_granularity() {
        let ag = allocation_granularity();
        assert!(ag > 0);
        assert_eq!(ag & (ag - 1), 0, "Allocation granularity should be power of 2");
        assert!(ag >= page_size());
    }

    #[test]
    fn test_basic_reserve() {
        let len = page_size();
        let reservation = ReserveOptions::new()
            .len(len)
            .reserve()
            .expect("failed to reserve");

        let ptr = reservation.ptr();
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % page_size(), 0);
        assert_eq!(reservation.len(), len);

        // Verification: Write to memory
        unsafe {
            ptr::write_volatile(ptr, 42);
            assert_eq!(ptr::read_volatile(ptr), 42);
        }
    }

    #[test]
    fn test_aligned_reserve() {
        // A region-sized alignment, well past anything mmap grants by itself.
        let align = 1usize << 22;
        let reservation = ReserveOptions::new()
            .len(align)
            .align(align)
            .reserve()
            .expect("failed to reserve aligned span");

        let ptr = reservation.ptr();
        assert_eq!(ptr as usize % align, 0, "alignment is a guarantee, not a hint");

        // Both ends of the span must be usable memory.
        unsafe {
            ptr::write_volatile(ptr, 7);
            ptr::write_volatile(ptr.add(align - 1), 9);
            assert_eq!(ptr::read_volatile(ptr), 7);
            assert_eq!(ptr::read_volatile(ptr.add(align - 1)), 9);
        }
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let err = ReserveOptions::new().reserve().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_bad_alignment_is_rejected() {
        let err = ReserveOptions::new()
            .len(page_size())
            .align(3)
            .reserve()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reservations_do_not_overlap() {
        let len = page_size();
        let a = ReserveOptions::new().len(len).reserve().unwrap();
        let b = ReserveOptions::new().len(len).reserve().unwrap();

        let (a_lo, b_lo) = (a.ptr() as usize, b.ptr() as usize);
        assert!(a_lo + len <= b_lo || b_lo + len <= a_lo);
    }
}
