use std::io::{self, Error};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(any(target_os = "linux", target_os = "android"))]
const MAP_POPULATE: libc::c_int = libc::MAP_POPULATE;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const MAP_POPULATE: libc::c_int = 0;

/// Returns the system page size, cached atomically.
pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
            PAGE_SIZE.store(page_size, Ordering::Relaxed);
            page_size
        }
        page_size => page_size,
    }
}

const fn align_up(x: usize, align: usize) -> usize {
    (x + align - 1) & !(align - 1)
}

#[derive(Debug)]
pub struct ReservationInner {
    ptr: *mut libc::c_void,
    len: usize,
}

impl ReservationInner {
    /// Reserves `len` bytes of anonymous read-write memory starting at a
    /// multiple of `align`.
    ///
    /// `align` must be a power of two; the caller has validated it. Length
    /// and alignment are first rounded up to page granularity so every trim
    /// cut below lands on a page boundary.
    pub fn reserve(len: usize, align: usize, populate: bool) -> io::Result<ReservationInner> {
        let page = page_size();
        let len = align_up(len, page);
        let align = align.max(page);
        let populate = if populate { MAP_POPULATE } else { 0 };

        let flags = libc::MAP_PRIVATE | libc::MAP_ANON | populate;
        let prot = libc::PROT_READ | libc::PROT_WRITE;

        if align == page {
            // mmap results are page aligned already, nothing to carve.
            let ptr = unsafe { libc::mmap(ptr::null_mut(), len, prot, flags, -1, 0) };
            if ptr == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }
            return Ok(ReservationInner { ptr, len });
        }

        // Over-reserve by one alignment unit, then hand the misaligned head
        // and the leftover tail back to the OS.
        let padded = len
            .checked_add(align)
            .ok_or_else(|| Error::new(io::ErrorKind::InvalidInput, "reservation size overflows"))?;

        let base = unsafe { libc::mmap(ptr::null_mut(), padded, prot, flags, -1, 0) };
        if base == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        let head = align_up(base as usize, align) - base as usize;
        // head < align, so the tail is never empty.
        let tail = align - head;
        let ptr = unsafe {
            if head > 0 {
                libc::munmap(base, head);
            }
            let aligned = base.cast::<u8>().add(head);
            libc::munmap(aligned.add(len).cast(), tail);
            aligned.cast::<libc::c_void>()
        };

        Ok(ReservationInner { ptr, len })
    }

    pub fn ptr(&self) -> *mut u8 {
        self.ptr as *mut u8
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for ReservationInner {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}

unsafe impl Send for ReservationInner {}
unsafe impl Sync for ReservationInner {}
