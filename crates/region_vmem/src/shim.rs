//! Global-allocator backing for Miri, which does not model mmap trimming.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::io::{self, Error};

pub fn page_size() -> usize {
    4096
}

pub fn allocation_granularity() -> usize {
    page_size()
}

#[derive(Debug)]
pub struct ReservationInner {
    ptr: *mut u8,
    len: usize,
    align: usize,
}

impl ReservationInner {
    pub fn reserve(len: usize, align: usize, _populate: bool) -> io::Result<ReservationInner> {
        let align = align.max(page_size());
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| Error::from(io::ErrorKind::InvalidInput))?;
        // SAFETY: zero lengths were rejected before reaching the shim.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::from(io::ErrorKind::OutOfMemory));
        }
        Ok(ReservationInner { ptr, len, align })
    }

    pub const fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub const fn len(&self) -> usize {
        self.len
    }
}

impl Drop for ReservationInner {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated in `reserve` with this exact layout.
            unsafe {
                let layout = Layout::from_size_align(self.len, self.align).unwrap();
                dealloc(self.ptr, layout);
            }
        }
    }
}

unsafe impl Send for ReservationInner {}
unsafe impl Sync for ReservationInner {}
