use std::io::{self, Error};
use std::mem;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

/// Returns the system allocation granularity.
///
/// `VirtualAlloc` places reservations at multiples of this value (typically
/// 64KB), which is often larger than the page size (typically 4KB).
pub fn allocation_granularity() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        let gran = info.dwAllocationGranularity as usize;
        if gran == 0 {
            65536
        } else {
            gran
        }
    }
}

pub fn page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        let size = info.dwPageSize as usize;
        if size == 0 {
            4096
        } else {
            size
        }
    }
}

const fn align_up(x: usize, align: usize) -> usize {
    (x + align - 1) & !(align - 1)
}

#[derive(Debug)]
pub struct ReservationInner {
    ptr: *mut std::ffi::c_void,
    len: usize,
}

impl ReservationInner {
    /// Reserves `len` bytes of committed read-write memory starting at a
    /// multiple of `align`.
    ///
    /// `align` must be a power of two; the caller has validated it. Windows
    /// has no populate flag; commit already charges the pages.
    pub fn reserve(len: usize, align: usize, _populate: bool) -> io::Result<ReservationInner> {
        let len = align_up(len, page_size());
        let align = align.max(allocation_granularity());

        if align == allocation_granularity() {
            // VirtualAlloc grants granularity alignment by itself.
            let ptr =
                unsafe { VirtualAlloc(ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
            if ptr.is_null() {
                return Err(Error::last_os_error());
            }
            return Ok(ReservationInner { ptr, len });
        }

        let padded = len
            .checked_add(align)
            .ok_or_else(|| Error::new(io::ErrorKind::InvalidInput, "reservation size overflows"))?;

        // Windows cannot trim a reservation, so probe for a span with enough
        // slack, release it, and re-reserve at the aligned address inside it.
        // Another thread can steal that address between the two calls, hence
        // the bounded retry loop.
        for _ in 0..16 {
            let probe = unsafe { VirtualAlloc(ptr::null(), padded, MEM_RESERVE, PAGE_READWRITE) };
            if probe.is_null() {
                return Err(Error::last_os_error());
            }
            let aligned = align_up(probe as usize, align);
            unsafe {
                VirtualFree(probe, 0, MEM_RELEASE);
            }

            let ptr = unsafe {
                VirtualAlloc(
                    aligned as *const std::ffi::c_void,
                    len,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };
            if !ptr.is_null() {
                debug_assert_eq!(ptr as usize, aligned);
                return Ok(ReservationInner { ptr, len });
            }
        }

        Err(Error::new(
            io::ErrorKind::OutOfMemory,
            "no aligned span after repeated placement attempts",
        ))
    }

    pub const fn ptr(&self) -> *mut u8 {
        self.ptr.cast::<u8>()
    }

    pub const fn len(&self) -> usize {
        self.len
    }
}

impl Drop for ReservationInner {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                // MEM_RELEASE requires dwSize to be 0
                VirtualFree(self.ptr, 0, MEM_RELEASE);
            }
        }
    }
}

unsafe impl Send for ReservationInner {}
unsafe impl Sync for ReservationInner {}
