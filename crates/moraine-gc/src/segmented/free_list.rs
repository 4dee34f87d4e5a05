//! Shared pool of idle segment buffers.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::buffer::SegmentBuffer;

/// A detached run of buffers, handed over to the free list in one piece.
///
/// The chain is a transfer token: it carries exclusive ownership of every
/// buffer between `first` and `last`. Dropping a chain without passing it to
/// [`SegmentBufferFreeList::bulk_add`] leaks the buffers.
pub struct BufferChain<E: Copy> {
    first: NonNull<SegmentBuffer<E>>,
    last: NonNull<SegmentBuffer<E>>,
    num_buffers: usize,
    mem_size: usize,
}

impl<E: Copy> BufferChain<E> {
    /// Assemble a chain from its raw parts.
    ///
    /// # Safety
    ///
    /// `last` must be reachable from `first` through the buffers' `next`
    /// links, the caller must own every buffer on that path exclusively, and
    /// `num_buffers`/`mem_size` must match the chain.
    pub(crate) unsafe fn from_raw_parts(
        first: NonNull<SegmentBuffer<E>>,
        last: NonNull<SegmentBuffer<E>>,
        num_buffers: usize,
        mem_size: usize,
    ) -> Self {
        Self {
            first,
            last,
            num_buffers,
            mem_size,
        }
    }

    /// Buffers in this chain.
    #[must_use]
    pub const fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    /// Bytes held by this chain's buffers.
    #[must_use]
    pub const fn mem_size(&self) -> usize {
        self.mem_size
    }
}

// SAFETY: the chain owns its buffers exclusively; `E` values move with it.
unsafe impl<E: Copy + Send> Send for BufferChain<E> {}

/// A thread-safe free list of idle segment buffers.
///
/// Record sets for many regions share one free list so that buffers released
/// by one region's cleanup are reused by the next region that grows. The
/// intrusive list head is guarded by a mutex; [`SegmentBufferFreeList::get`]
/// pops a single buffer and [`SegmentBufferFreeList::bulk_add`] splices an
/// entire chain in one critical section, so an array's whole chain changes
/// owner atomically with respect to concurrent callers.
///
/// `num_buffers`/`mem_size` are updated while the lock is held, so they
/// never drift from what the list actually holds.
pub struct SegmentBufferFreeList<E: Copy> {
    head: Mutex<Option<NonNull<SegmentBuffer<E>>>>,
    num_buffers: AtomicUsize,
    mem_size: AtomicUsize,
}

// SAFETY: buffers on the list are exclusively owned by it and only ever
// handed out one owner at a time; `E` values cross threads by value.
unsafe impl<E: Copy + Send> Send for SegmentBufferFreeList<E> {}
// SAFETY: the intrusive head is mutex-guarded and the counters are atomic.
unsafe impl<E: Copy + Send> Sync for SegmentBufferFreeList<E> {}

impl<E: Copy> SegmentBufferFreeList<E> {
    /// Create an empty free list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: Mutex::new(None),
            num_buffers: AtomicUsize::new(0),
            mem_size: AtomicUsize::new(0),
        }
    }

    /// Pop one idle buffer, or `None` when the list is empty.
    ///
    /// The returned buffer still carries its old fill count and chain link;
    /// the new owner is expected to reset it before use.
    pub fn get(&self) -> Option<NonNull<SegmentBuffer<E>>> {
        let mut head = self.head.lock();
        let buf = (*head)?;
        // SAFETY: buffers on the list are owned by it, so reading the
        // popped buffer's link is race-free while we hold the lock.
        *head = unsafe { buf.as_ref() }.next();
        self.num_buffers.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: `buf` is live; ownership passes to the caller on return.
        let size = SegmentBuffer::<E>::mem_size(unsafe { buf.as_ref() }.capacity());
        self.mem_size.fetch_sub(size, Ordering::Relaxed);
        Some(buf)
    }

    /// Splice an entire chain onto the list.
    pub fn bulk_add(&self, chain: BufferChain<E>) {
        let mut head = self.head.lock();
        // SAFETY: the chain owns its buffers; linking its tail to the
        // current head keeps every buffer reachable from the new head.
        unsafe { (*chain.last.as_ptr()).set_next(*head) };
        *head = Some(chain.first);
        self.num_buffers.fetch_add(chain.num_buffers, Ordering::Relaxed);
        self.mem_size.fetch_add(chain.mem_size, Ordering::Relaxed);
    }

    /// Deallocate every pooled buffer, returning how many were freed.
    pub fn free_all(&self) -> usize {
        let mut head = self.head.lock();
        let mut cur = head.take();
        let mut freed = 0usize;
        let mut freed_mem = 0usize;
        while let Some(buf) = cur {
            // SAFETY: the list owned these buffers and the lock is held, so
            // nobody else can reach them.
            unsafe {
                cur = buf.as_ref().next();
                freed_mem += SegmentBuffer::<E>::mem_size(buf.as_ref().capacity());
                SegmentBuffer::deallocate(buf);
            }
            freed += 1;
        }
        self.num_buffers.fetch_sub(freed, Ordering::Relaxed);
        self.mem_size.fetch_sub(freed_mem, Ordering::Relaxed);
        freed
    }

    /// Buffers currently pooled.
    #[must_use]
    pub fn num_buffers(&self) -> usize {
        self.num_buffers.load(Ordering::Relaxed)
    }

    /// Bytes currently pooled.
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.mem_size.load(Ordering::Relaxed)
    }
}

impl<E: Copy> Default for SegmentBufferFreeList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Copy> Drop for SegmentBufferFreeList<E> {
    fn drop(&mut self) {
        self.free_all();
    }
}
