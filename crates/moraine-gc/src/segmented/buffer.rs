//! Fixed-capacity element buffers with an intrusive chain link.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Header of one segment buffer.
///
/// The element slots live immediately after the header, in the same
/// allocation: [`SegmentBuffer::allocate`] reserves room for `capacity`
/// elements of `E` behind the header and [`SegmentBuffer::deallocate`]
/// releases both together. A buffer is never resized; when it fills up the
/// owning chain links a fresh one behind it through `next`.
///
/// All slot access goes through the raw buffer pointer rather than `&self`,
/// because a reference to the header only spans the header bytes.
#[repr(C)]
pub struct SegmentBuffer<E> {
    /// Next buffer in the owning chain (or on the free list).
    next: Option<NonNull<SegmentBuffer<E>>>,
    /// Number of slots filled so far.
    fill: u32,
    /// Total element slots in this buffer.
    capacity: u32,
    _marker: PhantomData<E>,
}

impl<E: Copy> SegmentBuffer<E> {
    /// Layout of the whole allocation plus the byte offset of the first slot.
    fn layout(capacity: u32) -> (Layout, usize) {
        let header = Layout::new::<Self>();
        let slots = Layout::array::<E>(capacity as usize).expect("buffer capacity overflows layout");
        let (layout, offset) = header.extend(slots).expect("buffer layout overflows");
        (layout.pad_to_align(), offset)
    }

    /// Bytes occupied by one buffer of the given capacity.
    #[must_use]
    pub fn mem_size(capacity: u32) -> usize {
        Self::layout(capacity).0.size()
    }

    /// Allocate an empty buffer with room for `capacity` elements.
    ///
    /// Aborts via [`handle_alloc_error`] if the allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub(crate) fn allocate(capacity: u32) -> NonNull<Self> {
        assert!(capacity > 0, "segment buffers cannot be empty");
        let (layout, _) = Self::layout(capacity);

        // SAFETY: the layout has non-zero size (capacity checked above).
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        #[allow(clippy::cast_ptr_alignment)]
        let header = ptr.cast::<Self>();
        // SAFETY: freshly allocated and correctly aligned for the header.
        unsafe {
            header.write(Self {
                next: None,
                fill: 0,
                capacity,
                _marker: PhantomData,
            });
        }

        // SAFETY: null checked above.
        unsafe { NonNull::new_unchecked(header) }
    }

    /// Release a buffer's memory.
    ///
    /// # Safety
    ///
    /// `buf` must come from [`SegmentBuffer::allocate`] and must not be used
    /// afterwards.
    pub(crate) unsafe fn deallocate(buf: NonNull<Self>) {
        // SAFETY: caller guarantees `buf` is live.
        let capacity = unsafe { buf.as_ref() }.capacity;
        let (layout, _) = Self::layout(capacity);
        // SAFETY: allocated with the identical layout in `allocate`.
        unsafe { dealloc(buf.as_ptr().cast::<u8>(), layout) };
    }

    /// Append an element, returning `false` when the buffer is full.
    ///
    /// # Safety
    ///
    /// `buf` must point to a live buffer exclusively owned by the caller.
    pub(crate) unsafe fn push(buf: NonNull<Self>, elem: E) -> bool {
        // SAFETY: per contract, the buffer is live and ours alone.
        let fill = unsafe { buf.as_ref() }.fill;
        if fill == unsafe { buf.as_ref() }.capacity {
            return false;
        }
        // SAFETY: fill < capacity, so the slot lies inside this allocation.
        unsafe {
            Self::slots(buf).add(fill as usize).write(elem);
            (*buf.as_ptr()).fill = fill + 1;
        }
        true
    }

    /// Clear the fill count and chain link so the buffer can be reused.
    ///
    /// # Safety
    ///
    /// `buf` must point to a live buffer exclusively owned by the caller.
    pub(crate) unsafe fn reset(buf: NonNull<Self>) {
        // SAFETY: per contract.
        unsafe {
            (*buf.as_ptr()).fill = 0;
            (*buf.as_ptr()).next = None;
        }
    }

    /// Pointer to the first element slot.
    ///
    /// # Safety
    ///
    /// `buf` must point to a live buffer.
    pub(crate) unsafe fn slots(buf: NonNull<Self>) -> *mut E {
        // SAFETY: per contract, the header is readable.
        let (_, offset) = Self::layout(unsafe { buf.as_ref() }.capacity);
        // SAFETY: the slot area starts `offset` bytes into the allocation.
        unsafe { buf.as_ptr().cast::<u8>().add(offset).cast::<E>() }
    }

    /// Number of elements currently stored.
    #[must_use]
    pub const fn fill(&self) -> u32 {
        self.fill
    }

    /// Total element slots.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether every slot is filled.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.fill == self.capacity
    }

    /// Next buffer in the chain, if any.
    #[must_use]
    pub const fn next(&self) -> Option<NonNull<Self>> {
        self.next
    }

    pub(crate) const fn set_next(&mut self, next: Option<NonNull<Self>>) {
        self.next = next;
    }
}
