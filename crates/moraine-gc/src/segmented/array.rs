//! Single-owner chains of segment buffers.

use std::ptr::NonNull;
use std::sync::Arc;

use super::buffer::SegmentBuffer;
use super::free_list::{BufferChain, SegmentBufferFreeList};

/// Growth parameters for a [`SegmentedArray`].
#[derive(Debug, Clone, Copy)]
pub struct AllocOptions {
    buffer_capacity: u32,
    max_buffers: usize,
}

impl AllocOptions {
    /// Configure arrays with `buffer_capacity` elements per buffer and at
    /// most `max_buffers` buffers.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_capacity` is zero.
    #[must_use]
    pub const fn new(buffer_capacity: u32, max_buffers: usize) -> Self {
        assert!(buffer_capacity > 0, "buffers must hold at least one element");
        Self {
            buffer_capacity,
            max_buffers,
        }
    }

    /// Elements per buffer.
    #[must_use]
    pub const fn buffer_capacity(&self) -> u32 {
        self.buffer_capacity
    }

    /// Upper bound on buffers per array.
    #[must_use]
    pub const fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

/// An append-only sequence of elements stored in a chain of segment
/// buffers.
///
/// The array has a single owner; only the shared free list behind it is
/// touched by other threads. New buffers are linked at the tail, so walking
/// the chain from the head visits elements in insertion order. Buffers come
/// from the free list when it has any and from the allocator otherwise, and
/// [`SegmentedArray::drop_all`] returns the entire chain to the free list in
/// one splice.
pub struct SegmentedArray<E: Copy> {
    first: Option<NonNull<SegmentBuffer<E>>>,
    last: Option<NonNull<SegmentBuffer<E>>>,
    num_buffers: usize,
    num_elems: usize,
    mem_size: usize,
    free_list: Arc<SegmentBufferFreeList<E>>,
    options: AllocOptions,
}

// SAFETY: the chain is exclusively owned by this array and the free list is
// itself thread-safe; moving the array moves `E` values with it.
unsafe impl<E: Copy + Send> Send for SegmentedArray<E> {}
// SAFETY: `&self` methods only read the chain; mutation requires `&mut
// self`. Sharing the array shares `&[E]` views, hence the `Sync` bound.
unsafe impl<E: Copy + Send + Sync> Sync for SegmentedArray<E> {}

impl<E: Copy> SegmentedArray<E> {
    /// Create an empty array that grows with `options` and recycles buffers
    /// through `free_list`.
    #[must_use]
    pub fn new(options: AllocOptions, free_list: Arc<SegmentBufferFreeList<E>>) -> Self {
        Self {
            first: None,
            last: None,
            num_buffers: 0,
            num_elems: 0,
            mem_size: 0,
            free_list,
            options,
        }
    }

    /// Append an element.
    ///
    /// # Panics
    ///
    /// Panics if growing would exceed the configured buffer limit. Aborts if
    /// the allocator fails.
    pub fn push(&mut self, elem: E) {
        if let Some(last) = self.last {
            // SAFETY: the chain is live and exclusively ours.
            if unsafe { SegmentBuffer::push(last, elem) } {
                self.num_elems += 1;
                return;
            }
        }
        let buf = self.grow();
        // SAFETY: `buf` was just linked and is empty, so push cannot fail.
        let pushed = unsafe { SegmentBuffer::push(buf, elem) };
        debug_assert!(pushed);
        self.num_elems += 1;
    }

    /// Link one more buffer at the tail, recycling from the free list when
    /// possible.
    fn grow(&mut self) -> NonNull<SegmentBuffer<E>> {
        assert!(
            self.num_buffers < self.options.max_buffers,
            "segmented array exceeded its {} buffer limit",
            self.options.max_buffers
        );
        let buf = match self.free_list.get() {
            Some(buf) => {
                // SAFETY: the free list handed over exclusive ownership; the
                // buffer still carries its previous fill count and link.
                unsafe { SegmentBuffer::reset(buf) };
                buf
            }
            None => SegmentBuffer::allocate(self.options.buffer_capacity),
        };
        match self.last {
            // SAFETY: the old tail is live and exclusively ours.
            Some(last) => unsafe { (*last.as_ptr()).set_next(Some(buf)) },
            None => self.first = Some(buf),
        }
        self.last = Some(buf);
        self.num_buffers += 1;
        // SAFETY: `buf` is live; recycled buffers may differ in capacity
        // from our own options, so account for what we actually hold.
        self.mem_size += SegmentBuffer::<E>::mem_size(unsafe { buf.as_ref() }.capacity());
        buf
    }

    /// Visit the filled portion of every buffer, in insertion order.
    pub fn for_each_slice(&self, mut f: impl FnMut(&[E])) {
        let mut cur = self.first;
        while let Some(buf) = cur {
            // SAFETY: the chain is live and we own it; the first `fill`
            // slots of each buffer are initialized.
            unsafe {
                let fill = buf.as_ref().fill() as usize;
                let slots = SegmentBuffer::slots(buf);
                f(std::slice::from_raw_parts(slots, fill));
                cur = buf.as_ref().next();
            }
        }
    }

    /// Return every buffer to the free list and reset the array to empty.
    pub fn drop_all(&mut self) {
        if let (Some(first), Some(last)) = (self.first, self.last) {
            // SAFETY: `last` is the tail of the chain starting at `first`
            // and the counters track exactly that chain.
            let chain = unsafe {
                BufferChain::from_raw_parts(first, last, self.num_buffers, self.mem_size)
            };
            self.free_list.bulk_add(chain);
        }
        self.first = None;
        self.last = None;
        self.num_buffers = 0;
        self.num_elems = 0;
        self.mem_size = 0;
    }

    /// Elements stored.
    #[must_use]
    pub const fn num_elems(&self) -> usize {
        self.num_elems
    }

    /// Buffers in the chain.
    #[must_use]
    pub const fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    /// Bytes held by the chain.
    #[must_use]
    pub const fn mem_size(&self) -> usize {
        self.mem_size
    }

    /// Whether nothing has been stored since the last [`Self::drop_all`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.num_elems == 0
    }
}

impl<E: Copy> Drop for SegmentedArray<E> {
    fn drop(&mut self) {
        self.drop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_array(capacity: u32, max: usize) -> SegmentedArray<u32> {
        SegmentedArray::new(
            AllocOptions::new(capacity, max),
            Arc::new(SegmentBufferFreeList::new()),
        )
    }

    fn collect(array: &SegmentedArray<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        array.for_each_slice(|slice| out.extend_from_slice(slice));
        out
    }

    #[test]
    fn push_keeps_insertion_order_across_buffers() {
        let mut array = small_array(4, 64);
        for v in 0..10 {
            array.push(v);
        }
        assert_eq!(array.num_elems(), 10);
        assert_eq!(array.num_buffers(), 3);
        assert_eq!(collect(&array), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn empty_array_visits_nothing() {
        let array = small_array(4, 64);
        assert!(array.is_empty());
        assert!(collect(&array).is_empty());
    }

    #[test]
    fn drop_all_moves_chain_to_free_list() {
        let free_list = Arc::new(SegmentBufferFreeList::new());
        let mut array = SegmentedArray::new(AllocOptions::new(4, 64), Arc::clone(&free_list));
        for v in 0..9 {
            array.push(v);
        }
        assert_eq!(array.num_buffers(), 3);

        array.drop_all();
        assert!(array.is_empty());
        assert_eq!(array.num_buffers(), 0);
        assert_eq!(array.mem_size(), 0);
        assert_eq!(free_list.num_buffers(), 3);
    }

    #[test]
    fn grow_prefers_recycled_buffers() {
        let free_list = Arc::new(SegmentBufferFreeList::new());
        let mut donor = SegmentedArray::new(AllocOptions::new(4, 64), Arc::clone(&free_list));
        for v in 0..8 {
            donor.push(v);
        }
        donor.drop_all();
        assert_eq!(free_list.num_buffers(), 2);

        let mut array = SegmentedArray::new(AllocOptions::new(4, 64), Arc::clone(&free_list));
        array.push(42);
        assert_eq!(free_list.num_buffers(), 1);
        assert_eq!(collect(&array), vec![42]);
    }

    #[test]
    fn drop_returns_buffers_implicitly() {
        let free_list = Arc::new(SegmentBufferFreeList::new());
        {
            let mut array = SegmentedArray::new(AllocOptions::new(2, 64), Arc::clone(&free_list));
            array.push(1);
            array.push(2);
            array.push(3);
        }
        assert_eq!(free_list.num_buffers(), 2);
    }

    #[test]
    #[should_panic(expected = "buffer limit")]
    fn exceeding_max_buffers_panics() {
        let mut array = small_array(2, 2);
        for v in 0..5 {
            array.push(v);
        }
    }

    #[test]
    fn reuse_after_drop_all_starts_clean() {
        let mut array = small_array(2, 8);
        array.push(7);
        array.drop_all();
        array.push(9);
        assert_eq!(collect(&array), vec![9]);
        assert_eq!(array.num_elems(), 1);
    }
}
