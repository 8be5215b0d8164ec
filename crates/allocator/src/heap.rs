//! Variable-size heap with block headers.
//!
//! [`Heap`] serves requests of arbitrary size from one or more memory regions.
//! Unlike a `GlobalAlloc`-style allocator, the caller does not have to
//! remember the size of an allocation to free it: every block starts with a
//! header recording its size, so [`Heap::free`] takes only the pointer.
//!
//! # Algorithm
//!
//! - **Free list**: free blocks are linked in address order
//! - **Allocation**: first fit; the chosen block is split when the remainder
//!   can hold a header plus at least one allocation unit
//! - **Deallocation**: the block is inserted back in address order and merged
//!   with its neighbours when they are adjacent
//!
//! ```text
//! Block Layout:
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ Header (16 bytes)            │ Payload (size bytes)         │
//! │ ┌────────────┬─────────────┐ │                              │
//! │ │ size       │ next/marker │ │                              │
//! │ └────────────┴─────────────┘ │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! While a block is allocated, the `next` field holds a marker value instead
//! of a link. Freeing a pointer whose header lacks the marker is treated as a
//! fatal error.

use core::{ptr, ptr::NonNull};

/// Allocation granularity and alignment of payloads, in bytes.
pub const UNIT: usize = size_of::<Header>();

const USED_MARKER: usize = 0x5afe_b10c;

#[repr(C, align(16))]
#[derive(Debug)]
struct Header {
    /// Payload size in bytes, a multiple of [`UNIT`].
    size: usize,
    /// Next free block, or [`USED_MARKER`] while allocated.
    next: *mut Header,
}
const _: () = assert!(size_of::<Header>() == align_of::<Header>());

impl Header {
    unsafe fn payload(block: *mut Self) -> *mut u8 {
        unsafe { block.add(1).cast() }
    }

    unsafe fn end(block: *mut Self) -> *mut u8 {
        unsafe { Self::payload(block).add((*block).size) }
    }

    unsafe fn is_used(block: *mut Self) -> bool {
        unsafe { (*block).next.addr() == USED_MARKER }
    }
}

/// Snapshot of the free space in a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStatus {
    /// Sum of the payload sizes of all free blocks.
    pub total_free: usize,
    /// Number of free blocks.
    pub fragments: usize,
    /// Payload size of the largest free block.
    pub largest: usize,
}

/// A first-fit heap for variable-size allocations.
///
/// # Thread Safety
///
/// The heap is `Send` but not `Sync`. Concurrent use requires external
/// synchronization.
#[derive(Debug)]
pub struct Heap {
    free_list_head: *mut Header,
}

unsafe impl Send for Heap {}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates a heap with no memory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            free_list_head: ptr::null_mut(),
        }
    }

    /// Adds the region `start..start + len` to the heap.
    ///
    /// The region is trimmed to [`UNIT`] boundaries. Regions too small to hold
    /// a header and one unit of payload are ignored.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region is valid for reads and writes
    /// - The region is not used by anything else, including other heaps
    /// - The region outlives the heap and every block allocated from it
    pub unsafe fn add_region(&mut self, start: *mut u8, len: usize) {
        let offset = start.align_offset(UNIT);
        let len = len.saturating_sub(offset) / UNIT * UNIT;
        if len < 2 * UNIT {
            return;
        }

        unsafe {
            #[expect(clippy::cast_ptr_alignment)]
            let block = start.add(offset).cast::<Header>();
            block.write(Header {
                size: len - UNIT,
                next: ptr::null_mut(),
            });
            self.insert_free(block);
        }
    }

    /// Allocates at least `size` bytes.
    ///
    /// The returned pointer is aligned to [`UNIT`]. Returns `None` if `size`
    /// is zero or no free block is large enough.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = size.checked_next_multiple_of(UNIT)?;

        unsafe {
            let mut prev = ptr::null_mut::<Header>();
            let mut current = self.free_list_head;
            while !current.is_null() {
                if (*current).size >= size {
                    let next = if (*current).size - size >= 2 * UNIT {
                        // Keep the tail as a smaller free block.
                        #[expect(clippy::cast_ptr_alignment)]
                        let rest = Header::payload(current).add(size).cast::<Header>();
                        rest.write(Header {
                            size: (*current).size - size - UNIT,
                            next: (*current).next,
                        });
                        (*current).size = size;
                        rest
                    } else {
                        (*current).next
                    };
                    if prev.is_null() {
                        self.free_list_head = next;
                    } else {
                        (*prev).next = next;
                    }
                    (*current).next = ptr::without_provenance_mut(USED_MARKER);
                    return NonNull::new(Header::payload(current));
                }
                prev = current;
                current = (*current).next;
            }
        }
        None
    }

    /// Returns the payload size of an allocated block.
    ///
    /// This is the requested size rounded up to [`UNIT`], possibly more if the
    /// block could not be split.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this heap
    /// and not freed since.
    #[must_use]
    pub unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe {
            let block = Self::header_of(ptr);
            (*block).size
        }
    }

    /// Frees a block allocated from this heap.
    ///
    /// # Panics
    ///
    /// Panics if the block header does not carry the allocation marker, which
    /// happens on double frees and on pointers that did not come from
    /// [`alloc`](Self::alloc).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this heap.
    /// The payload must not be accessed after this call.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        unsafe {
            let block = Self::header_of(ptr);
            self.insert_free(block);
        }
    }

    /// Walks the free list and reports the free space.
    #[must_use]
    pub fn status(&self) -> HeapStatus {
        let mut status = HeapStatus::default();
        let mut current = self.free_list_head;
        while !current.is_null() {
            unsafe {
                status.total_free += (*current).size;
                status.largest = status.largest.max((*current).size);
                current = (*current).next;
            }
            status.fragments += 1;
        }
        status
    }

    unsafe fn header_of(ptr: NonNull<u8>) -> *mut Header {
        unsafe {
            #[expect(clippy::cast_ptr_alignment)]
            let block = ptr.as_ptr().cast::<Header>().sub(1);
            assert!(
                Header::is_used(block),
                "freeing a block that is not allocated from this heap"
            );
            block
        }
    }

    unsafe fn insert_free(&mut self, block: *mut Header) {
        unsafe {
            let mut prev = ptr::null_mut::<Header>();
            let mut next = self.free_list_head;
            while !next.is_null() && next < block {
                prev = next;
                next = (*next).next;
            }

            (*block).next = next;
            if !next.is_null() && ptr::eq(Header::end(block), next.cast()) {
                (*block).size += UNIT + (*next).size;
                (*block).next = (*next).next;
            }

            if prev.is_null() {
                self.free_list_head = block;
            } else if ptr::eq(Header::end(prev), block.cast()) {
                (*prev).size += UNIT + (*block).size;
                (*prev).next = (*block).next;
            } else {
                (*prev).next = block;
            }
        }
    }
}
