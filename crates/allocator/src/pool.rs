//! Fixed-block memory pool.
//!
//! A [`MemoryPool`] hands out blocks of a single size, chosen when the pool is
//! created. Free blocks are kept in a singly-linked list threaded through the
//! blocks themselves, so both allocation and deallocation are O(1) and the
//! pool needs no memory of its own besides the regions loaded into it.
//!
//! Pools never grow on their own: once every loaded block is in use,
//! [`MemoryPool::alloc`] returns `None` until a block is freed or another
//! region is loaded with [`MemoryPool::load_region`].
//!
//! # Usage Example
//!
//! ```rust
//! use core::alloc::Layout;
//!
//! use allocator::pool::MemoryPool;
//!
//! let mut pool = MemoryPool::new(Layout::new::<[u64; 4]>());
//! let mut region = vec![0u8; 1024];
//! let loaded = unsafe { pool.load_region(region.as_mut_ptr(), region.len()) };
//! assert_eq!(pool.capacity(), loaded);
//!
//! let block = pool.alloc().unwrap();
//! assert_eq!(pool.free_count(), loaded - 1);
//! unsafe {
//!     pool.free(block);
//! }
//! assert_eq!(pool.free_count(), loaded);
//! ```

use core::{alloc::Layout, ptr, ptr::NonNull};

/// Link stored in the first bytes of every free block.
struct FreeBlock {
    next: *mut FreeBlock,
}

/// A pool of equally sized memory blocks.
///
/// # Thread Safety
///
/// The pool is `Send` but not `Sync`. Concurrent use requires external
/// synchronization.
#[derive(Debug)]
pub struct MemoryPool {
    head: *mut FreeBlock,
    block_layout: Layout,
    capacity: usize,
    free: usize,
}

unsafe impl Send for MemoryPool {}

impl MemoryPool {
    /// Creates an empty pool for objects described by `object`.
    ///
    /// The block layout is `object` grown, if needed, so that a free block can
    /// hold the free-list link, and padded to its own alignment so that blocks
    /// can be laid out back to back.
    ///
    /// # Panics
    ///
    /// Panics if the resulting block layout overflows `isize`.
    #[must_use]
    pub fn new(object: Layout) -> Self {
        let block_layout = object
            .align_to(align_of::<FreeBlock>())
            .and_then(|l| Layout::from_size_align(l.size().max(size_of::<FreeBlock>()), l.align()))
            .map(|l| l.pad_to_align());
        let Ok(block_layout) = block_layout else {
            panic!("object layout {object:?} is too large for a memory pool");
        };
        Self {
            head: ptr::null_mut(),
            block_layout,
            capacity: 0,
            free: 0,
        }
    }

    /// Returns the layout of every block handed out by this pool.
    #[must_use]
    pub fn block_layout(&self) -> Layout {
        self.block_layout
    }

    /// Returns the number of blocks loaded into the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of blocks currently available.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free
    }

    /// Carves `start..start + len` into blocks and adds them to the pool.
    ///
    /// The start of the region is aligned up to the block alignment; any tail
    /// too short for a whole block is left unused. Returns the number of
    /// blocks added.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The region `start..start + len` is valid for reads and writes
    /// - The region is not used by anything else, including other pools
    /// - The region outlives the pool and every block allocated from it
    pub unsafe fn load_region(&mut self, start: *mut u8, len: usize) -> usize {
        let size = self.block_layout.size();
        let offset = start.align_offset(self.block_layout.align());
        let count = len.saturating_sub(offset) / size;
        if count == 0 {
            return 0;
        }

        unsafe {
            let base = start.add(offset);
            for i in (0..count).rev() {
                #[expect(clippy::cast_ptr_alignment)]
                let block = base.add(i * size).cast::<FreeBlock>();
                self.push(block);
            }
        }
        self.capacity += count;
        self.free += count;
        count
    }

    /// Takes one block from the pool.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        let block = NonNull::new(self.head)?;
        unsafe {
            self.head = (*block.as_ptr()).next;
        }
        self.free -= 1;
        Some(block.cast())
    }

    /// Returns a block to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `block` is misaligned for this pool, or if more blocks are
    /// returned than were ever loaded.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`alloc`](Self::alloc) on this pool
    /// and must not be used after this call.
    pub unsafe fn free(&mut self, block: NonNull<u8>) {
        assert!(
            block.as_ptr().addr().is_multiple_of(self.block_layout.align()),
            "misaligned block returned to memory pool"
        );
        assert!(self.free < self.capacity, "memory pool over-freed");
        unsafe {
            #[expect(clippy::cast_ptr_alignment)]
            self.push(block.as_ptr().cast::<FreeBlock>());
        }
        self.free += 1;
    }

    unsafe fn push(&mut self, block: *mut FreeBlock) {
        unsafe {
            block.write(FreeBlock { next: self.head });
        }
        self.head = block;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn with_test_region<F>(size: usize, test_fn: F)
    where
        F: FnOnce(*mut u8, usize),
    {
        unsafe {
            let layout = Layout::from_size_align(size, 64).unwrap();
            let start = std::alloc::alloc(layout);
            start.write_bytes(0x11, size);
            test_fn(start, size);
            std::alloc::dealloc(start, layout);
        }
    }

    #[test]
    fn test_block_layout_holds_link() {
        let pool = MemoryPool::new(Layout::new::<u8>());
        assert_eq!(pool.block_layout().size(), size_of::<FreeBlock>());
        assert_eq!(pool.block_layout().align(), align_of::<FreeBlock>());

        let pool = MemoryPool::new(Layout::from_size_align(24, 16).unwrap());
        assert_eq!(pool.block_layout().size(), 32);
        assert_eq!(pool.block_layout().align(), 16);
    }

    #[test]
    fn test_empty_pool() {
        let mut pool = MemoryPool::new(Layout::new::<u64>());
        assert_eq!(pool.capacity(), 0);
        assert!(pool.alloc().is_none());
    }

    #[test]
    fn test_load_and_exhaust() {
        with_test_region(256, |start, size| unsafe {
            let mut pool = MemoryPool::new(Layout::from_size_align(32, 8).unwrap());
            assert_eq!(pool.load_region(start, size), 8);

            let mut blocks = HashSet::new();
            while let Some(block) = pool.alloc() {
                assert!(blocks.insert(block));
            }
            assert_eq!(blocks.len(), 8);
            assert_eq!(pool.free_count(), 0);

            for block in blocks {
                pool.free(block);
            }
            assert_eq!(pool.free_count(), 8);
        });
    }

    #[test]
    fn test_blocks_do_not_overlap() {
        with_test_region(512, |start, size| unsafe {
            let mut pool = MemoryPool::new(Layout::new::<[u32; 5]>());
            pool.load_region(start, size);
            let block_size = pool.block_layout().size();

            let mut addrs = Vec::new();
            while let Some(block) = pool.alloc() {
                block.as_ptr().write_bytes(0xa5, block_size);
                addrs.push(block.as_ptr().addr());
            }
            addrs.sort_unstable();
            for pair in addrs.windows(2) {
                assert!(pair[1] - pair[0] >= block_size);
            }
        });
    }

    #[test]
    fn test_unaligned_region() {
        with_test_region(256, |start, size| unsafe {
            let mut pool = MemoryPool::new(Layout::from_size_align(16, 16).unwrap());
            let loaded = pool.load_region(start.add(1), size - 1);
            assert_eq!(loaded, 15);
            let block = pool.alloc().unwrap();
            assert_eq!(block.as_ptr().addr() % 16, 0);
            pool.free(block);
        });
    }

    #[test]
    fn test_region_too_small() {
        with_test_region(64, |start, _size| unsafe {
            let mut pool = MemoryPool::new(Layout::from_size_align(128, 8).unwrap());
            assert_eq!(pool.load_region(start, 64), 0);
            assert!(pool.alloc().is_none());
        });
    }

    #[test]
    fn test_lifo_reuse() {
        with_test_region(256, |start, size| unsafe {
            let mut pool = MemoryPool::new(Layout::new::<u64>());
            pool.load_region(start, size);
            let block = pool.alloc().unwrap();
            pool.free(block);
            assert_eq!(pool.alloc(), Some(block));
        });
    }

    #[test]
    #[should_panic(expected = "memory pool over-freed")]
    fn test_over_free() {
        with_test_region(64, |start, size| unsafe {
            let mut pool = MemoryPool::new(Layout::new::<u64>());
            pool.load_region(start, size);
            let block = pool.alloc().unwrap();
            pool.free(block);
            pool.free(block);
        });
    }
}
