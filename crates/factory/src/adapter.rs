//! Allocation strategies used by the element stores.
//!
//! Stores only talk to these traits, so the same store logic runs on top of
//! a fixed-block pool for descriptors and a variable-size heap for payloads,
//! or on any other allocator providing the same contract.

use core::{alloc::Layout, ptr::NonNull};

use allocator::{heap::Heap, pool::MemoryPool};

/// Source of fixed-size blocks.
pub trait BlockPool: Send {
    /// Layout of every block returned by [`alloc`](Self::alloc).
    fn block_layout(&self) -> Layout;

    /// Takes a block, or returns `None` if the pool is exhausted.
    fn alloc(&mut self) -> Option<NonNull<u8>>;

    /// Gives a block back.
    ///
    /// # Safety
    ///
    /// `block` must come from [`alloc`](Self::alloc) on the same pool and must
    /// not be used afterwards.
    unsafe fn free(&mut self, block: NonNull<u8>);
}

/// Source of variable-size byte regions.
pub trait ByteHeap: Send {
    /// Allocates at least `size` bytes, or returns `None` if the heap cannot
    /// satisfy the request.
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Gives a region back.
    ///
    /// # Safety
    ///
    /// `region` must come from [`alloc`](Self::alloc) on the same heap and
    /// must not be used afterwards.
    unsafe fn free(&mut self, region: NonNull<u8>);
}

impl BlockPool for MemoryPool {
    fn block_layout(&self) -> Layout {
        Self::block_layout(self)
    }

    fn alloc(&mut self) -> Option<NonNull<u8>> {
        Self::alloc(self)
    }

    unsafe fn free(&mut self, block: NonNull<u8>) {
        unsafe { Self::free(self, block) }
    }
}

impl ByteHeap for Heap {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        Self::alloc(self, size)
    }

    unsafe fn free(&mut self, region: NonNull<u8>) {
        unsafe { Self::free(self, region) }
    }
}
