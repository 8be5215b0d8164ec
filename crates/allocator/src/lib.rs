//! Memory allocators backing kernel object storage.
//!
//! Both allocators are `no_std`, manage caller-supplied memory regions and
//! never allocate on their own.
//!
//! # Available Allocators
//!
//! ## [`MemoryPool`](pool::MemoryPool)
//!
//! A pool of equally sized blocks, used for fixed-size object descriptors.
//!
//! - O(1) allocation and deallocation
//! - No per-block overhead
//! - Exhausts deterministically once every loaded block is taken
//!
//! ## [`Heap`](heap::Heap)
//!
//! A first-fit heap for variable-size requests, used for payloads whose size
//! is only known at run time.
//!
//! - O(n) allocation and deallocation, n being the number of free blocks
//! - 16 bytes of header per allocated block
//! - Frees by pointer alone, the block header remembers the size
//! - Adjacent free blocks are coalesced
//!
//! # Usage Example
//!
//! ```rust
//! use core::alloc::Layout;
//!
//! use allocator::{heap::Heap, pool::MemoryPool};
//!
//! let mut pool_region = vec![0u8; 1024];
//! let mut heap_region = vec![0u8; 4096];
//!
//! let mut pool = MemoryPool::new(Layout::new::<[usize; 4]>());
//! let mut heap = Heap::new();
//! unsafe {
//!     pool.load_region(pool_region.as_mut_ptr(), pool_region.len());
//!     heap.add_region(heap_region.as_mut_ptr(), heap_region.len());
//! }
//!
//! let descriptor = pool.alloc().unwrap();
//! let payload = heap.alloc(100).unwrap();
//! unsafe {
//!     heap.free(payload);
//!     pool.free(descriptor);
//! }
//! ```
//!
//! # Thread Safety
//!
//! The allocators are `Send` but not `Sync`. Callers serialize access, e.g.
//! by keeping them behind the same lock as the data they back.

#![cfg_attr(not(test), no_std)]

pub mod heap;
pub mod pool;
