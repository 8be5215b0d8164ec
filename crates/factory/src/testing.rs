use core::alloc::Layout;

use allocator::{heap::Heap, pool::MemoryPool};

fn leak_region(size: usize, align: usize) -> *mut u8 {
    let layout = Layout::from_size_align(size, align).unwrap();
    let start = unsafe { std::alloc::alloc(layout) };
    assert!(!start.is_null());
    start
}

/// Pool with room for exactly `capacity` objects of layout `object`.
pub(crate) fn pool(object: Layout, capacity: usize) -> MemoryPool {
    let mut pool = MemoryPool::new(object);
    let block = pool.block_layout();
    let size = (block.size() * capacity).max(1);
    let start = leak_region(size, block.align());
    let loaded = unsafe { pool.load_region(start, size) };
    assert_eq!(loaded, capacity);
    pool
}

/// Heap backed by a fresh region of `size` bytes.
pub(crate) fn heap(size: usize) -> Heap {
    let start = leak_region(size, allocator::heap::UNIT);
    let mut heap = Heap::new();
    unsafe {
        heap.add_region(start, size);
    }
    heap
}

/// A `'static` region for [`Factory::from_regions`](crate::Factory::from_regions).
pub(crate) fn region(size: usize) -> &'static mut [u8] {
    Box::leak(vec![0; size].into_boxed_slice())
}
