//! Dynamic buffers: named byte regions owned by the factory.
//!
//! A buffer takes a descriptor from the store's pool and its data region
//! from the store's heap. Both are allocated under the store lock when the
//! buffer is created and both are freed when its last reference goes; if
//! either allocation fails, nothing is kept.

use core::{marker::PhantomData, ptr::NonNull, slice};

use allocator::{heap::Heap, pool::MemoryPool};
use snafu::OptionExt as _;

use crate::{
    adapter::{BlockPool, ByteHeap},
    error::{FactoryError, Resource, factory_error},
    store::{Kind, Ref, Store},
};

/// Marker for the dynamic-buffers kind, parameterized by the heap the data
/// regions come from.
#[derive(Debug)]
pub struct Buffers<H = Heap>(PhantomData<fn() -> H>);

/// Data region of a buffer.
#[derive(Debug)]
pub struct BufferRegion {
    data: NonNull<u8>,
    size: usize,
}

// Contents are only reached through the unsafe accessors on the handle.
unsafe impl Send for BufferRegion {}
unsafe impl Sync for BufferRegion {}

impl<H: ByteHeap + 'static> Kind for Buffers<H> {
    type Payload = BufferRegion;
    type Backing = H;
    const LABEL: &'static str = "buffer";

    fn destroy(region: BufferRegion, heap: &mut H) {
        // Empty buffers never touched the heap.
        if region.size > 0 {
            unsafe {
                heap.free(region.data);
            }
        }
    }
}

/// Store of dynamic buffers.
pub type BufferFactory<P = MemoryPool, H = Heap> = Store<Buffers<H>, P>;

/// Handle to a dynamic buffer.
pub type DynBuffer<'s, P = MemoryPool, H = Heap> = Ref<'s, Buffers<H>, P>;

impl<P: BlockPool, H: ByteHeap + 'static> Store<Buffers<H>, P> {
    /// Creates an empty buffer store taking descriptors from `descriptors`
    /// and data regions from `heap`.
    #[must_use]
    pub fn new(descriptors: P, heap: H) -> Self {
        Self::with_backing(descriptors, heap)
    }

    /// Creates a buffer named `name` holding `size` bytes.
    ///
    /// The contents are left uninitialized. A zero-sized buffer is valid and
    /// takes no heap memory.
    #[track_caller]
    pub fn create(&self, name: &str, size: usize) -> Result<DynBuffer<'_, P, H>, FactoryError> {
        self.insert_with(name, |heap, name| {
            let data = if size == 0 {
                NonNull::dangling()
            } else {
                heap.alloc(size).context(factory_error::OutOfMemorySnafu {
                    kind: Buffers::<H>::LABEL,
                    name,
                    resource: Resource::Payload,
                })?
            };
            Ok(BufferRegion { data, size })
        })
    }
}

impl<P: BlockPool, H: ByteHeap + 'static> Ref<'_, Buffers<H>, P> {
    /// Size requested at creation, in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.payload().size
    }

    /// Start of the data region.
    #[must_use]
    pub fn data(&self) -> NonNull<u8> {
        self.payload().data
    }

    /// Views the contents.
    ///
    /// # Safety
    ///
    /// The contents must be initialized, and no other holder of the buffer
    /// may write to it while the returned slice is alive.
    #[must_use]
    pub unsafe fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data().as_ptr(), self.size()) }
    }

    /// Views the contents mutably.
    ///
    /// # Safety
    ///
    /// No other holder of the buffer may access it while the returned slice
    /// is alive.
    #[must_use]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data().as_ptr(), self.size()) }
    }
}
