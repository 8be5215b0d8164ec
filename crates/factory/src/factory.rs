//! The objects factory: one store per element kind, brought up together.

#[cfg(feature = "objects-registry")]
use core::ptr::NonNull;
#[cfg(any(
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
use core::{alloc::Layout, mem};

#[cfg(feature = "generic-buffers")]
use allocator::heap::Heap;
#[cfg(any(
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
use allocator::pool::MemoryPool;
use log::debug;
#[cfg(any(
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
use snafu::ensure;

#[cfg(feature = "generic-buffers")]
use crate::buffer::{BufferFactory, DynBuffer};
#[cfg(feature = "objects-registry")]
use crate::object::{ObjectsRegistry, RegisteredObject};
#[cfg(feature = "semaphores")]
use crate::semaphore::{DynSemaphore, SemaphoreFactory};
#[cfg(any(
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
use crate::error::{FactoryError, init_error};
use crate::{config::FactoryConfig, element::Element, error::InitError};

/// Every element store of the system.
///
/// Kinds have independent name spaces: an object, a buffer and a semaphore
/// may all be called `"x"` at once.
#[derive(Debug)]
pub struct Factory {
    #[cfg(feature = "objects-registry")]
    objects: ObjectsRegistry,
    #[cfg(feature = "generic-buffers")]
    buffers: BufferFactory,
    #[cfg(feature = "semaphores")]
    semaphores: SemaphoreFactory,
}

/// Splits a pool of `count` blocks for `object` off the front of `arena`.
#[cfg(any(
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
fn carve(
    arena: &mut &'static mut [u8],
    object: Layout,
    count: usize,
) -> Result<MemoryPool, InitError> {
    let mut pool = MemoryPool::new(object);
    if count == 0 {
        return Ok(pool);
    }
    let block = pool.block_layout();
    let available = arena.len();
    let required = block
        .size()
        .checked_mul(count)
        .and_then(|n| n.checked_add(arena.as_ptr().align_offset(block.align())))
        .unwrap_or(usize::MAX);
    ensure!(
        required <= available,
        init_error::ArenaTooSmallSnafu {
            required,
            available,
        }
    );

    let (region, rest) = mem::take(arena).split_at_mut(required);
    *arena = rest;
    let loaded = unsafe { pool.load_region(region.as_mut_ptr(), region.len()) };
    debug_assert_eq!(loaded, count);
    Ok(pool)
}

impl Factory {
    /// Brings up every enabled store.
    ///
    /// Descriptor pools are carved, one after the other, from `arena`; buffer
    /// payloads are served from `heap`. Both regions are owned by the factory
    /// from now on.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::ArenaTooSmall`] if `arena` cannot hold the
    /// descriptors `config` asks for.
    #[track_caller]
    #[cfg_attr(
        not(feature = "generic-buffers"),
        expect(unused_variables, reason = "no kind uses the heap")
    )]
    #[cfg_attr(
        not(any(
            feature = "objects-registry",
            feature = "generic-buffers",
            feature = "semaphores"
        )),
        expect(unused_mut, reason = "no descriptor pool is carved")
    )]
    pub fn from_regions(
        config: &FactoryConfig,
        mut arena: &'static mut [u8],
        heap: &'static mut [u8],
    ) -> Result<Self, InitError> {
        let arena_len = arena.len();

        #[cfg(feature = "objects-registry")]
        let objects = ObjectsRegistry::new(carve(
            &mut arena,
            ObjectsRegistry::<MemoryPool>::descriptor_layout(),
            config.objects,
        )?);

        #[cfg(feature = "generic-buffers")]
        let buffers = {
            let descriptors = carve(
                &mut arena,
                BufferFactory::<MemoryPool>::descriptor_layout(),
                config.buffers,
            )?;
            let mut payloads = Heap::new();
            unsafe {
                payloads.add_region(heap.as_mut_ptr(), heap.len());
            }
            BufferFactory::new(descriptors, payloads)
        };

        #[cfg(feature = "semaphores")]
        let semaphores = SemaphoreFactory::new(carve(
            &mut arena,
            SemaphoreFactory::<MemoryPool>::descriptor_layout(),
            config.semaphores,
        )?);

        debug!(
            "factory ready: {config:?}, {} of {arena_len} arena bytes unused",
            arena.len()
        );
        Ok(Self {
            #[cfg(feature = "objects-registry")]
            objects,
            #[cfg(feature = "generic-buffers")]
            buffers,
            #[cfg(feature = "semaphores")]
            semaphores,
        })
    }

    /// Takes one more reference to `element`, whatever its kind.
    #[must_use]
    pub fn duplicate_reference<E: Element>(&self, element: &E) -> E {
        element.duplicate_reference()
    }
}

#[cfg(feature = "objects-registry")]
impl Factory {
    #[must_use]
    pub fn objects(&self) -> &ObjectsRegistry {
        &self.objects
    }

    /// Registers `object` under `name`.
    ///
    /// # Errors
    ///
    /// See [`ObjectsRegistry::register`].
    #[track_caller]
    pub fn register_object<T>(
        &self,
        name: &str,
        object: NonNull<T>,
    ) -> Result<RegisteredObject<'_>, FactoryError> {
        self.objects.register(name, object)
    }

    #[must_use]
    pub fn find_object(&self, name: &str) -> Option<RegisteredObject<'_>> {
        self.objects.find(name)
    }

    #[track_caller]
    pub fn release_object(&self, object: RegisteredObject<'_>) {
        self.objects.release(object);
    }
}

#[cfg(feature = "generic-buffers")]
impl Factory {
    #[must_use]
    pub fn buffers(&self) -> &BufferFactory {
        &self.buffers
    }

    /// Creates a buffer of `size` bytes named `name`.
    ///
    /// # Errors
    ///
    /// See [`BufferFactory::create`].
    #[track_caller]
    pub fn create_buffer(&self, name: &str, size: usize) -> Result<DynBuffer<'_>, FactoryError> {
        self.buffers.create(name, size)
    }

    #[must_use]
    pub fn find_buffer(&self, name: &str) -> Option<DynBuffer<'_>> {
        self.buffers.find(name)
    }

    #[track_caller]
    pub fn release_buffer(&self, buffer: DynBuffer<'_>) {
        self.buffers.release(buffer);
    }
}

#[cfg(feature = "semaphores")]
impl Factory {
    #[must_use]
    pub fn semaphores(&self) -> &SemaphoreFactory {
        &self.semaphores
    }

    /// Creates a semaphore named `name` with `count` initial tokens.
    ///
    /// # Errors
    ///
    /// See [`SemaphoreFactory::create`].
    #[track_caller]
    pub fn create_semaphore(
        &self,
        name: &str,
        count: isize,
    ) -> Result<DynSemaphore<'_>, FactoryError> {
        self.semaphores.create(name, count)
    }

    #[must_use]
    pub fn find_semaphore(&self, name: &str) -> Option<DynSemaphore<'_>> {
        self.semaphores.find(name)
    }

    #[track_caller]
    pub fn release_semaphore(&self, semaphore: DynSemaphore<'_>) {
        self.semaphores.release(semaphore);
    }
}

#[cfg(all(
    test,
    feature = "objects-registry",
    feature = "generic-buffers",
    feature = "semaphores"
))]
mod tests {
    use super::*;
    use crate::testing;

    static MYOBJ: u32 = 0x55aa;

    fn factory(config: &FactoryConfig) -> Factory {
        Factory::from_regions(config, testing::region(4096), testing::region(4096)).unwrap()
    }

    #[test]
    fn test_kinds_have_separate_names() {
        let factory = factory(&FactoryConfig::default());
        let obj = factory.register_object("x", NonNull::from(&MYOBJ)).unwrap();
        let buf = factory.create_buffer("x", 32).unwrap();
        let sem = factory.create_semaphore("x", 1).unwrap();

        assert_eq!(obj.name(), "x");
        assert_eq!(buf.name(), "x");
        assert_eq!(sem.name(), "x");
        assert_ne!(obj.element_ptr(), buf.element_ptr());
        assert_ne!(buf.element_ptr(), sem.element_ptr());

        factory.release_buffer(buf);
        assert!(factory.find_buffer("x").is_none());
        assert!(factory.find_object("x").is_some());
        assert!(factory.find_semaphore("x").is_some());

        factory.release_object(obj);
        factory.release_semaphore(sem);
        assert!(factory.objects().is_empty());
        assert!(factory.semaphores().is_empty());
    }

    #[test]
    fn test_capacities_follow_config() {
        let factory = factory(&FactoryConfig::new(1, 2, 3));
        assert_eq!(factory.objects().with_allocators(|pool, _| pool.capacity()), 1);
        assert_eq!(factory.buffers().with_allocators(|pool, _| pool.capacity()), 2);
        assert_eq!(
            factory.semaphores().with_allocators(|pool, _| pool.capacity()),
            3
        );

        let _a = factory.create_semaphore("a", 0).unwrap();
        let _b = factory.create_semaphore("b", 0).unwrap();
        let _c = factory.create_semaphore("c", 0).unwrap();
        assert!(
            factory
                .create_semaphore("d", 0)
                .unwrap_err()
                .is_out_of_memory()
        );
    }

    #[test]
    fn test_duplicate_reference_across_kinds() {
        let factory = factory(&FactoryConfig::default());
        let buf = factory.create_buffer("b", 8).unwrap();
        let sem = factory.create_semaphore("s", 0).unwrap();
        let buf2 = factory.duplicate_reference(&buf);
        let sem2 = crate::duplicate_reference(&sem);
        assert_eq!(buf2.refs(), 2);
        assert_eq!(sem2.refs(), 2);
    }

    #[test]
    fn test_arena_too_small() {
        let err = Factory::from_regions(
            &FactoryConfig::new(64, 64, 64),
            testing::region(256),
            testing::region(256),
        )
        .unwrap_err();
        assert!(err.is_arena_too_small());
        assert!(matches!(
            err,
            InitError::ArenaTooSmall { available, required, .. } if required > available
        ));
    }

    #[test]
    fn test_empty_config() {
        let factory = Factory::from_regions(
            &FactoryConfig::new(0, 0, 0),
            testing::region(0),
            testing::region(0),
        )
        .unwrap();
        assert!(factory.create_buffer("b", 1).unwrap_err().is_out_of_memory());
    }
}
