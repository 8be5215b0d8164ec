//! Objects registry: names bound to externally owned objects.
//!
//! Registering an object only records its address under a name. The factory
//! never dereferences the pointer and never frees what it points to; the
//! registry descriptor is all that is reclaimed when the last reference goes.

use core::ptr::NonNull;

use allocator::pool::MemoryPool;

use crate::{
    adapter::BlockPool,
    error::FactoryError,
    store::{Kind, Ref, Store},
};

/// Marker for the registered-objects kind.
#[derive(Debug)]
pub enum Objects {}

/// Address of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPtr(NonNull<()>);

// Never dereferenced by the factory.
unsafe impl Send for ObjectPtr {}
unsafe impl Sync for ObjectPtr {}

impl Kind for Objects {
    type Payload = ObjectPtr;
    type Backing = ();
    const LABEL: &'static str = "object";

    fn destroy(_payload: ObjectPtr, _backing: &mut ()) {}
}

/// Store of registered objects.
pub type ObjectsRegistry<P = MemoryPool> = Store<Objects, P>;

/// Handle to a registered object.
pub type RegisteredObject<'s, P = MemoryPool> = Ref<'s, Objects, P>;

impl<P: BlockPool> Store<Objects, P> {
    /// Creates an empty registry taking descriptors from `descriptors`.
    #[must_use]
    pub fn new(descriptors: P) -> Self {
        Self::with_backing(descriptors, ())
    }

    /// Registers `object` under `name`.
    ///
    /// The returned handle owns the first reference to the registration.
    #[track_caller]
    pub fn register<T>(
        &self,
        name: &str,
        object: NonNull<T>,
    ) -> Result<RegisteredObject<'_, P>, FactoryError> {
        self.insert_with(name, |_, _| Ok(ObjectPtr(object.cast())))
    }
}

impl<P: BlockPool> Ref<'_, Objects, P> {
    /// Address the object was registered with.
    #[must_use]
    pub fn object(&self) -> NonNull<()> {
        self.payload().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{element::Element as _, testing};

    static MYOBJ: u32 = 0x55aa;

    fn registry(capacity: usize) -> ObjectsRegistry {
        ObjectsRegistry::new(testing::pool(
            ObjectsRegistry::<MemoryPool>::descriptor_layout(),
            capacity,
        ))
    }

    fn myobj() -> NonNull<u32> {
        NonNull::from(&MYOBJ)
    }

    #[test]
    fn test_objects_registry() {
        let registry = registry(4);

        assert!(registry.find("myobj").is_none());

        let rop = registry.register("myobj", myobj()).unwrap();

        let err = registry.register("myobj", myobj()).unwrap_err();
        assert!(err.is_duplicate_name());

        {
            let rop1 = registry.find("myobj").unwrap();
            assert_eq!(unsafe { *rop1.object().cast::<u32>().as_ref() }, 0x55aa);
            assert_eq!(rop, rop1);
            assert_eq!(rop1.refs(), 2);

            let rop2 = rop1.duplicate_reference();
            assert_eq!(rop1, rop2);
            assert_eq!(unsafe { *rop2.object().cast::<u32>().as_ref() }, 0x55aa);
            assert_eq!(rop2.refs(), 3);

            registry.release(rop2);
            assert_eq!(rop1.refs(), 2);

            registry.release(rop1);
            assert_eq!(rop.refs(), 1);
        }

        registry.release(rop);

        assert!(registry.find("myobj").is_none());
    }

    #[test]
    fn test_pointee_is_untouched() {
        let mut value = 7u64;
        let registry = registry(1);
        let obj = registry.register("v", NonNull::from(&mut value)).unwrap();
        assert_eq!(obj.object(), NonNull::from(&mut value).cast());
        drop(obj);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_descriptor_reclaimed() {
        let registry = registry(1);
        registry.register("a", myobj()).unwrap().release();
        registry.register("b", myobj()).unwrap().release();
        assert_eq!(registry.with_allocators(|pool, _| pool.free_count()), 1);
    }

    #[test]
    fn test_out_of_descriptors() {
        let registry = registry(1);
        let _a = registry.register("a", myobj()).unwrap();
        let err = registry.register("b", myobj()).unwrap_err();
        assert!(err.is_out_of_memory());
    }
}
