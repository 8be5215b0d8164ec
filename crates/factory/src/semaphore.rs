//! Dynamic semaphores: counting semaphores created and destroyed by name.
//!
//! The factory only builds the semaphore and tears it down after the last
//! reference is released. Waiting and signalling go straight to the
//! [`Semaphore`] borrowed from the handle.

use allocator::pool::MemoryPool;

use crate::{
    adapter::BlockPool,
    error::FactoryError,
    store::{Kind, Ref, Store},
    sync::Semaphore,
};

/// Marker for the dynamic-semaphores kind.
#[derive(Debug)]
pub enum Semaphores {}

impl Kind for Semaphores {
    type Payload = Semaphore;
    type Backing = ();
    const LABEL: &'static str = "semaphore";

    fn destroy(semaphore: Semaphore, _backing: &mut ()) {
        semaphore.finalize();
    }
}

/// Store of dynamic semaphores.
pub type SemaphoreFactory<P = MemoryPool> = Store<Semaphores, P>;

/// Handle to a dynamic semaphore.
pub type DynSemaphore<'s, P = MemoryPool> = Ref<'s, Semaphores, P>;

impl<P: BlockPool> Store<Semaphores, P> {
    /// Creates an empty semaphore store taking descriptors from
    /// `descriptors`.
    #[must_use]
    pub fn new(descriptors: P) -> Self {
        Self::with_backing(descriptors, ())
    }

    /// Creates a semaphore named `name` with `count` initial tokens.
    ///
    /// `count` may be negative.
    #[track_caller]
    pub fn create(&self, name: &str, count: isize) -> Result<DynSemaphore<'_, P>, FactoryError> {
        self.insert_with(name, |_, _| Ok(Semaphore::new(count)))
    }
}

impl<P: BlockPool> Ref<'_, Semaphores, P> {
    #[must_use]
    pub fn semaphore(&self) -> &Semaphore {
        self.payload()
    }
}
