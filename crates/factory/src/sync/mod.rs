//! Synchronization primitives whose lifetime the factory manages.

pub use self::semaphore::Semaphore;

mod semaphore;
