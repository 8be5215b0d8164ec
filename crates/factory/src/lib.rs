//! Objects factory for the Onix kernel.
//!
//! Kernel objects created at run time are kept in per-kind stores and reached
//! by a short symbolic name. Every element carries a reference count: lookups
//! and duplications take a reference, releases give one back, and the element
//! is destroyed and its memory reclaimed once the last reference is gone.
//!
//! Three kinds are provided, each behind a cargo feature:
//!
//! - registered objects (`objects-registry`), names bound to objects the
//!   factory does not own
//! - dynamic buffers (`generic-buffers`), byte regions served from a heap
//! - dynamic semaphores (`semaphores`), counting semaphores
//!
//! Each kind has its own name space. Element descriptors come from
//! fixed-block pools, so creating an element never fails in any way other
//! than the ones reported by [`FactoryError`].
//!
//! # Usage Example
//!
//! ```rust
//! use factory::{Element as _, Factory, FactoryConfig};
//!
//! let arena = Box::leak(vec![0u8; 4096].into_boxed_slice());
//! let heap = Box::leak(vec![0u8; 4096].into_boxed_slice());
//! let factory = Factory::from_regions(&FactoryConfig::default(), arena, heap).unwrap();
//!
//! let buf = factory.create_buffer("mybuf", 128).unwrap();
//! assert!(factory.create_buffer("mybuf", 128).unwrap_err().is_duplicate_name());
//!
//! let found = factory.find_buffer("mybuf").unwrap();
//! assert_eq!(found, buf);
//! assert_eq!(found.refs(), 2);
//!
//! factory.release_buffer(found);
//! factory.release_buffer(buf);
//! assert!(factory.find_buffer("mybuf").is_none());
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "generic-buffers")]
pub use self::buffer::{BufferFactory, BufferRegion, Buffers, DynBuffer};
#[cfg(feature = "objects-registry")]
pub use self::object::{ObjectPtr, Objects, ObjectsRegistry, RegisteredObject};
#[cfg(feature = "semaphores")]
pub use self::semaphore::{DynSemaphore, SemaphoreFactory, Semaphores};
pub use self::{
    adapter::{BlockPool, ByteHeap},
    config::{FactoryConfig, MAX_NAME_LEN},
    element::{Element, Name, duplicate_reference},
    error::{FactoryError, InitError, Location, Resource},
    factory::Factory,
    store::{Kind, Ref, Store},
    sync::Semaphore,
};

pub mod adapter;
#[cfg(feature = "generic-buffers")]
pub mod buffer;
pub mod config;
pub mod element;
pub mod error;
pub mod factory;
pub mod global;
#[cfg(feature = "objects-registry")]
pub mod object;
#[cfg(feature = "semaphores")]
pub mod semaphore;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
