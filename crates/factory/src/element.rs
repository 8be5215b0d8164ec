//! The header shared by every kind of factory element.

use core::{cell::UnsafeCell, ptr::NonNull};

use arrayvec::ArrayString;
use snafu::ensure;

use crate::{
    config::MAX_NAME_LEN,
    error::{FactoryError, factory_error},
};

/// Symbolic name of an element.
pub type Name = ArrayString<MAX_NAME_LEN>;

/// Copies `name` into a [`Name`], rejecting names that do not fit.
#[track_caller]
pub(crate) fn make_name(name: &str) -> Result<Name, FactoryError> {
    ensure!(
        name.len() <= MAX_NAME_LEN,
        factory_error::NameTooLongSnafu {
            len: name.len(),
            max: MAX_NAME_LEN,
        }
    );
    let mut out = Name::new();
    out.push_str(name);
    Ok(out)
}

/// Name and reference count, at the start of every element descriptor.
pub(crate) struct Header {
    name: Name,
    /// Only read or written with the owning store's lock held.
    refs: UnsafeCell<usize>,
}

impl Header {
    pub(crate) fn new(name: Name) -> Self {
        Self {
            name,
            refs: UnsafeCell::new(1),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Reference counter. Dereference it only with the owning store locked.
    pub(crate) fn refs(&self) -> *mut usize {
        self.refs.get()
    }
}

/// Capability shared by the handles of every element kind.
///
/// A handle owns exactly one reference to its element. Dropping the handle
/// gives the reference back; when the last one goes, the element is unlinked
/// from its store and its storage is reclaimed.
pub trait Element {
    /// Name the element was created with.
    fn name(&self) -> &str;

    /// Current number of references, including the one held by `self`.
    fn refs(&self) -> usize;

    /// Address of the element descriptor, identical for every handle to the
    /// same element.
    fn element_ptr(&self) -> NonNull<()>;

    /// Takes one more reference to the same element.
    #[must_use]
    fn duplicate_reference(&self) -> Self
    where
        Self: Sized;
}

/// Takes one more reference to `element`, whatever its kind.
#[must_use]
pub fn duplicate_reference<E>(element: &E) -> E
where
    E: Element,
{
    element.duplicate_reference()
}
