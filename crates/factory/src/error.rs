use core::{fmt, panic};

use derive_more::{Display, IsVariant};
use snafu::{GenerateImplicitData, Snafu};

use crate::element::Name;

/// Source location where an error was raised.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Location(&'static panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Allocation that failed while creating an element.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    #[display("descriptor")]
    Descriptor,
    #[display("payload")]
    Payload,
}

/// Errors returned when creating or registering an element.
///
/// Every variant leaves the store exactly as it was before the call.
#[derive(Debug, Snafu, IsVariant)]
#[snafu(module, visibility(pub(crate)))]
pub enum FactoryError {
    #[snafu(display("{kind} {name:?} already exists"))]
    DuplicateName {
        kind: &'static str,
        name: Name,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("out of memory allocating {resource} for {kind} {name:?}"))]
    OutOfMemory {
        kind: &'static str,
        name: Name,
        resource: Resource,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("name is {len} bytes long, at most {max} allowed"))]
    NameTooLong {
        len: usize,
        max: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Errors raised while bringing up the factory.
#[derive(Debug, Snafu, IsVariant)]
#[snafu(module, visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display(
        "descriptor arena too small: {required} bytes required, {available} available"
    ))]
    ArenaTooSmall {
        required: usize,
        available: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("objects factory already initialized"))]
    AlreadyInitialized {
        #[snafu(implicit)]
        location: Location,
    },
}
