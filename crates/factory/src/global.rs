//! The system-wide factory instance.
//!
//! Brought up once during kernel start-up with [`init`], then reached from
//! anywhere through [`factory`].

use log::info;
use snafu::ensure;
use spin::Once;

use crate::{
    error::{InitError, init_error},
    factory::Factory,
};

static FACTORY: Once<Factory> = Once::new();

/// Installs `factory` as the system-wide instance.
///
/// # Errors
///
/// Returns [`InitError::AlreadyInitialized`] if an instance is already
/// installed. `factory` is dropped in that case.
#[track_caller]
pub fn init(factory: Factory) -> Result<&'static Factory, InitError> {
    ensure!(!FACTORY.is_completed(), init_error::AlreadyInitializedSnafu);

    let mut installed = false;
    let instance = FACTORY.call_once(|| {
        installed = true;
        factory
    });
    ensure!(installed, init_error::AlreadyInitializedSnafu);
    info!("objects factory initialized");
    Ok(instance)
}

/// Returns the system-wide instance, if [`init`] has run.
#[must_use]
pub fn get() -> Option<&'static Factory> {
    FACTORY.get()
}

/// Returns the system-wide instance.
///
/// # Panics
///
/// Panics if [`init`] has not run yet.
#[must_use]
#[track_caller]
pub fn factory() -> &'static Factory {
    let Some(factory) = get() else {
        panic!("objects factory used before initialization");
    };
    factory
}

#[cfg(all(test, feature = "semaphores"))]
mod tests {
    use super::*;
    use crate::{config::FactoryConfig, element::Element as _, testing};

    fn instance() -> Factory {
        Factory::from_regions(
            &FactoryConfig::default(),
            testing::region(4096),
            testing::region(1024),
        )
        .unwrap()
    }

    // The only test touching the global instance.
    #[test]
    fn test_init_once() {
        assert!(get().is_none());

        let installed = init(instance()).unwrap();
        assert!(core::ptr::eq(installed, factory()));

        let err = init(instance()).unwrap_err();
        assert!(err.is_already_initialized());

        let sem = factory().create_semaphore("boot", 0).unwrap();
        let found = get().unwrap().find_semaphore("boot").unwrap();
        assert_eq!(sem, found);
        assert_eq!(found.refs(), 2);
    }
}
