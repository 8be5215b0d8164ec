//! Build-time and start-up configuration of the objects factory.

/// Maximum length of an element name, in bytes.
///
/// Shared by every kind of element. Names are compared in full. Longer names
/// are rejected with [`FactoryError::NameTooLong`](crate::FactoryError::NameTooLong)
/// rather than truncated, so they can never be found.
pub const MAX_NAME_LEN: usize = 8;

/// Number of descriptors reserved for each kind of element.
///
/// Used by [`Factory::from_regions`](crate::Factory::from_regions) to carve
/// the descriptor pools out of a single arena. Counts for kinds disabled at
/// build time are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Registered object descriptors.
    pub objects: usize,
    /// Dynamic buffer descriptors. Buffer payloads come from the heap.
    pub buffers: usize,
    /// Dynamic semaphore descriptors.
    pub semaphores: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self::new(8, 8, 8)
    }
}

impl FactoryConfig {
    #[must_use]
    pub const fn new(objects: usize, buffers: usize, semaphores: usize) -> Self {
        Self {
            objects,
            buffers,
            semaphores,
        }
    }
}
