//! Name-keyed, reference-counted element stores.
//!
//! A [`Store`] holds every live element of one kind in an intrusive singly
//! linked list threaded through the element descriptors. Descriptors come
//! from a [`BlockPool`]; anything else an element owns is created and
//! destroyed by its [`Kind`].
//!
//! One lock guards the list, the allocators and the reference counts of all
//! elements in the store. Holding it across "look up, then insert" and
//! "decrement, then maybe destroy" makes both sequences atomic: two threads
//! can never both create the same name, and exactly one thread tears an
//! element down.

use core::{alloc::Layout, fmt, ptr, ptr::NonNull};

use allocator::pool::MemoryPool;
use log::{debug, trace, warn};
use snafu::{OptionExt as _, ensure};
use spin::Mutex;

use crate::{
    adapter::BlockPool,
    element::{self, Element, Header, Name},
    error::{FactoryError, Resource, factory_error},
};

/// What distinguishes one kind of element from another.
pub trait Kind: 'static {
    /// Kind-specific data stored in the descriptor after the header.
    type Payload: Send + Sync;
    /// Allocator state owned by the store, beside the descriptor pool.
    type Backing: Send;
    /// Human-readable kind name, used in errors and logs.
    const LABEL: &'static str;

    /// Releases whatever `payload` owns.
    ///
    /// Called with the store lock held, once the last reference is gone and
    /// the element is unlinked, right before its descriptor is freed.
    fn destroy(payload: Self::Payload, backing: &mut Self::Backing);
}

struct Node<T> {
    header: Header,
    next: Option<NonNull<Node<T>>>,
    payload: T,
}

impl<T> Node<T> {
    /// # Safety
    ///
    /// `node` must be linked into a store whose lock the caller holds.
    unsafe fn refs<'a>(node: NonNull<Self>) -> &'a mut usize {
        unsafe { &mut *(*node.as_ptr()).header.refs() }
    }
}

struct State<K: Kind, P> {
    head: Option<NonNull<Node<K::Payload>>>,
    len: usize,
    descriptors: P,
    backing: K::Backing,
}

// Nodes are only reached through the list, which moves with the state.
unsafe impl<K: Kind, P: Send> Send for State<K, P> {}

impl<K: Kind, P> State<K, P> {
    fn lookup(&self, name: &str) -> Option<NonNull<Node<K::Payload>>> {
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let node_ref = unsafe { node.as_ref() };
            if node_ref.header.name() == name {
                return Some(node);
            }
            cursor = node_ref.next;
        }
        None
    }

    fn unlink(&mut self, node: NonNull<Node<K::Payload>>) {
        let mut link = &mut self.head;
        while let Some(current) = *link {
            if current == node {
                *link = unsafe { (*node.as_ptr()).next };
                self.len -= 1;
                return;
            }
            link = unsafe { &mut (*current.as_ptr()).next };
        }
        panic!("{} element is not registered in this store", K::LABEL);
    }
}

/// All live elements of one kind.
pub struct Store<K: Kind, P: BlockPool = MemoryPool> {
    state: Mutex<State<K, P>>,
}

impl<K: Kind, P: BlockPool> fmt::Debug for Store<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Store");
        d.field("kind", &K::LABEL);
        match self.state.try_lock() {
            Some(state) => d.field("len", &state.len),
            None => d.field("len", &"<locked>"),
        };
        d.finish()
    }
}

impl<K: Kind, P: BlockPool> Store<K, P> {
    /// Creates an empty store taking descriptors from `descriptors` and
    /// handing `backing` to the kind for its payloads.
    ///
    /// # Panics
    ///
    /// Panics if the pool's blocks cannot hold a descriptor of this kind.
    #[must_use]
    pub fn with_backing(descriptors: P, backing: K::Backing) -> Self {
        let needed = Self::descriptor_layout();
        let block = descriptors.block_layout();
        assert!(
            block.size() >= needed.size() && block.align() >= needed.align(),
            "{} descriptor pool blocks are too small: {block:?} < {needed:?}",
            K::LABEL,
        );
        debug!("{} store ready, descriptor {needed:?}", K::LABEL);
        Self {
            state: Mutex::new(State {
                head: None,
                len: 0,
                descriptors,
                backing,
            }),
        }
    }

    /// Layout a descriptor pool block must fit.
    #[must_use]
    pub fn descriptor_layout() -> Layout {
        Layout::new::<Node<K::Payload>>()
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether an element named `name` exists, without taking a
    /// reference to it.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().lookup(name).is_some()
    }

    /// Looks an element up by name.
    ///
    /// On success the returned handle owns a new reference to the element.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Ref<'_, K, P>> {
        let state = self.state.lock();
        let node = state.lookup(name)?;
        let refs = unsafe { Node::refs(node) };
        *refs += 1;
        trace!("{} {name:?} found, refs={refs}", K::LABEL);
        Some(Ref { store: self, node })
    }

    /// Gives back the reference owned by `element`.
    ///
    /// Equivalent to dropping the handle, but checks that the handle belongs
    /// to this store.
    ///
    /// # Panics
    ///
    /// Panics if `element` was obtained from another store.
    #[track_caller]
    pub fn release(&self, element: Ref<'_, K, P>) {
        assert!(
            ptr::eq(element.store, self),
            "{} {:?} released to a store it does not belong to",
            K::LABEL,
            element.name(),
        );
        drop(element);
    }

    /// Runs `f` on the store's allocators, with the store locked.
    ///
    /// # Deadlocks
    ///
    /// `f` must not create, find, duplicate or release elements of this
    /// store, including by dropping one of its handles. The lock is not
    /// reentrant and the thread would spin forever.
    pub fn with_allocators<R>(&self, f: impl FnOnce(&P, &K::Backing) -> R) -> R {
        let state = self.state.lock();
        f(&state.descriptors, &state.backing)
    }

    /// Creates an element named `name` whose payload is built by `init`.
    ///
    /// The name check, the descriptor allocation, `init` and the insertion all
    /// happen under the store lock. If `init` fails, the descriptor is given
    /// back before returning its error.
    #[track_caller]
    pub(crate) fn insert_with<F>(&self, name: &str, init: F) -> Result<Ref<'_, K, P>, FactoryError>
    where
        F: FnOnce(&mut K::Backing, Name) -> Result<K::Payload, FactoryError>,
    {
        let name = element::make_name(name)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        ensure!(
            state.lookup(&name).is_none(),
            factory_error::DuplicateNameSnafu {
                kind: K::LABEL,
                name,
            }
        );

        let block = state
            .descriptors
            .alloc()
            .context(factory_error::OutOfMemorySnafu {
                kind: K::LABEL,
                name,
                resource: Resource::Descriptor,
            })?;
        let payload = match init(&mut state.backing, name) {
            Ok(payload) => payload,
            Err(e) => {
                unsafe {
                    state.descriptors.free(block);
                }
                return Err(e);
            }
        };

        let node = block.cast::<Node<K::Payload>>();
        unsafe {
            node.write(Node {
                header: Header::new(name),
                next: state.head,
                payload,
            });
        }
        state.head = Some(node);
        state.len += 1;
        trace!("{} {name:?} created", K::LABEL);

        Ok(Ref { store: self, node })
    }

    fn retain(&self, node: NonNull<Node<K::Payload>>) {
        let _state = self.state.lock();
        let refs = unsafe { Node::refs(node) };
        assert!(*refs > 0, "{} element duplicated after destruction", K::LABEL);
        *refs += 1;
    }

    fn refs(&self, node: NonNull<Node<K::Payload>>) -> usize {
        let _state = self.state.lock();
        unsafe { *Node::refs(node) }
    }

    fn release_node(&self, node: NonNull<Node<K::Payload>>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let refs = unsafe { Node::refs(node) };
        assert!(
            *refs > 0,
            "{} element released with no references left",
            K::LABEL
        );
        *refs -= 1;
        if *refs > 0 {
            return;
        }

        state.unlink(node);
        let Node {
            header, payload, ..
        } = unsafe { node.read() };
        K::destroy(payload, &mut state.backing);
        unsafe {
            state.descriptors.free(node.cast());
        }
        trace!("{} {:?} destroyed", K::LABEL, header.name());
    }
}

impl<K: Kind, P: BlockPool> Drop for Store<K, P> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.len > 0 {
            warn!(
                "{} store dropped with {} live elements",
                K::LABEL,
                state.len
            );
        }
        while let Some(node) = state.head {
            let Node { next, payload, .. } = unsafe { node.read() };
            state.head = next;
            K::destroy(payload, &mut state.backing);
            unsafe {
                state.descriptors.free(node.cast());
            }
        }
        state.len = 0;
    }
}

/// Handle owning one reference to an element of kind `K`.
///
/// Handles to the same element compare equal. Dropping a handle releases its
/// reference.
pub struct Ref<'s, K: Kind, P: BlockPool = MemoryPool> {
    store: &'s Store<K, P>,
    node: NonNull<Node<K::Payload>>,
}

unsafe impl<K: Kind, P: BlockPool> Send for Ref<'_, K, P> {}
unsafe impl<K: Kind, P: BlockPool> Sync for Ref<'_, K, P> {}

impl<'s, K: Kind, P: BlockPool> Ref<'s, K, P> {
    /// Store the element lives in.
    #[must_use]
    pub fn store(&self) -> &'s Store<K, P> {
        self.store
    }

    /// Gives back this reference. Same as dropping the handle.
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn payload(&self) -> &K::Payload {
        unsafe { &(*self.node.as_ptr()).payload }
    }
}

impl<K: Kind, P: BlockPool> Element for Ref<'_, K, P> {
    fn name(&self) -> &str {
        unsafe { (*self.node.as_ptr()).header.name() }
    }

    fn refs(&self) -> usize {
        self.store.refs(self.node)
    }

    fn element_ptr(&self) -> NonNull<()> {
        self.node.cast()
    }

    fn duplicate_reference(&self) -> Self {
        self.store.retain(self.node);
        Self {
            store: self.store,
            node: self.node,
        }
    }
}

impl<K: Kind, P: BlockPool> Drop for Ref<'_, K, P> {
    fn drop(&mut self) {
        self.store.release_node(self.node);
    }
}

impl<K: Kind, P: BlockPool> PartialEq for Ref<'_, K, P> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<K: Kind, P: BlockPool> Eq for Ref<'_, K, P> {}

impl<K: Kind, P: BlockPool> fmt::Debug for Ref<'_, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("kind", &K::LABEL)
            .field("name", &self.name())
            .field("element", &self.node)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;
    use crate::testing;

    /// Kind counting its destructions, for checking teardown.
    struct Counted;

    impl Kind for Counted {
        type Payload = u32;
        type Backing = usize;
        const LABEL: &'static str = "counted";

        fn destroy(_payload: u32, destroyed: &mut usize) {
            *destroyed += 1;
        }
    }

    type CountedStore = Store<Counted>;

    fn counted_store(capacity: usize) -> CountedStore {
        Store::with_backing(
            testing::pool(CountedStore::descriptor_layout(), capacity),
            0,
        )
    }

    fn create<'s>(store: &'s CountedStore, name: &str, value: u32) -> Ref<'s, Counted> {
        store.insert_with(name, |_, _| Ok(value)).unwrap()
    }

    fn destroyed(store: &CountedStore) -> usize {
        store.with_allocators(|_, destroyed| *destroyed)
    }

    fn free_descriptors(store: &CountedStore) -> usize {
        store.with_allocators(|pool, _| pool.free_count())
    }

    #[test]
    fn test_find_on_empty_store() {
        let store = counted_store(4);
        assert!(store.find("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_and_find() {
        let store = counted_store(4);
        let a = create(&store, "a", 7);
        assert_eq!(a.refs(), 1);
        assert_eq!(*a.payload(), 7);
        assert_eq!(store.len(), 1);

        let a1 = store.find("a").unwrap();
        assert_eq!(a1, a);
        assert_eq!(a1.element_ptr(), a.element_ptr());
        assert_eq!(a.refs(), 2);
        assert_eq!(*a1.payload(), 7);
    }

    #[test]
    fn test_duplicate_name_leaves_original_untouched() {
        let store = counted_store(4);
        let a = create(&store, "a", 1);
        let err = store.insert_with("a", |_, _| Ok(2)).unwrap_err();
        assert!(err.is_duplicate_name());
        assert_eq!(a.refs(), 1);
        assert_eq!(*a.payload(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(free_descriptors(&store), 3);
    }

    #[test]
    fn test_duplicate_name_does_not_run_init() {
        let store = counted_store(4);
        let _a = create(&store, "a", 1);
        let mut called = false;
        let result = store.insert_with("a", |_, _| {
            called = true;
            Ok(2)
        });
        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn test_names_are_exact() {
        let store = counted_store(4);
        let _ab = create(&store, "ab", 1);
        assert!(store.find("a").is_none());
        assert!(store.find("abc").is_none());
        assert!(store.find("AB").is_none());
        let _a = create(&store, "a", 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_name_too_long() {
        let store = counted_store(4);
        let err = store.insert_with("far too long", |_, _| Ok(0)).unwrap_err();
        assert!(err.is_name_too_long());
        assert!(store.find("far too long").is_none());
        assert_eq!(free_descriptors(&store), 4);
    }

    #[test]
    fn test_long_name_is_not_truncated() {
        let store = counted_store(4);
        let _full = create(&store, "12345678", 1);
        assert!(store.find("123456789").is_none());
        assert!(!store.contains("123456789"));
        let err = store.insert_with("123456789", |_, _| Ok(2)).unwrap_err();
        assert!(err.is_name_too_long());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_release_symmetry() {
        let store = counted_store(4);
        let a = create(&store, "a", 1);
        let refs = [store.find("a").unwrap(), a.duplicate_reference()];
        assert_eq!(a.refs(), 3);

        for r in refs {
            r.release();
        }
        assert_eq!(a.refs(), 1);
        assert!(store.contains("a"));
        assert_eq!(destroyed(&store), 0);

        store.release(a);
        assert!(store.find("a").is_none());
        assert_eq!(destroyed(&store), 1);
        assert_eq!(free_descriptors(&store), 4);
    }

    #[test]
    fn test_descriptor_exhaustion() {
        let store = counted_store(2);
        let _a = create(&store, "a", 1);
        let _b = create(&store, "b", 2);
        let err = store.insert_with("c", |_, _| Ok(3)).unwrap_err();
        assert!(matches!(
            err,
            FactoryError::OutOfMemory {
                resource: Resource::Descriptor,
                ..
            }
        ));
        assert_eq!(store.len(), 2);
        assert!(!store.contains("c"));
    }

    #[test]
    fn test_failed_init_returns_descriptor() {
        let store = counted_store(1);
        let err = store
            .insert_with("a", |_, name| {
                factory_error::OutOfMemorySnafu {
                    kind: Counted::LABEL,
                    name,
                    resource: Resource::Payload,
                }
                .fail()
            })
            .unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(free_descriptors(&store), 1);
        assert!(store.is_empty());

        let _a = create(&store, "a", 1);
    }

    #[test]
    fn test_recreate_after_destroy() {
        let store = counted_store(1);
        create(&store, "a", 1).release();
        let a = create(&store, "a", 2);
        assert_eq!(*a.payload(), 2);
        assert_eq!(a.refs(), 1);
    }

    #[test]
    fn test_unlink_from_middle() {
        let store = counted_store(4);
        let a = create(&store, "a", 1);
        let b = create(&store, "b", 2);
        let c = create(&store, "c", 3);
        drop(b);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
        drop(a);
        drop(c);
        assert!(store.is_empty());
        assert_eq!(destroyed(&store), 3);
    }

    #[test]
    fn test_drop_store_reclaims_leaked_elements() {
        let store = counted_store(4);
        core::mem::forget(create(&store, "a", 1));
        core::mem::forget(create(&store, "b", 1));
        assert_eq!(store.len(), 2);
        drop(store);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn test_release_to_foreign_store() {
        let store1 = counted_store(1);
        let store2 = counted_store(1);
        let a = create(&store1, "a", 1);
        store2.release(a);
    }

    #[test]
    #[should_panic(expected = "too small")]
    fn test_pool_blocks_too_small() {
        let _store: CountedStore = Store::with_backing(
            testing::pool(Layout::new::<u8>(), 1),
            0,
        );
    }

    #[test]
    fn test_concurrent_create_is_unique() {
        const THREADS: usize = 8;
        let store = counted_store(THREADS);
        let barrier = Barrier::new(THREADS);

        let created = thread::scope(|s| {
            let handles = (0..THREADS)
                .map(|i| {
                    let store = &store;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        let value = u32::try_from(i).unwrap();
                        match store.insert_with("shared", |_, _| Ok(value)) {
                            Ok(r) => {
                                core::mem::forget(r);
                                true
                            }
                            Err(e) => {
                                assert!(e.is_duplicate_name());
                                false
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|created| *created)
                .count()
        });
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_find_and_release() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 1000;
        let store = counted_store(1);
        let owner = create(&store, "shared", 1);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        let r = store.find("shared").unwrap();
                        let d = r.duplicate_reference();
                        drop(r);
                        drop(d);
                    }
                });
            }
        });

        assert_eq!(owner.refs(), 1);
        drop(owner);
        assert_eq!(destroyed(&store), 1);
        assert!(store.is_empty());
    }
}
