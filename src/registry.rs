// src/registry.rs

//! Thread-safe bookkeeping for plugin instances and foreign callback objects.
//!
//! Two independent registries live here, each behind its own mutex:
//!
//! - [`InstanceRegistry`] maps process-unique [`InstanceId`]s to handles of
//!   collaborator-owned instance state, and hands out fresh ids.
//! - [`ObjectRegistry`] maps foreign callback-object handles to the handle of
//!   the instance that owns them, so asynchronous foreign callbacks can be
//!   routed back to the right instance.
//!
//! The locks are never held simultaneously; instance bookkeeping and
//! object-callback routing must not contend with each other. Neither registry
//! owns anything it stores: a handle records an association, the collaborator
//! that created the pointee remains responsible for removing the association
//! before destroying it.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Mutex;

/// First id handed out by [`InstanceRegistry::generate_id`].
const FIRST_INSTANCE_ID: i32 = 10;

/// Process-unique identifier of one embedded-plugin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub i32);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning, address-keyed handle to a collaborator-owned foreign object.
///
/// The registry only ever compares and hashes the address; it never
/// dereferences it. Callers keep the pointee alive for as long as the
/// association exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle(usize);

impl ForeignHandle {
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        ForeignHandle(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl<T> From<*mut T> for ForeignHandle {
    fn from(ptr: *mut T) -> Self {
        ForeignHandle::from_ptr(ptr)
    }
}

/// Implemented by instance-state handles stored in the [`InstanceRegistry`].
///
/// `is_attached` answers "does this instance still have a live foreign
/// plugin-instance pointer" — the predicate behind
/// [`InstanceRegistry::any_attached`]. The registry itself has no idea what an
/// instance looks like; the shim's instance type provides the answer.
pub trait InstanceState {
    fn is_attached(&self) -> bool;
}

impl InstanceState for *mut c_void {
    fn is_attached(&self) -> bool {
        !self.is_null()
    }
}

struct InstanceTable<H> {
    next_id: i32,
    entries: HashMap<InstanceId, H>,
}

/// Registry of live plugin instances, plus the id generator.
///
/// All operations take one short critical section on the registry's own lock.
/// Handles are `Copy` so lookups return a value and never lend out the map.
pub struct InstanceRegistry<H> {
    table: Mutex<InstanceTable<H>>,
}

impl<H: Copy> InstanceRegistry<H> {
    pub fn new() -> Self {
        InstanceRegistry {
            table: Mutex::new(InstanceTable {
                next_id: FIRST_INSTANCE_ID,
                entries: HashMap::new(),
            }),
        }
    }

    /// Returns a fresh, strictly increasing instance id.
    ///
    /// No two calls ever return the same value for the lifetime of this
    /// registry, regardless of how many threads call concurrently.
    pub fn generate_id(&self) -> InstanceId {
        let mut table = self.table.lock().expect("instance registry lock poisoned");
        let id = InstanceId(table.next_id);
        table.next_id += 1;
        id
    }

    /// Inserts or replaces the mapping for `id`.
    pub fn add(&self, id: InstanceId, handle: H) {
        let mut table = self.table.lock().expect("instance registry lock poisoned");
        table.entries.insert(id, handle);
    }

    /// Looks up the handle registered for `id`, if any.
    pub fn get(&self, id: InstanceId) -> Option<H> {
        let table = self.table.lock().expect("instance registry lock poisoned");
        table.entries.get(&id).copied()
    }

    /// Removes the mapping for `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: InstanceId) {
        let mut table = self.table.lock().expect("instance registry lock poisoned");
        table.entries.remove(&id);
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        let table = self.table.lock().expect("instance registry lock poisoned");
        table.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: Copy + InstanceState> InstanceRegistry<H> {
    /// Returns an arbitrary instance that still has a live foreign
    /// plugin-instance pointer, for fallback routing when the caller has no
    /// specific instance context.
    ///
    /// The scan keeps the last qualifying entry seen during iteration, and
    /// `HashMap` iteration order is unspecified — callers get *some* attached
    /// instance, not the most recently created one. Nothing in this crate
    /// depends on which entry wins.
    pub fn any_attached(&self) -> Option<H> {
        let table = self.table.lock().expect("instance registry lock poisoned");
        let mut result = None;
        for handle in table.entries.values() {
            if handle.is_attached() {
                result = Some(*handle);
            }
        }
        result
    }
}

impl<H: Copy> Default for InstanceRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry routing foreign callback objects back to their owning instance.
///
/// Bindings are independent of the instance registry: an object may be bound
/// to an instance handle that was never registered there (or has since been
/// removed) and the binding still resolves. Separate lock from
/// [`InstanceRegistry`] so object-callback routing never contends with
/// instance bookkeeping.
pub struct ObjectRegistry {
    bindings: Mutex<HashMap<ForeignHandle, ForeignHandle>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        ObjectRegistry {
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Records that `object` is owned by `instance`. Replaces any previous
    /// binding for the same object.
    pub fn bind(&self, object: ForeignHandle, instance: ForeignHandle) {
        let mut bindings = self.bindings.lock().expect("object registry lock poisoned");
        bindings.insert(object, instance);
    }

    /// Returns the instance that owns `object`, if a binding exists.
    pub fn lookup(&self, object: ForeignHandle) -> Option<ForeignHandle> {
        let bindings = self.bindings.lock().expect("object registry lock poisoned");
        bindings.get(&object).copied()
    }

    /// Drops the binding for `object`. Unbinding an absent object is a no-op.
    pub fn unbind(&self, object: ForeignHandle) {
        let mut bindings = self.bindings.lock().expect("object registry lock poisoned");
        bindings.remove(&object);
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Test stand-in for the shim's instance-state handle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FakeInstance {
        tag: u32,
        attached: bool,
    }

    impl InstanceState for FakeInstance {
        fn is_attached(&self) -> bool {
            self.attached
        }
    }

    #[test]
    fn get_returns_most_recent_insert() {
        let registry = InstanceRegistry::new();
        let id = registry.generate_id();
        registry.add(id, FakeInstance { tag: 1, attached: true });
        registry.add(id, FakeInstance { tag: 2, attached: true });
        assert_eq!(registry.get(id).map(|h| h.tag), Some(2));

        registry.remove(id);
        assert_eq!(registry.get(id), None);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let registry: InstanceRegistry<FakeInstance> = InstanceRegistry::new();
        registry.remove(InstanceId(1234));
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_start_at_documented_value() {
        let registry: InstanceRegistry<FakeInstance> = InstanceRegistry::new();
        assert_eq!(registry.generate_id(), InstanceId(10));
        assert_eq!(registry.generate_id(), InstanceId(11));
    }

    #[test]
    fn concurrent_id_generation_yields_distinct_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let registry: Arc<InstanceRegistry<FakeInstance>> = Arc::new(InstanceRegistry::new());
        let mut workers = Vec::new();
        for _ in 0..THREADS {
            let registry = Arc::clone(&registry);
            workers.push(thread::spawn(move || {
                (0..PER_THREAD).map(|_| registry.generate_id()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<InstanceId> = workers
            .into_iter()
            .flat_map(|w| w.join().expect("worker panicked"))
            .collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before, "generated ids must be pairwise distinct");
        assert!(all.iter().all(|id| id.0 >= 10));
    }

    #[test]
    fn any_attached_skips_detached_instances() {
        let registry = InstanceRegistry::new();
        for attached in [false, true, false] {
            let id = registry.generate_id();
            registry.add(id, FakeInstance { tag: id.0 as u32, attached });
        }
        let found = registry.any_attached().expect("one instance is attached");
        assert!(found.attached);
        assert_eq!(found.tag, 11);
    }

    #[test]
    fn any_attached_on_empty_or_detached_registry_is_none() {
        let registry: InstanceRegistry<FakeInstance> = InstanceRegistry::new();
        assert_eq!(registry.any_attached(), None);

        let id = registry.generate_id();
        registry.add(id, FakeInstance { tag: 0, attached: false });
        assert_eq!(registry.any_attached(), None);
    }

    #[test]
    fn object_bindings_are_independent_of_instance_registry() {
        let instances: InstanceRegistry<FakeInstance> = InstanceRegistry::new();
        let objects = ObjectRegistry::new();

        let mut object_storage = 0u8;
        let mut instance_storage = 0u8;
        let object = ForeignHandle::from_ptr(&mut object_storage as *mut u8);
        let owner = ForeignHandle::from_ptr(&mut instance_storage as *mut u8);

        // The owner was never registered as an instance; the binding must
        // still resolve.
        objects.bind(object, owner);
        assert!(instances.is_empty());
        assert_eq!(objects.lookup(object), Some(owner));

        objects.unbind(object);
        assert_eq!(objects.lookup(object), None);

        // Unbinding again is a no-op.
        objects.unbind(object);
    }

    #[test]
    fn bind_replaces_previous_owner() {
        let objects = ObjectRegistry::new();
        let object = ForeignHandle::from_ptr(0x1000 as *mut u8);
        let first = ForeignHandle::from_ptr(0x2000 as *mut u8);
        let second = ForeignHandle::from_ptr(0x3000 as *mut u8);

        objects.bind(object, first);
        objects.bind(object, second);
        assert_eq!(objects.lookup(object), Some(second));
    }

    #[test]
    fn foreign_handle_round_trips_pointers() {
        let mut value = 7u32;
        let ptr = &mut value as *mut u32;
        let handle = ForeignHandle::from_ptr(ptr);
        assert_eq!(handle.as_ptr::<u32>(), ptr);
    }
}
