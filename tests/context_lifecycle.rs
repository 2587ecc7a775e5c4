// tests/context_lifecycle.rs

//! Lifecycle coverage for the host context that does not need an X server.
//!
//! Display-dependent paths (open_display and everything behind it) are
//! exercised manually against a real server; CI runs headless, so these tests
//! stick to the registry surface, the capability-absence paths and the
//! close-without-open contracts.

use std::ffi::c_void;
use std::sync::Arc;
use std::thread;

use plugshim::context::HostContext;
use plugshim::registry::{ForeignHandle, InstanceId, InstanceState};
use plugshim::screensaver::NullBridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle {
    live_foreign_ptr: bool,
}

impl InstanceState for Handle {
    fn is_attached(&self) -> bool {
        self.live_foreign_ptr
    }
}

fn new_context() -> HostContext<Handle> {
    HostContext::with_bridge(Box::new(NullBridge))
}

#[test_log::test]
fn instance_lifecycle_through_the_context() {
    let context = new_context();

    let id = context.instances().generate_id();
    assert_eq!(id, InstanceId(10));
    assert_eq!(context.instances().get(id), None);

    context.instances().add(id, Handle { live_foreign_ptr: true });
    assert_eq!(
        context.instances().get(id),
        Some(Handle { live_foreign_ptr: true })
    );

    // Destroy exactly once; a second removal must be harmless.
    context.instances().remove(id);
    context.instances().remove(id);
    assert_eq!(context.instances().get(id), None);
}

#[test_log::test]
fn fallback_routing_finds_an_attached_instance() {
    let context = new_context();

    let detached = context.instances().generate_id();
    context
        .instances()
        .add(detached, Handle { live_foreign_ptr: false });
    assert_eq!(context.any_attached_instance(), None);

    let attached = context.instances().generate_id();
    context
        .instances()
        .add(attached, Handle { live_foreign_ptr: true });
    assert_eq!(
        context.any_attached_instance(),
        Some(Handle { live_foreign_ptr: true })
    );
}

#[test_log::test]
fn object_routing_survives_instance_removal() {
    let context = new_context();

    let id = context.instances().generate_id();
    context.instances().add(id, Handle { live_foreign_ptr: true });

    let object = ForeignHandle::from_ptr(0xa000 as *mut c_void);
    let owner = ForeignHandle::from_ptr(0xb000 as *mut c_void);
    context.objects().bind(object, owner);

    // The instance is gone, but callbacks for the object still route.
    context.instances().remove(id);
    assert_eq!(context.objects().lookup(object), Some(owner));

    context.objects().unbind(object);
    assert_eq!(context.objects().lookup(object), None);
}

#[test_log::test]
fn concurrent_id_generation_is_collision_free() {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 128;

    let context = Arc::new(new_context());
    let mut workers = Vec::new();
    for _ in 0..THREADS {
        let context = Arc::clone(&context);
        workers.push(thread::spawn(move || {
            (0..PER_THREAD)
                .map(|_| context.instances().generate_id())
                .collect::<Vec<_>>()
        }));
    }

    let mut ids: Vec<InstanceId> = workers
        .into_iter()
        .flat_map(|worker| worker.join().expect("worker panicked"))
        .collect();
    ids.sort();
    let total = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert!(ids.first().unwrap() >= &InstanceId(10));
}

#[test_log::test]
fn display_accessors_report_absence_before_open() {
    let context = new_context();
    assert!(context.with_display(|_| ()).is_none());
    // Closing with nothing open must not fault, repeatedly.
    for _ in 0..3 {
        context.close_display();
    }
}

#[test_log::test]
fn urandom_handle_is_exposed() {
    let context = new_context();
    let file = context.urandom().expect("/dev/urandom should open");
    assert!(file.metadata().is_ok());
}
