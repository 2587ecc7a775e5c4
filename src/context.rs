// src/context.rs

//! The process-wide context object.
//!
//! The original shim kept this state in load/unload-hook globals;
//! [`HostContext`] makes the lifecycle explicit instead — construct one at
//! process (or session) start, pass it by reference to every operation, drop
//! it at the end. Tests construct as many as they like.
//!
//! `H` is the shim's instance-state handle type: `Copy`, non-owning, and (for
//! fallback routing) answering [`crate::registry::InstanceState::is_attached`].

use anyhow::Result;
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::fs::File;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::display::{DisplaySession, DisplayState};
use crate::registry::{InstanceRegistry, InstanceState, ObjectRegistry};
use crate::screensaver::{ScreensaverBridge, XRootProbe};
use crate::text_layout::{PangoContext, PangoFontMap, TextLayout};

/// Registries, shared text-layout context, randomness source and the display
/// session for one plugin host process.
pub struct HostContext<H> {
    instances: InstanceRegistry<H>,
    objects: ObjectRegistry,
    text_layout: OnceCell<TextLayout>,
    urandom: Option<File>,
    // Display slot and the screensaver bridge share call sites
    // (open/close) but deliberately not a lock with the registries. The slot
    // mutex only guards the Arc; it is never held while session state is
    // accessed, so it cannot shadow the session's re-entrant lock.
    display: Mutex<Option<Arc<DisplaySession>>>,
    bridge: Mutex<Box<dyn ScreensaverBridge>>,
}

impl<H: Copy> HostContext<H> {
    /// Builds a context with the default X-side screensaver probe.
    pub fn new() -> Self {
        Self::with_bridge(Box::new(XRootProbe::new()))
    }

    /// Builds a context with a caller-supplied screensaver-inhibition
    /// collaborator.
    pub fn with_bridge(bridge: Box<dyn ScreensaverBridge>) -> Self {
        let urandom = match File::open("/dev/urandom") {
            Ok(file) => Some(file),
            Err(err) => {
                // Tolerated; consumers that need randomness check for
                // absence, same as the rest of the capability surface.
                warn!("can't open /dev/urandom: {}", err);
                None
            }
        };

        HostContext {
            instances: InstanceRegistry::new(),
            objects: ObjectRegistry::new(),
            text_layout: OnceCell::new(),
            urandom,
            display: Mutex::new(None),
            bridge: Mutex::new(bridge),
        }
    }

    /// The system randomness source, if it could be opened.
    pub fn urandom(&self) -> Option<&File> {
        self.urandom.as_ref()
    }

    /// The instance registry.
    #[inline]
    pub fn instances(&self) -> &InstanceRegistry<H> {
        &self.instances
    }

    /// The foreign-object registry.
    #[inline]
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    fn text_layout(&self) -> Result<&TextLayout> {
        // Built once, on first use; shared read-only afterwards.
        self.text_layout.get_or_try_init(TextLayout::new)
    }

    /// Shared text-layout context handle.
    pub fn layout_context(&self) -> Result<*mut PangoContext> {
        Ok(self.text_layout()?.layout_context())
    }

    /// Shared font-map handle.
    pub fn font_map(&self) -> Result<*mut PangoFontMap> {
        Ok(self.text_layout()?.font_map())
    }

    /// Opens the display session. Called once per host session.
    ///
    /// Only a failure to open the X connection is reported as an error; every
    /// optional capability that could not be acquired shows up as an absent
    /// flag on the session state instead. A second call while a session is
    /// open is a logged no-op.
    pub fn open_display(&self, config: &Config) -> Result<()> {
        let mut slot = self.display.lock().expect("display slot lock poisoned");
        if slot.is_some() {
            warn!("open_display called while a display session is already open");
            return Ok(());
        }

        let mut bridge = self.bridge.lock().expect("bridge lock poisoned");
        let session = DisplaySession::open(config, bridge.as_mut())?;
        *slot = Some(Arc::new(session));
        info!("display session open");
        Ok(())
    }

    /// Closes the display session, releasing every resource in the mirror
    /// order of acquisition. No-op when no session is open. The connection
    /// itself closes when the last in-flight [`HostContext::with_display`]
    /// reader lets go of the session, normally right here.
    pub fn close_display(&self) {
        let session = {
            let mut slot = self.display.lock().expect("display slot lock poisoned");
            slot.take()
        };
        match session {
            Some(session) => {
                let mut bridge = self.bridge.lock().expect("bridge lock poisoned");
                session.close(bridge.as_mut());
                info!("display session closed");
            }
            None => {
                warn!("close_display called without an open display session");
            }
        }
    }

    /// Runs `f` with the display state under the session's recursive lock.
    ///
    /// Returns `None` when no session is open. Nested calls from within `f`
    /// are allowed (the session lock is re-entrant, and the slot mutex is
    /// released before `f` runs) but must not overlap a `borrow_mut` of the
    /// same state. A `close_display` racing with `f` completes its teardown,
    /// but the connection stays open until `f` returns.
    pub fn with_display<R>(&self, f: impl FnOnce(&DisplayState) -> R) -> Option<R> {
        let session = {
            let slot = self.display.lock().expect("display slot lock poisoned");
            Arc::clone(slot.as_ref()?)
        };
        let guard = session.lock();
        let state = guard.borrow();
        Some(f(&state))
    }
}

impl<H: Copy + InstanceState> HostContext<H> {
    /// Fallback routing: some instance that still has a live foreign
    /// plugin-instance pointer, if any. See
    /// [`InstanceRegistry::any_attached`] for the (lack of) ordering
    /// guarantee.
    pub fn any_attached_instance(&self) -> Option<H> {
        self.instances.any_attached()
    }
}

impl<H: Copy> Default for HostContext<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Drop for HostContext<H> {
    fn drop(&mut self) {
        // A session left open at teardown still needs its mirror-order
        // cleanup; the registries and the text-layout pair drop afterwards.
        if let Ok(mut slot) = self.display.lock() {
            if let Some(session) = slot.take() {
                warn!("host context dropped with an open display session");
                if let Ok(mut bridge) = self.bridge.lock() {
                    session.close(bridge.as_mut());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ForeignHandle, InstanceId};
    use crate::screensaver::NullBridge;

    #[test]
    fn context_is_shareable_across_threads() {
        fn assert_sync<T: Sync + Send>(_: &T) {}
        let context: HostContext<ForeignHandle> = HostContext::with_bridge(Box::new(NullBridge));
        assert_sync(&context);
    }

    #[test]
    fn urandom_is_available_on_this_host() {
        let context: HostContext<ForeignHandle> = HostContext::with_bridge(Box::new(NullBridge));
        assert!(context.urandom().is_some());
    }

    #[test]
    fn registries_are_reachable_and_independent() {
        let context: HostContext<ForeignHandle> = HostContext::with_bridge(Box::new(NullBridge));
        let id = context.instances().generate_id();
        assert_eq!(id, InstanceId(10));

        let object = ForeignHandle::from_ptr(0x10 as *mut u8);
        let owner = ForeignHandle::from_ptr(0x20 as *mut u8);
        context.objects().bind(object, owner);
        assert_eq!(context.objects().lookup(object), Some(owner));
        // Nothing was registered as an instance.
        assert!(context.instances().is_empty());
    }

    #[test]
    fn nested_with_display_reenters_the_session_lock() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let context: HostContext<ForeignHandle> = HostContext::with_bridge(Box::new(NullBridge));
        *context.display.lock().unwrap() = Some(Arc::new(DisplaySession::from_state(
            DisplayState::detached(None, None),
        )));

        // Run off-thread with a deadline; a regression here deadlocks rather
        // than failing an assertion.
        let context = Arc::new(context);
        let (tx, rx) = mpsc::channel();
        let worker = {
            let context = Arc::clone(&context);
            thread::spawn(move || {
                let nested = context.with_display(|outer| {
                    context.with_display(|inner| inner.min_width + outer.min_height)
                });
                let _ = tx.send(nested);
            })
        };

        let nested = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("nested display access did not complete");
        assert_eq!(nested, Some(Some(600)));
        worker.join().unwrap();
    }

    #[test]
    fn close_display_without_open_is_a_noop() {
        let context: HostContext<ForeignHandle> = HostContext::with_bridge(Box::new(NullBridge));
        context.close_display();
        context.close_display();
        assert!(context.with_display(|_| ()).is_none());
    }
}
