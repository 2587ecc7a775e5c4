// src/display/mod.rs

//! The display resource manager.
//!
//! [`DisplaySession`] owns everything tied to the single X connection: the
//! connection itself, the direct-rendering device node, GLX capabilities, the
//! two hardware-decode backends, the screensaver detection result, the shared
//! transparent cursor, the minimum usable screen geometry and the compositing
//! pixel formats. One session exists per host session, created by
//! [`DisplaySession::open`] and emptied by [`DisplaySession::close`]; the
//! recursive lock (and that lock's own resources) live and die with it.
//!
//! Everything in [`DisplayState`] is either fully resolved or explicitly
//! `None`/invalid — no partially-constructed state is observable outside the
//! open routine, which builds the whole state before the session is shared.

pub mod compositing;
pub mod connection;
pub mod geometry;
pub mod glx;

use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use x11::xlib;

use crate::config::Config;
use crate::hwdec::{VaapiBackend, VdpauBackend};
use crate::screensaver::{self, ScreenSaverKind, ScreensaverBridge};

use compositing::CompositingFormats;
use connection::Connection;
use glx::GlxCapabilities;

/// Render node opened best-effort for direct-rendering consumers.
const DRI_DEVICE: &str = "/dev/dri/card0";

/// Everything owned on behalf of the open display connection.
///
/// Valid only between a successful [`DisplaySession::open`] and the matching
/// [`DisplaySession::close`]. Raw handles in here must only be used while the
/// session lock is held.
#[derive(Debug)]
pub struct DisplayState {
    /// Direct-rendering device node; absence is tolerated.
    pub dri: Option<File>,
    /// 3D-context capability flags and optional extension entry points.
    pub glx: GlxCapabilities,
    /// VA-API backend; `None` when disabled or unavailable.
    pub vaapi: Option<VaapiBackend>,
    /// VDPAU backend; may exist with `available() == false` (incomplete
    /// function table, device still needs releasing at close).
    pub vdpau: Option<VdpauBackend>,
    /// Screensaver backends detected at open time.
    pub screensavers: ScreenSaverKind,
    /// Shared 1x1 transparent cursor, 0 if creation failed.
    transparent_cursor: xlib::Cursor,
    /// Minimum usable width across physical outputs (or config override).
    pub min_width: u32,
    /// Minimum usable height across physical outputs (or config override).
    pub min_height: u32,
    /// XRender formats; `None` when the extension is missing or disabled.
    pub compositing: Option<CompositingFormats>,
    // Declared last: the backends hold device handles bound to this
    // connection, so it must still be open when their drops run.
    connection: Connection,
}

impl DisplayState {
    /// Raw X display pointer. Only valid while the session lock is held and
    /// the session is open.
    #[inline]
    pub fn display(&self) -> *mut xlib::Display {
        self.connection.raw()
    }

    #[inline]
    pub fn screen(&self) -> libc::c_int {
        self.connection.screen()
    }

    #[inline]
    pub fn root(&self) -> xlib::Window {
        self.connection.root()
    }

    /// The shared transparent cursor, if one was built.
    pub fn transparent_cursor(&self) -> Option<xlib::Cursor> {
        (self.transparent_cursor != 0).then_some(self.transparent_cursor)
    }

    /// True when hardware decode is usable through at least one backend.
    pub fn hwdec_available(&self) -> bool {
        self.vaapi.is_some() || self.vdpau.as_ref().is_some_and(|v| v.available())
    }

    /// Releases everything acquired after the connection, in the mirror
    /// order of acquisition. Idempotent; each step tolerates its resource
    /// never having been acquired.
    fn release_resources(&mut self) {
        if let Some(mut vaapi) = self.vaapi.take() {
            vaapi.teardown();
        }
        if let Some(mut vdpau) = self.vdpau.take() {
            vdpau.teardown();
        }

        // Dropping the File closes the render node.
        self.dri = None;

        if self.transparent_cursor != 0 {
            let display = self.connection.raw();
            if !display.is_null() {
                // SAFETY: the cursor was created on this display, which is
                // still open; freed exactly once.
                unsafe {
                    xlib::XFreeCursor(display, self.transparent_cursor);
                }
            }
            self.transparent_cursor = 0;
        }

        self.compositing = None;
    }
}

impl Drop for DisplayState {
    fn drop(&mut self) {
        // Runs before the fields drop, so even a state that never went
        // through the session's close releases its device handles while the
        // connection is still open.
        self.release_resources();
    }
}

/// One open display session, guarded by a recursive lock.
///
/// The lock is recursive on purpose: the windowing and decode initialization
/// calls are synchronous and helpers invoked while the lock is already held
/// must be able to re-acquire it without deadlocking. The re-entrancy contract
/// is part of the interface — operations on [`DisplayState`] assume the caller
/// holds the session lock, and [`DisplaySession::lock`] is cheap to nest.
pub struct DisplaySession {
    state: ReentrantMutex<RefCell<DisplayState>>,
}

// SAFETY: the raw X/VA/VDPAU handles inside DisplayState are only reachable
// through the reentrant lock; Xlib calls on them are serialized by it.
unsafe impl Send for DisplaySession {}
unsafe impl Sync for DisplaySession {}

impl DisplaySession {
    /// Opens the windowing connection and acquires every display-wide
    /// resource.
    ///
    /// Only a failure to open the X connection is fatal, and it happens before
    /// any other acquisition, so the error path holds nothing. Every later
    /// step degrades to an absent capability instead of failing the routine.
    pub fn open(config: &Config, bridge: &mut dyn ScreensaverBridge) -> Result<Self> {
        // The only fatal acquisition, and nothing precedes it: failure here
        // unwinds with no resources held.
        let connection = Connection::new().context("can't open X display")?;

        if config.quirks.x_synchronize {
            connection.synchronize();
        }

        let display = connection.raw();
        let screen = connection.screen();
        let root = connection.root();

        // Direct-rendering device, best-effort.
        let dri = match OpenOptions::new().read(true).write(true).open(DRI_DEVICE) {
            Ok(file) => Some(file),
            Err(err) => {
                info!("{} not available: {}", DRI_DEVICE, err);
                None
            }
        };

        // Decode backends, independently gated and independently allowed to
        // fail.
        let mut vaapi = None;
        let mut vdpau = None;
        if config.hwdec.enabled {
            if config.hwdec.vaapi {
                vaapi = VaapiBackend::negotiate(display);
            }
            if config.hwdec.vdpau {
                vdpau = VdpauBackend::negotiate(display, screen);
            }
        }

        // GLX diagnostics and capabilities.
        glx::log_version(display);
        let glx = glx::query(display, screen);

        // Screensaver bridge and backend detection.
        bridge.connect();
        let screensavers = bridge.detect(display);
        screensaver::log_detected(screensavers);

        let transparent_cursor = create_transparent_cursor(display, root);

        // Minimum geometry; a config override wins over detection.
        let sizes = geometry::probe_crtc_sizes(display, root);
        let (mut min_width, mut min_height) = geometry::minimum_output_geometry(sizes);
        if let Some(width) = config.width_override() {
            min_width = width;
        }
        if let Some(height) = config.height_override() {
            min_height = height;
        }
        info!("minimum screen geometry {}x{}", min_width, min_height);

        let compositing = compositing::query(display, config.compositing.enable_xrender);

        Ok(DisplaySession {
            state: ReentrantMutex::new(RefCell::new(DisplayState {
                dri,
                glx,
                vaapi,
                vdpau,
                screensavers,
                transparent_cursor,
                min_width,
                min_height,
                compositing,
                connection,
            })),
        })
    }

    /// Acquires the session lock. Re-entrant: a thread already holding the
    /// lock may call this again from nested helpers.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<DisplayState>> {
        self.state.lock()
    }

    /// Releases every acquired resource in the mirror order of
    /// [`DisplaySession::open`]. Each step tolerates its resource never
    /// having been acquired.
    ///
    /// The connection itself (and the lock) go when the last handle to the
    /// session drops, which the caller does right after this returns; a
    /// concurrent reader holding the session keeps the connection open until
    /// it finishes.
    pub fn close(&self, bridge: &mut dyn ScreensaverBridge) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        bridge.disconnect();
        state.release_resources();
    }
}

#[cfg(test)]
impl DisplayState {
    /// State with no server behind it, for lifecycle tests on headless
    /// hosts.
    pub(crate) fn detached(vaapi: Option<VaapiBackend>, vdpau: Option<VdpauBackend>) -> Self {
        DisplayState {
            dri: None,
            glx: GlxCapabilities::default(),
            vaapi,
            vdpau,
            screensavers: ScreenSaverKind::empty(),
            transparent_cursor: 0,
            min_width: geometry::FALLBACK_GEOMETRY.0,
            min_height: geometry::FALLBACK_GEOMETRY.1,
            compositing: None,
            connection: Connection::disconnected(),
        }
    }
}

#[cfg(test)]
impl DisplaySession {
    pub(crate) fn from_state(state: DisplayState) -> Self {
        DisplaySession {
            state: ReentrantMutex::new(RefCell::new(state)),
        }
    }
}

/// Builds the shared 1x1 transparent cursor from a single zero pixel.
///
/// The intermediate pixmap is released immediately; the cursor keeps its own
/// copy. Returns 0 when the server refuses the pixmap.
fn create_transparent_cursor(display: *mut xlib::Display, root: xlib::Window) -> xlib::Cursor {
    let pixel_data: [libc::c_char; 1] = [0];
    // SAFETY: display and root are live; the pixmap is freed before returning
    // and the XColor is a plain out-struct the server never keeps.
    unsafe {
        let pixmap = xlib::XCreateBitmapFromData(display, root, pixel_data.as_ptr(), 1, 1);
        if pixmap == 0 {
            warn!("can't create pixmap for the transparent cursor");
            return 0;
        }
        let mut color: xlib::XColor = std::mem::zeroed();
        let cursor =
            xlib::XCreatePixmapCursor(display, pixmap, pixmap, &mut color, &mut color, 0, 0);
        xlib::XFreePixmap(display, pixmap);
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwdec::vaapi::{VaDisplay, VaStatus, VaapiFunctions, VA_STATUS_SUCCESS};
    use crate::screensaver::NullBridge;
    use libc::c_char;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe extern "C" fn stub_get_display(_dpy: *mut xlib::Display) -> VaDisplay {
        0x1 as VaDisplay
    }

    unsafe extern "C" fn stub_initialize(
        _dpy: VaDisplay,
        _major: *mut libc::c_int,
        _minor: *mut libc::c_int,
    ) -> VaStatus {
        VA_STATUS_SUCCESS
    }

    unsafe extern "C" fn null_string(_dpy: VaDisplay) -> *const c_char {
        std::ptr::null()
    }

    unsafe extern "C" fn null_error_str(_status: VaStatus) -> *const c_char {
        std::ptr::null()
    }

    fn vaapi_table(terminate: unsafe extern "C" fn(VaDisplay) -> VaStatus) -> VaapiFunctions {
        VaapiFunctions {
            get_display: stub_get_display,
            initialize: stub_initialize,
            terminate,
            query_vendor_string: null_string,
            error_str: null_error_str,
        }
    }

    #[test]
    fn dropping_state_without_close_releases_the_backends() {
        static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn counting_terminate(_dpy: VaDisplay) -> VaStatus {
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
            VA_STATUS_SUCCESS
        }

        let vaapi = VaapiBackend::with_table(vaapi_table(counting_terminate), 0x1 as VaDisplay);
        let state = DisplayState::detached(Some(vaapi), None);
        // No close: the state's own drop must still release the device while
        // the connection field is alive.
        drop(state);
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_then_drop_releases_once() {
        static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn counting_terminate(_dpy: VaDisplay) -> VaStatus {
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
            VA_STATUS_SUCCESS
        }

        let vaapi = VaapiBackend::with_table(vaapi_table(counting_terminate), 0x1 as VaDisplay);
        let session = DisplaySession::from_state(DisplayState::detached(Some(vaapi), None));
        let mut bridge = NullBridge;
        session.close(&mut bridge);
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 1);
        drop(session);
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 1);
    }
}
