// src/hwdec/vaapi.rs

//! VA-API backend negotiation.
//!
//! libva exports its entry points as plain symbols (no get-proc indirection),
//! so negotiation is: load `libva-x11`, resolve the five required symbols,
//! `vaGetDisplay` on the open X connection, `vaInitialize`. Any failure along
//! the way leaves the backend unavailable and is logged at an informational
//! level — no VA-API is a normal outcome.

use libc::{c_char, c_int};
use libloading::Library;
use log::{error, info};
use std::ffi::{c_void, CStr};
use std::ptr;
use x11::xlib;

use super::load_first;

pub type VaDisplay = *mut c_void;
pub type VaStatus = c_int;

pub const VA_STATUS_SUCCESS: VaStatus = 0;

pub type VaGetDisplayFn = unsafe extern "C" fn(dpy: *mut xlib::Display) -> VaDisplay;
pub type VaInitializeFn =
    unsafe extern "C" fn(dpy: VaDisplay, major: *mut c_int, minor: *mut c_int) -> VaStatus;
pub type VaTerminateFn = unsafe extern "C" fn(dpy: VaDisplay) -> VaStatus;
pub type VaQueryVendorStringFn = unsafe extern "C" fn(dpy: VaDisplay) -> *const c_char;
pub type VaErrorStrFn = unsafe extern "C" fn(status: VaStatus) -> *const c_char;

const SONAMES: &[&str] = &["libva-x11.so.2", "libva-x11.so.1", "libva-x11.so"];

/// The libva entry points this shim needs. All five are required before the
/// device is even attempted.
#[derive(Clone, Copy)]
pub struct VaapiFunctions {
    pub get_display: VaGetDisplayFn,
    pub initialize: VaInitializeFn,
    pub terminate: VaTerminateFn,
    pub query_vendor_string: VaQueryVendorStringFn,
    pub error_str: VaErrorStrFn,
}

impl std::fmt::Debug for VaapiFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaapiFunctions").finish_non_exhaustive()
    }
}

/// An initialized VA-API device bound to the display connection.
///
/// Existence implies availability: negotiation only yields a backend once the
/// device initialized and the full function set resolved.
#[derive(Debug)]
pub struct VaapiBackend {
    // Keeps the resolved symbols valid. Dropped last by field order.
    _library: Library,
    functions: VaapiFunctions,
    va_display: VaDisplay,
}

// SAFETY: the VA display handle is only touched under the display session's
// recursive lock; libva itself serializes per-display access.
unsafe impl Send for VaapiBackend {}

impl VaapiBackend {
    /// Attempts to bring up VA-API on the open X connection.
    ///
    /// Returns `None` (logged, not escalated) when the library is absent, a
    /// symbol is missing, or device initialization fails.
    pub fn negotiate(display: *mut xlib::Display) -> Option<Self> {
        let library = load_first(SONAMES)?;
        let functions = resolve_functions(&library)?;
        let va_display = initialize_device(&functions, display)?;

        Some(VaapiBackend {
            _library: library,
            functions,
            va_display,
        })
    }

    /// The VA display handle for decode consumers.
    #[inline]
    pub fn va_display(&self) -> VaDisplay {
        self.va_display
    }

    /// The resolved libva entry points.
    #[inline]
    pub fn functions(&self) -> &VaapiFunctions {
        &self.functions
    }

    /// Terminates the VA device. Tolerates being called on an already
    /// torn-down backend.
    pub fn teardown(&mut self) {
        if !self.va_display.is_null() {
            // SAFETY: va_display came from vaGetDisplay and is terminated
            // exactly once; the library is still loaded.
            unsafe {
                (self.functions.terminate)(self.va_display);
            }
            self.va_display = ptr::null_mut();
        }
    }
}

impl Drop for VaapiBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Obtains the VA display for the X connection and initializes the device.
///
/// A display that `vaInitialize` refuses is still a live handle and gets
/// terminated here before the backend is reported absent; a broken driver
/// must not leak one native display per open attempt.
fn initialize_device(
    functions: &VaapiFunctions,
    display: *mut xlib::Display,
) -> Option<VaDisplay> {
    // SAFETY: the entry points come from a loaded libva; the X display is
    // open and outlives the VA display.
    unsafe {
        let va_display = (functions.get_display)(display);
        if va_display.is_null() {
            info!("vaGetDisplay returned null, no VA-API available");
            return None;
        }

        let mut major: c_int = 0;
        let mut minor: c_int = 0;
        let status = (functions.initialize)(va_display, &mut major, &mut minor);
        if status != VA_STATUS_SUCCESS {
            info!(
                "failed to initialize VA device, {}, {}",
                status,
                describe_status(functions.error_str, status)
            );
            (functions.terminate)(va_display);
            info!("no VA-API available");
            return None;
        }

        info!("libva version {}.{}", major, minor);
        let vendor = (functions.query_vendor_string)(va_display);
        if !vendor.is_null() {
            info!(
                "libva driver vendor: {}",
                CStr::from_ptr(vendor).to_string_lossy()
            );
        }

        Some(va_display)
    }
}

fn resolve_functions(library: &Library) -> Option<VaapiFunctions> {
    // Resolution failures are logged individually; a single missing symbol
    // invalidates the backend.
    let mut missing = false;

    macro_rules! sym {
        ($name:literal, $ty:ty) => {
            // SAFETY: the requested type matches the libva prototype for the
            // named symbol.
            match unsafe { library.get::<$ty>($name) } {
                Ok(symbol) => Some(*symbol),
                Err(_) => {
                    error!(
                        "can't resolve VA-API symbol {}",
                        String::from_utf8_lossy(&$name[..$name.len() - 1])
                    );
                    missing = true;
                    None
                }
            }
        };
    }

    let get_display = sym!(b"vaGetDisplay\0", VaGetDisplayFn);
    let initialize = sym!(b"vaInitialize\0", VaInitializeFn);
    let terminate = sym!(b"vaTerminate\0", VaTerminateFn);
    let query_vendor_string = sym!(b"vaQueryVendorString\0", VaQueryVendorStringFn);
    let error_str = sym!(b"vaErrorStr\0", VaErrorStrFn);

    if missing {
        info!("essential VA-API symbols missing, no VA-API available");
        return None;
    }

    Some(VaapiFunctions {
        get_display: get_display?,
        initialize: initialize?,
        terminate: terminate?,
        query_vendor_string: query_vendor_string?,
        error_str: error_str?,
    })
}

#[cfg(test)]
impl VaapiBackend {
    /// A backend over a caller-supplied entry-point table, with the current
    /// process standing in for the vendor library.
    pub(crate) fn with_table(functions: VaapiFunctions, va_display: VaDisplay) -> Self {
        VaapiBackend {
            _library: Library::from(libloading::os::unix::Library::this()),
            functions,
            va_display,
        }
    }
}

fn describe_status(error_str: VaErrorStrFn, status: VaStatus) -> String {
    // SAFETY: vaErrorStr returns a static string for every status value.
    let ptr = unsafe { error_str(status) };
    if ptr.is_null() {
        String::from("unknown VA status")
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe extern "C" fn stub_get_display(_dpy: *mut xlib::Display) -> VaDisplay {
        0x1 as VaDisplay
    }

    unsafe extern "C" fn null_get_display(_dpy: *mut xlib::Display) -> VaDisplay {
        ptr::null_mut()
    }

    unsafe extern "C" fn failing_initialize(
        _dpy: VaDisplay,
        _major: *mut c_int,
        _minor: *mut c_int,
    ) -> VaStatus {
        -1
    }

    unsafe extern "C" fn null_vendor(_dpy: VaDisplay) -> *const c_char {
        ptr::null()
    }

    unsafe extern "C" fn null_error_str(_status: VaStatus) -> *const c_char {
        ptr::null()
    }

    fn table(terminate: VaTerminateFn) -> VaapiFunctions {
        VaapiFunctions {
            get_display: stub_get_display,
            initialize: failing_initialize,
            terminate,
            query_vendor_string: null_vendor,
            error_str: null_error_str,
        }
    }

    #[test]
    fn failed_initialize_terminates_the_va_display() {
        static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn counting_terminate(_dpy: VaDisplay) -> VaStatus {
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
            VA_STATUS_SUCCESS
        }

        assert!(initialize_device(&table(counting_terminate), ptr::null_mut()).is_none());
        assert_eq!(
            TERMINATIONS.load(Ordering::SeqCst),
            1,
            "a display vaInitialize refused must still be terminated"
        );
    }

    #[test]
    fn null_va_display_is_absent_without_terminate() {
        static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn counting_terminate(_dpy: VaDisplay) -> VaStatus {
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
            VA_STATUS_SUCCESS
        }

        let mut functions = table(counting_terminate);
        functions.get_display = null_get_display;
        assert!(initialize_device(&functions, ptr::null_mut()).is_none());
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn teardown_terminates_exactly_once() {
        static TERMINATIONS: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn counting_terminate(_dpy: VaDisplay) -> VaStatus {
            TERMINATIONS.fetch_add(1, Ordering::SeqCst);
            VA_STATUS_SUCCESS
        }

        let mut backend = VaapiBackend::with_table(table(counting_terminate), 0x1 as VaDisplay);
        backend.teardown();
        backend.teardown();
        drop(backend);
        assert_eq!(TERMINATIONS.load(Ordering::SeqCst), 1);
    }
}
