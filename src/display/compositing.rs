// src/display/compositing.rs

//! XRender-based 2D compositing formats.
//!
//! When the server has the Render extension and configuration allows it, the
//! two standard pixel formats every compositing path needs are resolved once
//! at open time: opaque 24-bit RGB and alpha-blended 32-bit ARGB.

use libc::c_int;
use log::info;
use x11::{xlib, xrender};

/// The standard pixel-format pair. Exists only while the display session is
/// open; both pointers are owned by Xlib and must not be freed.
#[derive(Debug)]
pub struct CompositingFormats {
    pub rgb24: *mut xrender::XRenderPictFormat,
    pub argb32: *mut xrender::XRenderPictFormat,
}

/// Queries XRender and resolves the standard formats.
///
/// Returns `None` when the extension is missing, disabled by configuration, or
/// either standard format cannot be resolved. Degraded capability, never an
/// error.
pub fn query(display: *mut xlib::Display, enabled_by_config: bool) -> Option<CompositingFormats> {
    let mut event_base: c_int = 0;
    let mut error_base: c_int = 0;

    // SAFETY: valid display, out-params point to stack storage.
    let present =
        unsafe { xrender::XRenderQueryExtension(display, &mut event_base, &mut error_base) } != 0;

    if !present {
        info!("no XRender available");
        return None;
    }
    info!("found XRender");

    if !enabled_by_config {
        info!("XRender is disabled");
        return None;
    }

    // SAFETY: extension verified present; standard format lookups are pure
    // queries returning Xlib-owned descriptors.
    let (rgb24, argb32) = unsafe {
        (
            xrender::XRenderFindStandardFormat(display, xrender::PictStandardRGB24),
            xrender::XRenderFindStandardFormat(display, xrender::PictStandardARGB32),
        )
    };

    if rgb24.is_null() || argb32.is_null() {
        info!("XRender present but standard formats unavailable");
        return None;
    }

    Some(CompositingFormats { rgb24, argb32 })
}
