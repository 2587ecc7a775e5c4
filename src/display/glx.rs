// src/display/glx.rs

//! GLX capability detection.
//!
//! Resolves the 3D-context extension flags from the server's extension string
//! and looks up the optional extension entry points through
//! `glXGetProcAddressARB`. Every function pointer is independently nullable;
//! callers must check before use. Nothing here is fatal — a bare-bones GLX (or
//! none at all) just leaves the capabilities empty.

use libc::{c_char, c_int, c_uint};
use log::{error, info};
use std::ffi::CStr;
use x11::{glx, xlib};

pub type GlxCreateContextAttribsArbFn = unsafe extern "C" fn(
    dpy: *mut xlib::Display,
    config: glx::GLXFBConfig,
    share_context: glx::GLXContext,
    direct: xlib::Bool,
    attrib_list: *const c_int,
) -> glx::GLXContext;

pub type GlxBindTexImageExtFn =
    unsafe extern "C" fn(dpy: *mut xlib::Display, drawable: glx::GLXDrawable, buffer: c_int, attrib_list: *const c_int);

pub type GlxReleaseTexImageExtFn =
    unsafe extern "C" fn(dpy: *mut xlib::Display, drawable: glx::GLXDrawable, buffer: c_int);

pub type GlxGetVideoSyncSgiFn = unsafe extern "C" fn(count: *mut c_uint) -> c_int;

pub type GlxWaitVideoSyncSgiFn =
    unsafe extern "C" fn(divisor: c_int, remainder: c_int, count: *mut c_uint) -> c_int;

/// 3D-context capability flags and optional extension entry points.
///
/// The three booleans mirror the server-advertised extensions needed to build
/// modern (core/ES2) contexts; the function pointers are `None` whenever the
/// implementation does not export them.
#[derive(Debug, Default)]
pub struct GlxCapabilities {
    pub arb_create_context: bool,
    pub arb_create_context_profile: bool,
    pub ext_create_context_es2_profile: bool,
    pub create_context_attribs: Option<GlxCreateContextAttribsArbFn>,
    pub bind_tex_image: Option<GlxBindTexImageExtFn>,
    pub release_tex_image: Option<GlxReleaseTexImageExtFn>,
    pub get_video_sync: Option<GlxGetVideoSyncSgiFn>,
    pub wait_video_sync: Option<GlxWaitVideoSyncSgiFn>,
}

/// Extension flags parsed from a GLX extension string.
///
/// Exact token match, not substring match: `GLX_ARB_create_context_profile`
/// must not satisfy a query for `GLX_ARB_create_context`.
pub(crate) fn extension_flags(extension_list: &str) -> (bool, bool, bool) {
    let has = |name: &str| extension_list.split_whitespace().any(|ext| ext == name);
    (
        has("GLX_ARB_create_context"),
        has("GLX_ARB_create_context_profile"),
        has("GLX_EXT_create_context_es2_profile"),
    )
}

fn resolve<F>(name: &'static [u8]) -> Option<F> {
    debug_assert_eq!(name.last(), Some(&0), "symbol names must be NUL terminated");
    // SAFETY: glXGetProcAddressARB takes a NUL-terminated symbol name and the
    // returned pointer (if any) has the type the extension documents, which F
    // matches at each call site.
    unsafe {
        let ptr = glx::glXGetProcAddressARB(name.as_ptr());
        ptr.map(|p| std::mem::transmute_copy::<_, F>(&p))
    }
}

/// Logs the GLX protocol version. Diagnostics only; failure is non-fatal.
pub fn log_version(display: *mut xlib::Display) {
    let mut major: c_int = 0;
    let mut minor: c_int = 0;
    // SAFETY: valid display pointer, out-params point to stack storage.
    let ok = unsafe { glx::glXQueryVersion(display, &mut major, &mut minor) };
    if ok == 0 {
        error!("glXQueryVersion returned False");
    } else {
        info!("GLX version {}.{}", major, minor);
    }
}

/// Queries extension flags and resolves the optional entry points.
pub fn query(display: *mut xlib::Display, screen: c_int) -> GlxCapabilities {
    let mut caps = GlxCapabilities::default();

    // SAFETY: valid display and screen; the returned string is owned by Xlib
    // and only borrowed for the duration of the parse.
    let ext_str = unsafe { glx::glXQueryExtensionsString(display, screen) };
    if !ext_str.is_null() {
        let list = unsafe { CStr::from_ptr(ext_str as *const c_char) }.to_string_lossy();
        let (arb, profile, es2) = extension_flags(&list);
        caps.arb_create_context = arb;
        caps.arb_create_context_profile = profile;
        caps.ext_create_context_es2_profile = es2;
    }

    caps.create_context_attribs = resolve(b"glXCreateContextAttribsARB\0");
    caps.bind_tex_image = resolve(b"glXBindTexImageEXT\0");
    caps.release_tex_image = resolve(b"glXReleaseTexImageEXT\0");
    caps.get_video_sync = resolve(b"glXGetVideoSyncSGI\0");
    caps.wait_video_sync = resolve(b"glXWaitVideoSyncSGI\0");

    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_full_extension_list() {
        let list = "GLX_ARB_multisample GLX_ARB_create_context \
                    GLX_ARB_create_context_profile GLX_EXT_create_context_es2_profile";
        assert_eq!(extension_flags(list), (true, true, true));
    }

    #[test]
    fn flags_require_exact_tokens() {
        // The longer extension name must not satisfy the shorter query.
        let list = "GLX_ARB_create_context_profile";
        assert_eq!(extension_flags(list), (false, true, false));
    }

    #[test]
    fn empty_list_yields_no_flags() {
        assert_eq!(extension_flags(""), (false, false, false));
    }
}
