// src/text_layout.rs

//! Shared Pango text-layout context.
//!
//! One FT2 font map and one layout context derived from it exist per
//! [`crate::context::HostContext`]; both are built on first use and unref'd
//! when the context goes away. This module only owns the pair of handles —
//! actual text layout happens in the collaborator that consumes them.
//!
//! No per-call synchronization is done here: the handles are immutable after
//! construction from this crate's perspective, and thread-safety of concurrent
//! layout calls is Pango's contract, not ours.

use anyhow::{anyhow, Result};
use log::debug;
use std::ffi::c_void;

/// Opaque `PangoFontMap`.
#[repr(C)]
pub struct PangoFontMap {
    _opaque: [u8; 0],
}

/// Opaque `PangoContext`.
#[repr(C)]
pub struct PangoContext {
    _opaque: [u8; 0],
}

// Minimal pangoft2/gobject surface; linked via build.rs. No maintained
// pangoft2 binding exists, and three entry points do not justify one.
mod ffi {
    use super::{PangoContext, PangoFontMap};
    use std::ffi::c_void;

    extern "C" {
        pub fn pango_ft2_font_map_new() -> *mut PangoFontMap;
        pub fn pango_font_map_create_context(font_map: *mut PangoFontMap) -> *mut PangoContext;
        pub fn g_object_unref(object: *mut c_void);
    }
}

/// Owner of the shared font map and layout context.
pub struct TextLayout {
    font_map: *mut PangoFontMap,
    context: *mut PangoContext,
}

// SAFETY: the handles are only handed out as raw pointers; this type itself
// never mutates them after construction, and PangoFT2 font maps tolerate
// cross-thread use under the collaborator's own discipline.
unsafe impl Send for TextLayout {}
unsafe impl Sync for TextLayout {}

impl TextLayout {
    /// Builds the font map and derives the layout context from it.
    pub fn new() -> Result<Self> {
        // SAFETY: plain constructor calls; null results are checked before use.
        let font_map = unsafe { ffi::pango_ft2_font_map_new() };
        if font_map.is_null() {
            return Err(anyhow!("pango_ft2_font_map_new returned null"));
        }

        let context = unsafe { ffi::pango_font_map_create_context(font_map) };
        if context.is_null() {
            unsafe { ffi::g_object_unref(font_map as *mut c_void) };
            return Err(anyhow!("pango_font_map_create_context returned null"));
        }

        debug!(
            "text layout ready: font map {:p}, context {:p}",
            font_map, context
        );
        Ok(TextLayout { font_map, context })
    }

    /// Shared layout context handle.
    ///
    /// # Safety contract
    /// Valid for as long as this `TextLayout` is alive; callers must not unref
    /// it.
    #[inline]
    pub fn layout_context(&self) -> *mut PangoContext {
        self.context
    }

    /// Shared font map handle. Same lifetime contract as
    /// [`TextLayout::layout_context`].
    #[inline]
    pub fn font_map(&self) -> *mut PangoFontMap {
        self.font_map
    }
}

impl Drop for TextLayout {
    fn drop(&mut self) {
        // SAFETY: both handles were obtained in new() and are unref'd exactly
        // once, context before the font map it was derived from.
        unsafe {
            ffi::g_object_unref(self.context as *mut c_void);
            ffi::g_object_unref(self.font_map as *mut c_void);
        }
    }
}
