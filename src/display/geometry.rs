// src/display/geometry.rs

//! Minimum usable screen geometry.
//!
//! Fullscreen plugin windows must fit the smallest physical output, so the
//! open routine scans every RandR CRTC and keeps the minimum width and height
//! across those with positive dimensions. The arithmetic is a pure function so
//! it can be tested without a server; the RandR walk is a thin unsafe shell
//! around it.

use x11::{xlib, xrandr};

/// Fallback geometry when no output reports a usable size.
pub const FALLBACK_GEOMETRY: (u32, u32) = (300, 300);

/// Minimum width and height across outputs, ignoring outputs with a zero
/// dimension. Falls back to [`FALLBACK_GEOMETRY`] when nothing qualifies.
pub(crate) fn minimum_output_geometry<I>(outputs: I) -> (u32, u32)
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut min_width = u32::MAX;
    let mut min_height = u32::MAX;

    for (width, height) in outputs {
        if width > 0 && height > 0 {
            min_width = min_width.min(width);
            min_height = min_height.min(height);
        }
    }

    if min_width == u32::MAX || min_height == u32::MAX {
        FALLBACK_GEOMETRY
    } else {
        (min_width, min_height)
    }
}

/// Collects the size of every CRTC on the display.
///
/// Best-effort: a server without RandR (or with no CRTCs) yields an empty
/// vector, which the caller resolves to the fallback geometry.
pub(crate) fn probe_crtc_sizes(display: *mut xlib::Display, root: xlib::Window) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();

    // SAFETY: display and root are live for the duration of the call; every
    // resource handed back by RandR is freed before returning.
    unsafe {
        let resources = xrandr::XRRGetScreenResources(display, root);
        if resources.is_null() {
            return sizes;
        }

        let ncrtc = (*resources).ncrtc;
        for k in 0..ncrtc {
            let crtc = *(*resources).crtcs.offset(k as isize);
            let info = xrandr::XRRGetCrtcInfo(display, resources, crtc);
            if !info.is_null() {
                sizes.push(((*info).width, (*info).height));
                xrandr::XRRFreeCrtcInfo(info);
            }
        }

        xrandr::XRRFreeScreenResources(resources);
    }

    sizes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_valid_output() {
        let outputs = [(0, 0), (1920, 1080), (1280, 0), (1024, 768)];
        assert_eq!(minimum_output_geometry(outputs), (1024, 768));
    }

    #[test]
    fn zero_dimensions_are_excluded_per_axis() {
        // (1280, 0) must not contribute its width either; the whole output is
        // invalid.
        let outputs = [(1280, 0), (1920, 1080)];
        assert_eq!(minimum_output_geometry(outputs), (1920, 1080));
    }

    #[test]
    fn no_valid_outputs_falls_back() {
        assert_eq!(minimum_output_geometry([]), FALLBACK_GEOMETRY);
        assert_eq!(minimum_output_geometry([(0, 0), (0, 1080)]), FALLBACK_GEOMETRY);
    }

    #[test]
    fn single_output() {
        assert_eq!(minimum_output_geometry([(640, 480)]), (640, 480));
    }
}
