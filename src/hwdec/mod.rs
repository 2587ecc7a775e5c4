// src/hwdec/mod.rs

//! Hardware video-decode backend negotiation.
//!
//! Two competing vendor protocols may be present on a host: VA-API and VDPAU.
//! Each backend is negotiated independently against the open X connection —
//! vendor library loaded at runtime, device created, every required entry
//! point resolved by name — and is marked available only when the whole
//! function table resolved (all-or-nothing). The absence of either backend is
//! a normal, expected outcome on many systems and is logged at an
//! informational level, never escalated.
//!
//! This crate establishes availability and owns the function tables; actual
//! decoding and presentation belong to the consumers of those tables.

use libloading::Library;
use log::info;

pub mod vaapi;
pub mod vdpau;

pub use vaapi::VaapiBackend;
pub use vdpau::VdpauBackend;

/// Opens the first loadable of the given sonames.
///
/// Vendor libraries are dlopen'd rather than linked so a host without a
/// decode stack degrades instead of failing to load the shim.
pub(crate) fn load_first(names: &[&str]) -> Option<Library> {
    for name in names {
        // SAFETY: loading a vendor library executes its initializers; these
        // are the system libva/libvdpau entry libraries.
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                info!("loaded {}", name);
                return Some(lib);
            }
            Err(err) => {
                info!("{} not loadable: {}", name, err);
            }
        }
    }
    None
}
