// src/hwdec/vdpau.rs

//! VDPAU backend negotiation.
//!
//! libvdpau exports exactly one real symbol, `vdp_device_create_x11`; every
//! other entry point is obtained through the `VdpGetProcAddress` indirection
//! it returns. Negotiation resolves the full required table, logging each
//! failed id individually while continuing with the rest, and marks the
//! backend available only when every required entry point resolved —
//! all-or-nothing. The device handle and its destroy entry point are kept even
//! when the table came up short, so teardown can still release the device.

use libc::{c_char, c_int};
use libloading::Library;
use log::{error, info};
use std::ffi::{c_void, CStr};
use x11::xlib;

use super::load_first;

pub type VdpDevice = u32;
pub type VdpStatus = u32;
pub type VdpFuncId = u32;

pub const VDP_STATUS_OK: VdpStatus = 0;
pub const VDP_INVALID_HANDLE: u32 = 0xffff_ffff;

// Function ids from vdpau.h. Only the ones this shim resolves.
pub const VDP_FUNC_ID_GET_ERROR_STRING: VdpFuncId = 0;
pub const VDP_FUNC_ID_GET_INFORMATION_STRING: VdpFuncId = 4;
pub const VDP_FUNC_ID_DEVICE_DESTROY: VdpFuncId = 5;
pub const VDP_FUNC_ID_VIDEO_SURFACE_CREATE: VdpFuncId = 9;
pub const VDP_FUNC_ID_VIDEO_SURFACE_DESTROY: VdpFuncId = 10;
pub const VDP_FUNC_ID_OUTPUT_SURFACE_CREATE: VdpFuncId = 18;
pub const VDP_FUNC_ID_OUTPUT_SURFACE_DESTROY: VdpFuncId = 19;
pub const VDP_FUNC_ID_DECODER_CREATE: VdpFuncId = 37;
pub const VDP_FUNC_ID_DECODER_DESTROY: VdpFuncId = 38;
pub const VDP_FUNC_ID_DECODER_RENDER: VdpFuncId = 40;
pub const VDP_FUNC_ID_VIDEO_MIXER_CREATE: VdpFuncId = 46;
pub const VDP_FUNC_ID_VIDEO_MIXER_DESTROY: VdpFuncId = 53;
pub const VDP_FUNC_ID_VIDEO_MIXER_RENDER: VdpFuncId = 54;
pub const VDP_FUNC_ID_PRESENTATION_QUEUE_TARGET_DESTROY: VdpFuncId = 55;
pub const VDP_FUNC_ID_PRESENTATION_QUEUE_CREATE: VdpFuncId = 56;
pub const VDP_FUNC_ID_PRESENTATION_QUEUE_DESTROY: VdpFuncId = 57;
pub const VDP_FUNC_ID_PRESENTATION_QUEUE_DISPLAY: VdpFuncId = 61;
const VDP_FUNC_ID_BASE_WINSYS: VdpFuncId = 0x7f00_0000;
pub const VDP_FUNC_ID_PRESENTATION_QUEUE_TARGET_CREATE_X11: VdpFuncId = VDP_FUNC_ID_BASE_WINSYS;

pub type VdpGetProcAddressFn = unsafe extern "C" fn(
    device: VdpDevice,
    function_id: VdpFuncId,
    function_pointer: *mut *mut c_void,
) -> VdpStatus;

type VdpDeviceCreateX11Fn = unsafe extern "C" fn(
    display: *mut xlib::Display,
    screen: c_int,
    device: *mut VdpDevice,
    get_proc_address: *mut Option<VdpGetProcAddressFn>,
) -> VdpStatus;

pub type VdpGetErrorStringFn = unsafe extern "C" fn(status: VdpStatus) -> *const c_char;
pub type VdpGetInformationStringFn =
    unsafe extern "C" fn(information_string: *mut *const c_char) -> VdpStatus;
pub type VdpDeviceDestroyFn = unsafe extern "C" fn(device: VdpDevice) -> VdpStatus;
pub type VdpDecoderCreateFn = unsafe extern "C" fn(
    device: VdpDevice,
    profile: u32,
    width: u32,
    height: u32,
    max_references: u32,
    decoder: *mut u32,
) -> VdpStatus;
pub type VdpDecoderDestroyFn = unsafe extern "C" fn(decoder: u32) -> VdpStatus;
pub type VdpDecoderRenderFn = unsafe extern "C" fn(
    decoder: u32,
    target: u32,
    picture_info: *const c_void,
    bitstream_buffer_count: u32,
    bitstream_buffers: *const c_void,
) -> VdpStatus;
pub type VdpVideoSurfaceCreateFn = unsafe extern "C" fn(
    device: VdpDevice,
    chroma_type: u32,
    width: u32,
    height: u32,
    surface: *mut u32,
) -> VdpStatus;
pub type VdpVideoSurfaceDestroyFn = unsafe extern "C" fn(surface: u32) -> VdpStatus;
pub type VdpPresentationQueueTargetCreateX11Fn = unsafe extern "C" fn(
    device: VdpDevice,
    drawable: xlib::Drawable,
    target: *mut u32,
) -> VdpStatus;
pub type VdpPresentationQueueTargetDestroyFn =
    unsafe extern "C" fn(presentation_queue_target: u32) -> VdpStatus;
pub type VdpPresentationQueueCreateFn = unsafe extern "C" fn(
    device: VdpDevice,
    presentation_queue_target: u32,
    presentation_queue: *mut u32,
) -> VdpStatus;
pub type VdpPresentationQueueDestroyFn =
    unsafe extern "C" fn(presentation_queue: u32) -> VdpStatus;
pub type VdpPresentationQueueDisplayFn = unsafe extern "C" fn(
    presentation_queue: u32,
    surface: u32,
    clip_width: u32,
    clip_height: u32,
    earliest_presentation_time: u64,
) -> VdpStatus;
pub type VdpOutputSurfaceCreateFn = unsafe extern "C" fn(
    device: VdpDevice,
    rgba_format: u32,
    width: u32,
    height: u32,
    surface: *mut u32,
) -> VdpStatus;
pub type VdpOutputSurfaceDestroyFn = unsafe extern "C" fn(surface: u32) -> VdpStatus;
pub type VdpVideoMixerCreateFn = unsafe extern "C" fn(
    device: VdpDevice,
    feature_count: u32,
    features: *const u32,
    parameter_count: u32,
    parameters: *const u32,
    parameter_values: *const *const c_void,
    mixer: *mut u32,
) -> VdpStatus;
pub type VdpVideoMixerDestroyFn = unsafe extern "C" fn(mixer: u32) -> VdpStatus;
pub type VdpVideoMixerRenderFn = unsafe extern "C" fn(
    mixer: u32,
    background_surface: u32,
    background_source_rect: *const c_void,
    current_picture_structure: u32,
    video_surface_past_count: u32,
    video_surface_past: *const u32,
    video_surface_current: u32,
    video_surface_future_count: u32,
    video_surface_future: *const u32,
    video_source_rect: *const c_void,
    destination_surface: u32,
    destination_rect: *const c_void,
    destination_video_rect: *const c_void,
    layer_count: u32,
    layers: *const c_void,
) -> VdpStatus;

const SONAMES: &[&str] = &["libvdpau.so.1", "libvdpau.so"];

/// Every VDPAU entry point resolved through `VdpGetProcAddress`, each
/// individually nullable.
///
/// Option-wrapped on purpose: resolution failures are recorded per entry, and
/// the backend is available only when [`VdpauEntryPoints::complete`] holds.
#[derive(Default)]
pub struct VdpauEntryPoints {
    pub get_error_string: Option<VdpGetErrorStringFn>,
    pub get_information_string: Option<VdpGetInformationStringFn>,
    pub device_destroy: Option<VdpDeviceDestroyFn>,
    pub decoder_create: Option<VdpDecoderCreateFn>,
    pub decoder_destroy: Option<VdpDecoderDestroyFn>,
    pub decoder_render: Option<VdpDecoderRenderFn>,
    pub video_surface_create: Option<VdpVideoSurfaceCreateFn>,
    pub video_surface_destroy: Option<VdpVideoSurfaceDestroyFn>,
    pub presentation_queue_target_create_x11: Option<VdpPresentationQueueTargetCreateX11Fn>,
    pub presentation_queue_target_destroy: Option<VdpPresentationQueueTargetDestroyFn>,
    pub presentation_queue_create: Option<VdpPresentationQueueCreateFn>,
    pub presentation_queue_destroy: Option<VdpPresentationQueueDestroyFn>,
    pub presentation_queue_display: Option<VdpPresentationQueueDisplayFn>,
    pub output_surface_create: Option<VdpOutputSurfaceCreateFn>,
    pub output_surface_destroy: Option<VdpOutputSurfaceDestroyFn>,
    pub video_mixer_create: Option<VdpVideoMixerCreateFn>,
    pub video_mixer_destroy: Option<VdpVideoMixerDestroyFn>,
    pub video_mixer_render: Option<VdpVideoMixerRenderFn>,
}

impl VdpauEntryPoints {
    /// All-or-nothing check: every required entry point resolved.
    pub fn complete(&self) -> bool {
        self.get_error_string.is_some()
            && self.get_information_string.is_some()
            && self.device_destroy.is_some()
            && self.decoder_create.is_some()
            && self.decoder_destroy.is_some()
            && self.decoder_render.is_some()
            && self.video_surface_create.is_some()
            && self.video_surface_destroy.is_some()
            && self.presentation_queue_target_create_x11.is_some()
            && self.presentation_queue_target_destroy.is_some()
            && self.presentation_queue_create.is_some()
            && self.presentation_queue_destroy.is_some()
            && self.presentation_queue_display.is_some()
            && self.output_surface_create.is_some()
            && self.output_surface_destroy.is_some()
            && self.video_mixer_create.is_some()
            && self.video_mixer_destroy.is_some()
            && self.video_mixer_render.is_some()
    }
}

impl std::fmt::Debug for VdpauEntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdpauEntryPoints")
            .field("complete", &self.complete())
            .finish_non_exhaustive()
    }
}

/// A VDPAU device created on the display connection, with whatever entry
/// points resolved.
///
/// Unlike [`super::VaapiBackend`], existence does not imply availability:
/// device creation can succeed while the entry-point table comes up
/// incomplete. Check [`VdpauBackend::available`] (or take
/// [`VdpauBackend::entry_points`] through it) before decoding.
pub struct VdpauBackend {
    // Keeps every resolved entry point valid. Never unloaded before teardown.
    _library: Library,
    device: VdpDevice,
    get_proc_address: VdpGetProcAddressFn,
    entry_points: VdpauEntryPoints,
    available: bool,
}

// SAFETY: the device handle and entry points are only used under the display
// session's recursive lock.
unsafe impl Send for VdpauBackend {}

impl std::fmt::Debug for VdpauBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdpauBackend")
            .field("device", &self.device)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

impl VdpauBackend {
    /// Attempts to bring up VDPAU on the open X connection.
    ///
    /// `None` means the library or its device could not be created at all.
    /// `Some` with `available() == false` means the device exists but some
    /// required entry point did not resolve.
    pub fn negotiate(display: *mut xlib::Display, screen: c_int) -> Option<Self> {
        let library = load_first(SONAMES)?;

        // SAFETY: the prototype matches vdp_device_create_x11; the library
        // stays loaded for the backend's lifetime.
        let create: VdpDeviceCreateX11Fn = match unsafe {
            library.get::<VdpDeviceCreateX11Fn>(b"vdp_device_create_x11\0")
        } {
            Ok(symbol) => *symbol,
            Err(err) => {
                info!("vdp_device_create_x11 not found: {}", err);
                return None;
            }
        };

        let mut device: VdpDevice = VDP_INVALID_HANDLE;
        let mut get_proc_address: Option<VdpGetProcAddressFn> = None;
        // SAFETY: display is open, out-params point to stack storage.
        let status = unsafe { create(display, screen, &mut device, &mut get_proc_address) };

        let get_proc_address = match (status, get_proc_address) {
            (VDP_STATUS_OK, Some(gpa)) => gpa,
            _ => {
                info!("failed to initialize VDPAU device, no VDPAU available");
                return None;
            }
        };

        let entry_points = resolve_entry_points(device, get_proc_address);
        let available = entry_points.complete();

        if available {
            // Driver identification is best-effort diagnostics.
            if let Some(get_information_string) = entry_points.get_information_string {
                let mut info_str: *const c_char = std::ptr::null();
                // SAFETY: resolved entry point on a live device.
                if unsafe { get_information_string(&mut info_str) } == VDP_STATUS_OK
                    && !info_str.is_null()
                {
                    info!(
                        "VDPAU driver: {}",
                        unsafe { CStr::from_ptr(info_str) }.to_string_lossy()
                    );
                } else {
                    error!("failed to get VDPAU driver version");
                }
            }
        } else {
            error!("some essential VDPAU functions missing");
        }

        Some(VdpauBackend {
            _library: library,
            device,
            get_proc_address,
            entry_points,
            available,
        })
    }

    /// True only when every required entry point resolved.
    #[inline]
    pub fn available(&self) -> bool {
        self.available
    }

    /// The device handle, `VDP_INVALID_HANDLE` once torn down.
    #[inline]
    pub fn device(&self) -> VdpDevice {
        self.device
    }

    /// The raw `VdpGetProcAddress` indirection, for consumers that resolve
    /// optional entry points of their own.
    #[inline]
    pub fn get_proc_address(&self) -> VdpGetProcAddressFn {
        self.get_proc_address
    }

    /// The resolved function table, only when the backend is available.
    pub fn entry_points(&self) -> Option<&VdpauEntryPoints> {
        self.available.then_some(&self.entry_points)
    }

    /// Destroys the device, but only when both the destroy entry point and a
    /// valid device handle are present. Safe no-op otherwise, and idempotent.
    pub fn teardown(&mut self) {
        if let Some(device_destroy) = self.entry_points.device_destroy {
            if self.device != VDP_INVALID_HANDLE {
                // SAFETY: resolved destroy entry point, device created by
                // vdp_device_create_x11 and destroyed exactly once.
                unsafe {
                    device_destroy(self.device);
                }
                self.device = VDP_INVALID_HANDLE;
            }
        }
        self.available = false;
    }
}

impl Drop for VdpauBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resolves one entry point through the indirection, logging failure.
fn get_proc<F>(
    device: VdpDevice,
    get_proc_address: VdpGetProcAddressFn,
    func_id: VdpFuncId,
) -> Option<F> {
    let mut ptr: *mut c_void = std::ptr::null_mut();
    // SAFETY: device was just created on this connection. F is the prototype
    // vdpau.h documents for func_id at every call site; transmute_copy is the
    // usual fn-pointer cast for dlsym-style results.
    let status = unsafe { get_proc_address(device, func_id, &mut ptr) };
    if status != VDP_STATUS_OK || ptr.is_null() {
        error!("can't get VDPAU function {} address", func_id);
        return None;
    }
    Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&ptr) })
}

fn resolve_entry_points(
    device: VdpDevice,
    get_proc_address: VdpGetProcAddressFn,
) -> VdpauEntryPoints {
    // Each failure is logged by get_proc and resolution continues; the
    // all-or-nothing verdict comes later from complete().
    VdpauEntryPoints {
        get_error_string: get_proc(device, get_proc_address, VDP_FUNC_ID_GET_ERROR_STRING),
        get_information_string: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_GET_INFORMATION_STRING,
        ),
        device_destroy: get_proc(device, get_proc_address, VDP_FUNC_ID_DEVICE_DESTROY),
        decoder_create: get_proc(device, get_proc_address, VDP_FUNC_ID_DECODER_CREATE),
        decoder_destroy: get_proc(device, get_proc_address, VDP_FUNC_ID_DECODER_DESTROY),
        decoder_render: get_proc(device, get_proc_address, VDP_FUNC_ID_DECODER_RENDER),
        video_surface_create: get_proc(device, get_proc_address, VDP_FUNC_ID_VIDEO_SURFACE_CREATE),
        video_surface_destroy: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_VIDEO_SURFACE_DESTROY,
        ),
        presentation_queue_target_create_x11: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_PRESENTATION_QUEUE_TARGET_CREATE_X11,
        ),
        presentation_queue_target_destroy: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_PRESENTATION_QUEUE_TARGET_DESTROY,
        ),
        presentation_queue_create: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_PRESENTATION_QUEUE_CREATE,
        ),
        presentation_queue_destroy: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_PRESENTATION_QUEUE_DESTROY,
        ),
        presentation_queue_display: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_PRESENTATION_QUEUE_DISPLAY,
        ),
        output_surface_create: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_OUTPUT_SURFACE_CREATE,
        ),
        output_surface_destroy: get_proc(
            device,
            get_proc_address,
            VDP_FUNC_ID_OUTPUT_SURFACE_DESTROY,
        ),
        video_mixer_create: get_proc(device, get_proc_address, VDP_FUNC_ID_VIDEO_MIXER_CREATE),
        video_mixer_destroy: get_proc(device, get_proc_address, VDP_FUNC_ID_VIDEO_MIXER_DESTROY),
        video_mixer_render: get_proc(device, get_proc_address, VDP_FUNC_ID_VIDEO_MIXER_RENDER),
    }
}
