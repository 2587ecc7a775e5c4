// src/lib.rs

//! Process-wide display and hardware-acceleration resource management for the
//! plugin host shim.
//!
//! This crate owns the single connection to the X server, negotiates which
//! hardware video-decode backend (VA-API, VDPAU) is usable on the host, and
//! keeps the thread-safe registries that map plugin-instance identifiers and
//! foreign callback objects back to their owners. It does not decode video or
//! present frames; it only establishes whether a decode backend is usable and
//! exposes its function table to the rest of the shim.
//!
//! Everything hangs off [`context::HostContext`], one of which is constructed
//! per process (or per test). A host session then brackets its display use
//! with [`context::HostContext::open_display`] and
//! [`context::HostContext::close_display`]; every optional capability that
//! could not be acquired is reported through a `None`/`false` flag rather than
//! an error, so callers branch on capabilities instead of handling failures.

pub mod config;
pub mod context;
pub mod display;
pub mod hwdec;
pub mod registry;
pub mod screensaver;
pub mod text_layout;

pub use config::Config;
pub use context::HostContext;
pub use registry::{ForeignHandle, InstanceId, InstanceState};
