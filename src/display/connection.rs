// src/display/connection.rs
#![allow(non_snake_case)] // Allow non-snake case for X11 types

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::ptr;

use libc::c_int;
use x11::xlib;

/// Manages an X11 Display connection, ensuring it's closed on drop.
#[derive(Debug)]
struct ManagedDisplay {
    ptr: *mut xlib::Display,
}

impl ManagedDisplay {
    /// Attempts to open a new connection to the X server.
    ///
    /// Passing NULL to `XOpenDisplay` means it uses the DISPLAY environment
    /// variable.
    fn new() -> Result<Self> {
        let display_ptr = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if display_ptr.is_null() {
            Err(anyhow!(
                "Failed to open X display. Check DISPLAY environment variable or X server status."
            ))
        } else {
            debug!("X display opened: {:p}", display_ptr);
            Ok(Self { ptr: display_ptr })
        }
    }

    #[inline]
    fn raw(&self) -> *mut xlib::Display {
        self.ptr
    }
}

impl Drop for ManagedDisplay {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            info!("Closing X11 display connection: {:p}", self.ptr);
            unsafe {
                let status = xlib::XCloseDisplay(self.ptr);
                if status != 0 {
                    warn!(
                        "XCloseDisplay returned non-zero status: {}. Display may not have closed cleanly.",
                        status
                    );
                }
            }
        }
    }
}

/// The single connection to the X server, shared by every plugin instance in
/// the process.
///
/// Wraps the raw `Display` pointer together with the default screen and root
/// window, which every later setup step (decode negotiation, cursor and
/// geometry work) needs. The connection closes when this struct drops; the
/// display session makes sure that happens after every dependent resource has
/// been released.
#[derive(Debug)]
pub struct Connection {
    managed_display: ManagedDisplay,
    screen: c_int,
    root: xlib::Window,
}

impl Connection {
    /// Establishes the connection and records the default screen and root
    /// window.
    ///
    /// Failure here is the only fatal outcome of display setup; nothing else
    /// has been acquired yet, so the error propagates with no cleanup needed.
    pub fn new() -> Result<Self> {
        info!("Establishing X11 server connection.");

        let managed_display = ManagedDisplay::new()?;

        // SAFETY: the display pointer is live; these are pure queries.
        let screen = unsafe { xlib::XDefaultScreen(managed_display.raw()) };
        let root = unsafe { xlib::XDefaultRootWindow(managed_display.raw()) };
        debug!("Default screen {}, root window 0x{:x}", screen, root);

        Ok(Connection {
            managed_display,
            screen,
            root,
        })
    }

    /// Puts the connection into synchronous mode. Debugging aid: X errors
    /// surface at the request that caused them, at the cost of a server round
    /// trip per request.
    pub fn synchronize(&self) {
        info!("Forcing synchronous X protocol mode.");
        // SAFETY: valid display; return value is the previous after-function,
        // which we do not chain.
        unsafe {
            xlib::XSynchronize(self.raw(), xlib::True);
        }
    }

    /// Returns the raw X11 display pointer.
    ///
    /// # Safety
    ///
    /// The pointer is valid only while this `Connection` is alive. The display
    /// session guarantees that every consumer it hands the pointer to is torn
    /// down before the connection itself.
    #[inline]
    pub fn raw(&self) -> *mut xlib::Display {
        self.managed_display.raw()
    }

    /// Default screen number.
    #[inline]
    pub fn screen(&self) -> c_int {
        self.screen
    }

    /// Root window of the default screen.
    #[inline]
    pub fn root(&self) -> xlib::Window {
        self.root
    }

    /// A connection with no server behind it, for exercising lifecycle code
    /// on hosts without an X server. `raw()` returns null and drop closes
    /// nothing.
    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        Connection {
            managed_display: ManagedDisplay {
                ptr: ptr::null_mut(),
            },
            screen: 0,
            root: 0,
        }
    }
}
