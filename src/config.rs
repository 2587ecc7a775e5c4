// src/config.rs

//! Configuration consumed by the display subsystem.
//!
//! The shim loads its configuration elsewhere; this module only defines the
//! structures and the defaults. Everything here is read-only from the point of
//! view of this crate: `open_display` takes a `&Config` and never writes one.

use serde::{Deserialize, Serialize};

/// Complete configuration for the display and hardware-decode subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)] // Apply default values for the entire struct if a field is missing.
pub struct Config {
    /// Workaround toggles for misbehaving drivers and X servers.
    pub quirks: QuirksConfig,
    /// Hardware video-decode backend selection.
    pub hwdec: HwdecConfig,
    /// 2D compositing (XRender) settings.
    pub compositing: CompositingConfig,
    /// Fixed fullscreen width in pixels. `None` (or zero) means use the
    /// smallest width detected across physical outputs.
    pub fullscreen_width: Option<u32>,
    /// Fixed fullscreen height in pixels. Same semantics as the width.
    pub fullscreen_height: Option<u32>,
}

/// Debugging aids. Always correct, only slower.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuirksConfig {
    /// Force the X connection into synchronous mode (`XSynchronize`).
    /// Makes X errors appear at the request that caused them.
    pub x_synchronize: bool,
}

/// Hardware video-decode switches. Each backend is also gated by the master
/// switch; both are checked independently so one backend failing to enable
/// never blocks the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HwdecConfig {
    /// Master switch for hardware decoding.
    pub enabled: bool,
    /// Attempt VA-API negotiation.
    pub vaapi: bool,
    /// Attempt VDPAU negotiation.
    pub vdpau: bool,
}

impl Default for HwdecConfig {
    fn default() -> Self {
        // Hardware decode is opt-in; broken driver stacks are common enough
        // that the safe default is software decoding.
        HwdecConfig {
            enabled: false,
            vaapi: true,
            vdpau: true,
        }
    }
}

/// XRender-based 2D compositing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositingConfig {
    /// Use XRender for 2D compositing when the server supports it.
    pub enable_xrender: bool,
}

impl Default for CompositingConfig {
    fn default() -> Self {
        CompositingConfig {
            enable_xrender: true,
        }
    }
}

impl Config {
    /// Width override, if one is configured and positive.
    pub fn width_override(&self) -> Option<u32> {
        self.fullscreen_width.filter(|w| *w > 0)
    }

    /// Height override, if one is configured and positive.
    pub fn height_override(&self) -> Option<u32> {
        self.fullscreen_height.filter(|h| *h > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = Config::default();
        assert!(!config.quirks.x_synchronize);
        assert!(!config.hwdec.enabled);
        assert!(config.hwdec.vaapi);
        assert!(config.hwdec.vdpau);
        assert!(config.compositing.enable_xrender);
        assert_eq!(config.width_override(), None);
        assert_eq!(config.height_override(), None);
    }

    #[test]
    fn partial_document_fills_in_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "hwdec": { "enabled": true, "vdpau": false }, "fullscreen_width": 1280 }"#,
        )
        .expect("valid config document");
        assert!(config.hwdec.enabled);
        assert!(config.hwdec.vaapi);
        assert!(!config.hwdec.vdpau);
        assert_eq!(config.width_override(), Some(1280));
        assert_eq!(config.height_override(), None);
        assert!(config.compositing.enable_xrender);
    }

    #[test]
    fn zero_override_counts_as_unset() {
        let config = Config {
            fullscreen_width: Some(0),
            fullscreen_height: Some(768),
            ..Config::default()
        };
        assert_eq!(config.width_override(), None);
        assert_eq!(config.height_override(), Some(768));
    }
}
