// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Text shown before anything has been scanned
pub const DEFAULT_DISPLAY_TEXT: &str = "Prashant";

/// Application id used for config/log directories
pub const APP_ID: &str = "qr-scanner";

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the log file used by the interactive terminal mode
pub const LOG_FILE_NAME: &str = "qr-scanner.log";

/// Output resolutions for the two session outputs
pub mod resolution {
    /// Preview output edge length (square, center-cropped)
    pub const PREVIEW_EDGE: u32 = 1080;
    /// Analysis output edge length (square, center-cropped)
    pub const ANALYSIS_EDGE: u32 = 720;
    /// Frames larger than this are downscaled before decoding
    pub const MAX_DECODE_DIMENSION: u32 = 640;
}

/// GStreamer pipeline tuning
pub mod pipeline {
    /// Buffers the preview appsink may hold before dropping
    pub const PREVIEW_MAX_BUFFERS: u32 = 2;
    /// Buffers the analysis appsink may hold (keep-latest)
    pub const ANALYSIS_MAX_BUFFERS: u32 = 1;
    /// Capacity of the preview frame channel towards the UI
    pub const PREVIEW_CHANNEL_CAPACITY: usize = 4;
    /// Element names of the two appsinks
    pub const PREVIEW_SINK_NAME: &str = "preview";
    pub const ANALYSIS_SINK_NAME: &str = "analysis";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Terminal input poll interval (also the redraw cadence)
    pub const UI_TICK: Duration = Duration::from_millis(16);
    /// Headless mode stop-flag poll interval
    pub const HEADLESS_POLL: Duration = Duration::from_millis(100);
    /// Default frame rate of the virtual camera
    pub const VIRTUAL_FRAME_RATE: u32 = 30;
}

/// Thread names
pub mod threads {
    pub const FRAME_ANALYZER: &str = "frame-analyzer";
    pub const VIRTUAL_CAMERA: &str = "virtual-camera";
}

/// XDG desktop portal endpoints
pub mod portal {
    pub const DESTINATION: &str = "org.freedesktop.portal.Desktop";
    pub const OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";
    pub const CAMERA_INTERFACE: &str = "org.freedesktop.portal.Camera";
    pub const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";
    pub const REQUEST_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/request";
    /// Present inside a Flatpak sandbox
    pub const FLATPAK_INFO: &str = "/.flatpak-info";
}
