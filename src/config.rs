// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Read once at startup from `$XDG_CONFIG_HOME/qr-scanner/config.json`. The
//! file is never written. Missing fields take their defaults.

use crate::app::frame_processor::BackpressureStrategy;
use crate::backends::camera::types::{LensFacing, Resolution};
use crate::constants::{self, resolution, timing};
use crate::errors::{AppError, AppResult};
use crate::permission::PermissionMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text shown before the first successful scan
    pub initial_text: String,
    /// Lens used when the scanner starts
    pub lens_facing: LensFacing,
    /// Turn the torch on when the camera starts
    pub torch_on_start: bool,
    /// Explicit device node (e.g. `/dev/video2`); overrides lens selection
    pub camera_device: Option<String>,
    pub preview_resolution: Resolution,
    pub analysis_resolution: Resolution,
    /// What happens to analysis frames while the decoder is busy
    pub backpressure: BackpressureStrategy,
    /// Frames larger than this are downscaled before decoding
    pub max_decode_dimension: u32,
    pub permission: PermissionMode,
    /// Frame rate of the image-file camera
    pub virtual_frame_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_text: constants::DEFAULT_DISPLAY_TEXT.to_string(),
            lens_facing: LensFacing::Back,
            torch_on_start: false,
            camera_device: None,
            preview_resolution: Resolution::square(resolution::PREVIEW_EDGE),
            analysis_resolution: Resolution::square(resolution::ANALYSIS_EDGE),
            backpressure: BackpressureStrategy::KeepOnlyLatest,
            max_decode_dimension: resolution::MAX_DECODE_DIMENSION,
            permission: PermissionMode::Auto,
            virtual_frame_rate: timing::VIRTUAL_FRAME_RATE,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(constants::APP_ID).join(constants::CONFIG_FILE_NAME))
    }

    /// Load from the default location
    ///
    /// A missing file yields defaults. A malformed file is reported and
    /// also yields defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_or_default(&path),
            None => {
                debug!("No config directory; using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`, falling back to defaults on any problem
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Load from `path`, returning any read or parse error
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        for (name, res) in [
            ("preview_resolution", self.preview_resolution),
            ("analysis_resolution", self.analysis_resolution),
        ] {
            if res.width == 0 || res.height == 0 {
                return Err(AppError::Config(format!("{} must be non-zero, got {}", name, res)));
            }
        }
        if self.max_decode_dimension == 0 {
            return Err(AppError::Config("max_decode_dimension must be non-zero".into()));
        }
        Ok(())
    }

    /// Where the interactive terminal mode writes its log
    pub fn log_file_path() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::cache_dir)
            .map(|dir| dir.join(constants::APP_ID).join(constants::LOG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_resolution_is_rejected() {
        let config = Config {
            analysis_resolution: Resolution::new(0, 720),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }
}
