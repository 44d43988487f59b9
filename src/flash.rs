// SPDX-License-Identifier: GPL-3.0-only

//! Torch control
//!
//! The torch is driven through the V4L2 flash LED mode control when the
//! capture device exposes one, otherwise through the LEDs exposed at
//! `/sys/class/leds/*:flash`. The sysfs path uses torch mode (brightness
//! file) which is group-writable by `feedbackd`, avoiding the root-only
//! `flash_strobe`/`flash_brightness` interface.

use crate::backends::camera::v4l2_controls;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default location of LED class devices
pub const SYSFS_LEDS_DIR: &str = "/sys/class/leds";

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Maximum brightness value (from `max_brightness` file)
    max_brightness: u32,
    /// Directory basename
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of sysfs flash detection
///
/// Separates "hardware exists" from "we can control it" so a helpful
/// permission hint can be logged instead of silently ignoring the torch.
#[derive(Debug, Default)]
pub struct FlashHardware {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// Hint for the user if hardware was found but not writable
    pub permission_error: Option<String>,
}

impl FlashHardware {
    /// Scan `/sys/class/leds/` for `*:flash` entries
    pub fn detect() -> FlashHardware {
        Self::detect_in(Path::new(SYSFS_LEDS_DIR))
    }

    /// Scan `leds_dir` for `*:flash` entries
    pub fn detect_in(leds_dir: &Path) -> FlashHardware {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(path = %leds_dir.display(), "Cannot read LED class directory; flash discovery skipped");
            return FlashHardware::default();
        };

        let mut devices = Vec::new();
        let mut permission_failures: Vec<(String, PathBuf)> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            // Match entries like "white:flash", "yellow:flash"
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered flash LED");
                    devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        path = %brightness_path.display(),
                        "Flash LED found but not writable"
                    );
                    permission_failures.push((name_str.to_string(), brightness_path));
                }
            }
        }

        // Deterministic ordering (white before yellow)
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        let permission_error = if !permission_failures.is_empty() && devices.is_empty() {
            Some(build_permission_error(&permission_failures))
        } else {
            None
        };

        FlashHardware {
            devices,
            permission_error,
        }
    }

    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }
}

/// Build a permission hint naming the group that owns the brightness file
fn build_permission_error(failures: &[(String, PathBuf)]) -> String {
    let username = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    let escalation_tool = if Path::new("/usr/bin/doas").exists() {
        "doas"
    } else {
        "sudo"
    };

    let group = failures
        .first()
        .and_then(|(_, path)| {
            let gid = std::fs::metadata(path).ok()?.gid();
            let group_contents = std::fs::read_to_string("/etc/group").ok()?;
            group_contents.lines().find_map(|line| {
                let parts: Vec<&str> = line.split(':').collect();
                (parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(gid))
                    .then(|| parts[0].to_string())
            })
        })
        .unwrap_or_else(|| "feedbackd".to_string());

    format!("Flash LEDs detected but cannot be controlled. Run: {escalation_tool} adduser {username} {group}, then log out and back in.")
}

/// Torch backend selected for a capture device
#[derive(Debug)]
pub enum TorchControl {
    /// `V4L2_CID_FLASH_LED_MODE` on the capture node
    V4l2 { device_path: String },
    /// sysfs `*:flash` LEDs
    Sysfs(Vec<FlashDevice>),
    /// No torch hardware
    Unavailable,
}

impl TorchControl {
    /// Pick the torch backend for `device_path`
    pub fn for_device(device_path: Option<&str>) -> Self {
        Self::for_device_with_leds(device_path, Path::new(SYSFS_LEDS_DIR))
    }

    pub fn for_device_with_leds(device_path: Option<&str>, leds_dir: &Path) -> Self {
        if let Some(path) = device_path
            && v4l2_controls::has_control(path, v4l2_controls::V4L2_CID_FLASH_LED_MODE)
        {
            debug!(device = path, "Using V4L2 flash LED control for torch");
            return TorchControl::V4l2 {
                device_path: path.to_string(),
            };
        }

        let hardware = FlashHardware::detect_in(leds_dir);
        if hardware.has_devices() {
            return TorchControl::Sysfs(hardware.devices);
        }
        if let Some(hint) = hardware.permission_error {
            warn!("{}", hint);
        }
        TorchControl::Unavailable
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, TorchControl::Unavailable)
    }

    /// Switch the torch; failures are logged and never propagated
    pub fn set(&self, on: bool) {
        match self {
            TorchControl::V4l2 { device_path } => {
                if let Err(e) = v4l2_controls::set_torch_mode(device_path, on) {
                    warn!(device = %device_path, error = %e, on, "Failed to switch V4L2 torch");
                }
            }
            TorchControl::Sysfs(devices) => {
                if on {
                    all_on(devices);
                } else {
                    all_off(devices);
                }
            }
            TorchControl::Unavailable => {
                if on {
                    info!("Torch requested but no flash hardware is present");
                }
            }
        }
    }
}

/// Turn on all discovered flash devices at full brightness
pub fn all_on(devices: &[FlashDevice]) {
    for dev in devices {
        if let Err(e) = dev.torch(1.0) {
            warn!(device = %dev.name, error = %e, "Failed to turn on flash LED");
        }
    }
}

/// Turn off all discovered flash devices
pub fn all_off(devices: &[FlashDevice]) {
    for dev in devices {
        if let Err(e) = dev.off() {
            warn!(device = %dev.name, error = %e, "Failed to turn off flash LED");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_leds() -> PathBuf {
        let root = std::env::temp_dir().join(format!("qr-scanner-leds-{}", uuid::Uuid::new_v4()));
        for (name, max) in [("yellow:flash", "255"), ("white:flash", "100"), ("input3::capslock", "1")] {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("max_brightness"), max).unwrap();
            std::fs::write(dir.join("brightness"), "0").unwrap();
        }
        root
    }

    fn brightness(root: &Path, name: &str) -> String {
        std::fs::read_to_string(root.join(name).join("brightness")).unwrap()
    }

    #[test]
    fn test_detect_only_flash_leds_sorted() {
        let root = fake_leds();
        let hardware = FlashHardware::detect_in(&root);

        let names: Vec<&str> = hardware.devices.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["white:flash", "yellow:flash"]);
        assert!(hardware.permission_error.is_none());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_sysfs_torch_on_and_off() {
        let root = fake_leds();
        let torch = TorchControl::for_device_with_leds(None, &root);
        assert!(matches!(torch, TorchControl::Sysfs(_)));

        torch.set(true);
        assert_eq!(brightness(&root, "white:flash"), "100");
        assert_eq!(brightness(&root, "yellow:flash"), "255");
        assert_eq!(brightness(&root, "input3::capslock"), "0");

        torch.set(false);
        assert_eq!(brightness(&root, "white:flash"), "0");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_leds_dir_is_unavailable() {
        let torch = TorchControl::for_device_with_leds(
            Some("/nonexistent/video0"),
            Path::new("/nonexistent/leds"),
        );
        assert!(!torch.is_available());
        // Must not panic or error
        torch.set(true);
    }

    #[test]
    fn test_brightness_is_clamped() {
        let root = fake_leds();
        let hardware = FlashHardware::detect_in(&root);
        let white = &hardware.devices[0];

        white.set_brightness(1000).unwrap();
        assert_eq!(brightness(&root, "white:flash"), "100");
        white.torch(0.5).unwrap();
        assert_eq!(brightness(&root, "white:flash"), "50");

        std::fs::remove_dir_all(&root).unwrap();
    }
}
