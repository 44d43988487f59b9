// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device discovery
//!
//! Lists `/dev/video*` nodes through the `v4l` crate, keeps those whose
//! device capabilities include video capture (metadata nodes are skipped),
//! and works out which way each sensor faces.

use super::types::{CameraDevice, LensFacing};
use super::v4l2_controls;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use tracing::{debug, info};

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// Single-planar video capture
const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x00000001;
/// Multi-planar video capture
const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x00001000;
/// `device_caps` field is valid
const V4L2_CAP_DEVICE_CAPS: u32 = 0x80000000;

const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

/// Query V4L2 capabilities for an open file descriptor
fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    // SAFETY: all-zero is a valid v4l2_capability
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    // SAFETY: cap matches struct v4l2_capability and outlives the call
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

fn c_str(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

/// Capabilities that apply to this node (device_caps when valid)
fn effective_caps(capabilities: u32, device_caps: u32) -> u32 {
    if capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
        device_caps
    } else {
        capabilities
    }
}

fn is_capture(caps: u32) -> bool {
    caps & (V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_VIDEO_CAPTURE_MPLANE) != 0
}

/// Driver name and card name of a capture node, or `None` for non-capture nodes
fn probe_capture_node(device_path: &str) -> Option<(String, String)> {
    let file = std::fs::File::open(device_path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;
    if !is_capture(effective_caps(cap.capabilities, cap.device_caps)) {
        debug!(device_path, "Skipping non-capture video node");
        return None;
    }
    Some((c_str(&cap.driver), c_str(&cap.card)))
}

/// Parse a device tree cell (big-endian u32)
fn parse_dt_u32(bytes: &[u8]) -> Option<u32> {
    let cell: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(cell))
}

/// Sensor orientation from the firmware node of a video device
pub(crate) fn sysfs_orientation(sysfs_root: &Path, node_name: &str) -> Option<u32> {
    let device_dir = sysfs_root.join(node_name).join("device");
    ["of_node/orientation", "firmware_node/orientation"]
        .iter()
        .find_map(|rel| std::fs::read(device_dir.join(rel)).ok())
        .and_then(|bytes| {
            // Device tree properties are binary cells; ACPI exposes text
            let text = String::from_utf8_lossy(&bytes);
            text.trim()
                .parse::<u32>()
                .ok()
                .or_else(|| parse_dt_u32(&bytes))
        })
}

/// Which way the sensor behind `device_path` faces
fn lens_facing(device_path: &str, node_name: &str) -> LensFacing {
    if let Some(value) = v4l2_controls::get_control(device_path, v4l2_controls::V4L2_CID_CAMERA_ORIENTATION) {
        return LensFacing::from_orientation(value.max(0) as u32);
    }
    sysfs_orientation(Path::new(SYSFS_VIDEO4LINUX), node_name)
        .map(LensFacing::from_orientation)
        .unwrap_or(LensFacing::External)
}

/// Enumerate V4L2 capture devices, ordered by node index
pub fn enumerate_capture_devices() -> Vec<CameraDevice> {
    let mut nodes = v4l::context::enum_devices();
    nodes.sort_by_key(|node| node.index());

    let devices: Vec<CameraDevice> = nodes
        .iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            let (driver, card) = probe_capture_node(&path)?;
            let node_name = node
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = node.name().filter(|n| !n.is_empty()).unwrap_or(card);
            let facing = lens_facing(&path, &node_name);

            debug!(path = %path, name = %name, driver = %driver, %facing, "Found capture device");
            Some(CameraDevice {
                name,
                path,
                driver: Some(driver),
                facing,
            })
        })
        .collect();

    info!(count = devices.len(), "Enumerated capture devices");
    devices
}

/// Pick the device for a lens
///
/// An explicit path wins. Otherwise the first device facing `lens` is used,
/// falling back to the first device when none matches.
pub fn select_device(
    devices: &[CameraDevice],
    lens: LensFacing,
    device_override: Option<&str>,
) -> Option<CameraDevice> {
    if let Some(path) = device_override {
        return Some(
            devices
                .iter()
                .find(|d| d.path == path)
                .cloned()
                .unwrap_or_else(|| CameraDevice {
                    name: path.to_string(),
                    path: path.to_string(),
                    driver: None,
                    facing: lens,
                }),
        );
    }

    devices
        .iter()
        .find(|d| d.facing == lens)
        .or_else(|| devices.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(path: &str, facing: LensFacing) -> CameraDevice {
        CameraDevice {
            name: path.to_string(),
            path: path.to_string(),
            driver: None,
            facing,
        }
    }

    #[test]
    fn test_select_matching_lens() {
        let devices = vec![
            device("/dev/video0", LensFacing::Back),
            device("/dev/video2", LensFacing::Front),
        ];
        let selected = select_device(&devices, LensFacing::Front, None).unwrap();
        assert_eq!(selected.path, "/dev/video2");
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let devices = vec![device("/dev/video0", LensFacing::External)];
        let selected = select_device(&devices, LensFacing::Front, None).unwrap();
        assert_eq!(selected.path, "/dev/video0");
        assert!(select_device(&[], LensFacing::Back, None).is_none());
    }

    #[test]
    fn test_override_wins_even_if_not_enumerated() {
        let devices = vec![device("/dev/video0", LensFacing::Back)];
        let selected = select_device(&devices, LensFacing::Back, Some("/dev/video5")).unwrap();
        assert_eq!(selected.path, "/dev/video5");
        assert_eq!(selected.driver, None);
    }

    #[test]
    fn test_effective_caps() {
        assert_eq!(effective_caps(V4L2_CAP_DEVICE_CAPS | 0xff, 0x1), 0x1);
        assert_eq!(effective_caps(0x1, 0x0), 0x1);
        assert!(is_capture(V4L2_CAP_VIDEO_CAPTURE_MPLANE));
        // Metadata capture only
        assert!(!is_capture(0x00800000));
    }

    #[test]
    fn test_sysfs_orientation_binary_and_text() {
        let root = std::env::temp_dir().join(format!("qr-scanner-v4l-{}", uuid::Uuid::new_v4()));
        let of_node = root.join("video0/device/of_node");
        std::fs::create_dir_all(&of_node).unwrap();
        std::fs::write(of_node.join("orientation"), 1u32.to_be_bytes()).unwrap();

        let acpi = root.join("video1/device/firmware_node");
        std::fs::create_dir_all(&acpi).unwrap();
        std::fs::write(acpi.join("orientation"), "0\n").unwrap();

        assert_eq!(sysfs_orientation(&root, "video0"), Some(1));
        assert_eq!(sysfs_orientation(&root, "video1"), Some(0));
        assert_eq!(sysfs_orientation(&root, "video9"), None);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
