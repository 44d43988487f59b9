// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 control interface
//!
//! Query and set the flash class controls a sensor or its companion LED
//! driver exposes, and read the sensor orientation. Only torch mode is
//! driven here; strobe is never used.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use tracing::{debug, trace, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CTRL_CLASS_FLASH: u32 = 0x009c0000;

const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;
const V4L2_CID_FLASH_CLASS_BASE: u32 = V4L2_CTRL_CLASS_FLASH | 0x900;

// ===== V4L2 Control IDs (Camera Class) =====

/// Sensor mounting: 0 = front, 1 = back, 2 = external
pub const V4L2_CID_CAMERA_ORIENTATION: u32 = V4L2_CID_CAMERA_CLASS_BASE + 34;

// ===== V4L2 Control IDs (Flash Class) =====

/// LED mode menu: none, flash or torch
pub const V4L2_CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;
/// Torch intensity in driver units
pub const V4L2_CID_FLASH_TORCH_INTENSITY: u32 = V4L2_CID_FLASH_CLASS_BASE + 8;

// ===== V4L2 Flash LED Mode Menu Values =====

/// LED off
pub const V4L2_FLASH_LED_MODE_NONE: i32 = 0;
/// Continuous light
pub const V4L2_FLASH_LED_MODE_TORCH: i32 = 2;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
const V4L2_CTRL_FLAG_READ_ONLY: u32 = 0x0004;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Range and flags of a V4L2 control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlInfo {
    pub minimum: i32,
    pub maximum: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_READ_ONLY != 0
    }

    /// Present and settable
    pub fn is_writable(&self) -> bool {
        !self.is_disabled() && !self.is_read_only()
    }
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    // SAFETY: qctrl matches struct v4l2_queryctrl and outlives the call
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL, &mut qctrl as *mut V4l2Queryctrl) };

    if result < 0 {
        return None;
    }

    trace!(control_id, kind = qctrl.ctrl_type, "Queried V4L2 control");
    Some(ControlInfo {
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        flags: qctrl.flags,
    })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    // SAFETY: ctrl matches struct v4l2_control and outlives the call
    let result = unsafe { libc::ioctl(fd, VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(device_path)
        .map_err(|e| format!("Failed to open device: {}", e))?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    // SAFETY: ctrl matches struct v4l2_control and outlives the call
    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        return Err(format!("Failed to set control: {}", errno));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

/// Check if a writable control is available on the device
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    query_control(device_path, control_id).is_some_and(|info| info.is_writable())
}

/// Switch the device LED into torch mode (or off)
///
/// Torch intensity is raised to its maximum when the driver exposes it.
pub fn set_torch_mode(device_path: &str, on: bool) -> Result<(), String> {
    if on
        && let Some(info) = query_control(device_path, V4L2_CID_FLASH_TORCH_INTENSITY)
        && info.is_writable()
    {
        let _ = set_control(device_path, V4L2_CID_FLASH_TORCH_INTENSITY, info.maximum);
    }

    let mode = if on {
        V4L2_FLASH_LED_MODE_TORCH
    } else {
        V4L2_FLASH_LED_MODE_NONE
    };
    set_control(device_path, V4L2_CID_FLASH_LED_MODE, mode)
}
