// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera providers

//! Shared types for camera providers

use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped, so dropping the last clone of a frame hands the
/// buffer back to the capture pipeline.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (still images, virtual camera, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(bytes: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(bytes))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Camera provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// V4L2 devices captured through GStreamer
    #[default]
    GStreamer,
    /// Still image replayed as a camera
    Virtual,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::GStreamer => write!(f, "GStreamer"),
            CameraBackendType::Virtual => write!(f, "virtual"),
        }
    }
}

/// Which physical camera a device is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// Rear-facing camera (world side)
    #[default]
    Back,
    /// Front-facing camera (user side)
    Front,
    /// Camera with no fixed orientation, e.g. a USB webcam
    External,
}

impl LensFacing {
    /// Parse the device tree `orientation` property (0 = front, 1 = back, 2 = external)
    pub fn from_orientation(value: u32) -> Self {
        match value {
            0 => LensFacing::Front,
            1 => LensFacing::Back,
            _ => LensFacing::External,
        }
    }

    /// Switch between back and front; external devices go to back
    pub fn toggled(self) -> Self {
        match self {
            LensFacing::Back => LensFacing::Front,
            LensFacing::Front | LensFacing::External => LensFacing::Back,
        }
    }
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Back => write!(f, "back"),
            LensFacing::Front => write!(f, "front"),
            LensFacing::External => write!(f, "external"),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub name: String,
    pub path: String,           // Device node, e.g. /dev/video0
    pub driver: Option<String>, // V4L2 driver name
    pub facing: LensFacing,
}

/// Output resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square resolution
    pub const fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel), used for preview
    RGBA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit luma, used for analysis
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel in the packed layout
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::RGBA => 4,
            Self::RGB24 => 3,
            Self::Gray8 => 1,
        }
    }

    /// GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::RGBA => "RGBA",
            Self::RGB24 => "RGB",
            Self::Gray8 => "GRAY8",
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed frame from owned bytes
    pub fn from_packed(width: u32, height: u32, format: PixelFormat, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            data: FrameData::from(bytes),
            format,
            captured_at: Instant::now(),
        }
    }

    pub fn data_slice(&self) -> &[u8] {
        &self.data
    }

    /// Luma value of the pixel at (x, y), BT.601 weights for color formats
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let data = self.data_slice();
        let bpp = self.format.bytes_per_pixel() as usize;
        let idx = y as usize * self.stride as usize + x as usize * bpp;
        match self.format {
            PixelFormat::Gray8 => data.get(idx).copied().unwrap_or(0),
            PixelFormat::RGBA | PixelFormat::RGB24 => {
                if idx + 2 >= data.len() {
                    return 0;
                }
                let (r, g, b) = (data[idx] as u32, data[idx + 1] as u32, data[idx + 2] as u32);
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            }
        }
    }
}

/// Preview frame sender/receiver pair (bounded, never blocks the producer)
pub type FrameSender = futures::channel::mpsc::Sender<CameraFrame>;
pub type FrameReceiver = futures::channel::mpsc::Receiver<CameraFrame>;

/// Create the preview channel used between a provider and the UI
pub fn preview_channel() -> (FrameSender, FrameReceiver) {
    futures::channel::mpsc::channel(crate::constants::pipeline::PREVIEW_CHANNEL_CAPACITY)
}

/// Result type for provider operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for provider operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Provider is not available on this system
    NotAvailable(String),
    /// Failed to initialize provider
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Pipeline could not be built or started
    PipelineFailed(String),
    /// Virtual source could not be read
    InvalidSource(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::PipelineFailed(msg) => write!(f, "Pipeline failed: {}", msg),
            BackendError::InvalidSource(msg) => write!(f, "Invalid source: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lens_from_orientation() {
        assert_eq!(LensFacing::from_orientation(0), LensFacing::Front);
        assert_eq!(LensFacing::from_orientation(1), LensFacing::Back);
        assert_eq!(LensFacing::from_orientation(2), LensFacing::External);
        assert_eq!(LensFacing::External.toggled(), LensFacing::Back);
    }

    #[test]
    fn test_luma_respects_stride() {
        // 1x2 RGBA with two bytes of row padding
        let data = vec![
            255, 255, 255, 255, 0, 0, // white + padding
            0, 0, 0, 255, 0, 0, // black + padding
        ];
        let frame = CameraFrame {
            width: 1,
            height: 2,
            data: FrameData::from(data),
            format: PixelFormat::RGBA,
            stride: 6,
            captured_at: Instant::now(),
        };
        assert_eq!(frame.luma_at(0, 0), 255);
        assert_eq!(frame.luma_at(0, 1), 0);
    }
}
