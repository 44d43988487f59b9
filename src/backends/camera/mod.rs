// SPDX-License-Identifier: GPL-3.0-only

//! Camera provider abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    ScannerApp        │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureSessionManager│  ← Deferred acquisition, bind/unbind, handles
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraProvider trait │  ← Common interface
//! └──────────┬───────────┘
//!            │
//!      ┌─────┴──────┐
//!      ▼            ▼
//! ┌─────────┐  ┌─────────┐
//! │GStreamer│  │ Virtual │
//! └─────────┘  └─────────┘
//! ```
//!
//! A bind attaches two outputs to one device: the preview output (RGBA frames
//! for display) and the analysis output (GRAY8 frames offered to a
//! [`FrameSlot`]).

pub mod enumeration;
pub mod frame_loop;
pub mod pipeline;
pub mod session;
pub mod types;
pub mod v4l2_controls;
pub mod virtual_camera;

pub use pipeline::GStreamerProvider;
pub use session::{CaptureSessionManager, ProviderFactory, SessionHandle};
pub use types::*;
pub use virtual_camera::VirtualCameraProvider;

use crate::app::frame_processor::FrameSlot;
use crate::constants::resolution;
use std::path::PathBuf;
use std::sync::Arc;

/// Parameters of one bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub lens: LensFacing,
    pub torch: bool,
    pub preview_resolution: Resolution,
    pub analysis_resolution: Resolution,
    /// Explicit device node; skips lens-based selection
    pub device: Option<String>,
}

impl Default for BindRequest {
    fn default() -> Self {
        Self {
            lens: LensFacing::default(),
            torch: false,
            preview_resolution: Resolution::square(resolution::PREVIEW_EDGE),
            analysis_resolution: Resolution::square(resolution::ANALYSIS_EDGE),
            device: None,
        }
    }
}

/// Where a bound session delivers its frames
#[derive(Debug, Clone)]
pub struct SessionOutputs {
    /// Analysis frames; one pending frame at most
    pub analysis: Arc<FrameSlot>,
    /// Preview frames; `None` when nothing displays them (headless)
    pub preview: Option<FrameSender>,
}

/// A source of camera frames
///
/// A provider is bound to at most one device at a time. Binding while bound
/// is the caller's mistake; the session manager always unbinds first.
pub trait CameraProvider: Send {
    /// Enumerate available cameras
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Start delivering frames for `request` into `outputs`
    fn bind(&mut self, request: &BindRequest, outputs: SessionOutputs) -> BackendResult<()>;

    /// Stop delivering frames and release the device. Idempotent.
    fn unbind_all(&mut self);

    fn is_bound(&self) -> bool;

    fn backend_type(&self) -> CameraBackendType;
}

/// How the provider should be constructed on first use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Live V4L2 devices through GStreamer
    Device,
    /// Replay an image file at a fixed frame rate
    Image { path: PathBuf, frame_rate: u32 },
}

/// Deferred constructor for a provider of `kind`
///
/// Nothing touches GStreamer or the filesystem until the factory runs.
pub fn provider_factory(kind: ProviderKind) -> ProviderFactory {
    Box::new(move || -> BackendResult<Box<dyn CameraProvider>> {
        match kind {
            ProviderKind::Device => Ok(Box::new(GStreamerProvider::new()?)),
            ProviderKind::Image { path, frame_rate } => Ok(Box::new(
                VirtualCameraProvider::from_image(&path, frame_rate)?,
            )),
        }
    })
}
