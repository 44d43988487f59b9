// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera provider
//!
//! Replays a still image as if it were a camera. On bind the image is
//! center-cropped the same way the live pipeline crops, scaled to the two
//! output resolutions, and then delivered at a fixed frame rate from a
//! dedicated thread.

use super::frame_loop::{LoopAction, LoopController};
use super::types::*;
use super::{BindRequest, CameraProvider, SessionOutputs};
use crate::constants::threads;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Camera provider that repeats one image
pub struct VirtualCameraProvider {
    device: CameraDevice,
    image: Arc<RgbaImage>,
    frame_rate: u32,
    controller: Option<LoopController>,
}

impl VirtualCameraProvider {
    /// Load `path` with the `image` crate
    pub fn from_image(path: &Path, frame_rate: u32) -> BackendResult<Self> {
        info!(path = %path.display(), "Loading image file");

        let img = image::open(path).map_err(|e| {
            BackendError::InvalidSource(format!("Failed to load image '{}': {}", path.display(), e))
        })?;
        let rgba = img.to_rgba8();
        info!(width = rgba.width(), height = rgba.height(), "Image loaded successfully");

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Self::from_rgba(&name, &path.to_string_lossy(), rgba, frame_rate)
    }

    /// Use an in-memory image
    pub fn from_rgba(name: &str, path: &str, image: RgbaImage, frame_rate: u32) -> BackendResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BackendError::InvalidSource(format!("'{}' is empty", name)));
        }
        Ok(Self {
            device: CameraDevice {
                name: name.to_string(),
                path: path.to_string(),
                driver: None,
                facing: LensFacing::External,
            },
            image: Arc::new(image),
            frame_rate: frame_rate.max(1),
            controller: None,
        })
    }
}

/// Load an image file as a single GRAY8 frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<CameraFrame> {
    let img = image::open(path).map_err(|e| {
        BackendError::InvalidSource(format!("Failed to load image '{}': {}", path.display(), e))
    })?;
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    debug!(path = %path.display(), width, height, "Image loaded as frame");
    Ok(CameraFrame::from_packed(width, height, PixelFormat::Gray8, luma.into_raw()))
}

/// Largest centered region of `image` with the aspect ratio of `target`
fn center_crop(image: &RgbaImage, target: Resolution) -> RgbaImage {
    let (width, height) = (image.width() as u64, image.height() as u64);
    let (tw, th) = (target.width.max(1) as u64, target.height.max(1) as u64);

    let (crop_w, crop_h) = if width * th > height * tw {
        ((height * tw / th).max(1), height)
    } else {
        (width, (width * th / tw).max(1))
    };
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;

    imageops::crop_imm(image, x as u32, y as u32, crop_w as u32, crop_h as u32).to_image()
}

fn scaled_rgba(cropped: &RgbaImage, size: Resolution) -> CameraFrame {
    let scaled = imageops::resize(cropped, size.width, size.height, FilterType::Triangle);
    CameraFrame::from_packed(size.width, size.height, PixelFormat::RGBA, scaled.into_raw())
}

fn scaled_gray(cropped: &RgbaImage, size: Resolution) -> CameraFrame {
    let gray: GrayImage = imageops::grayscale(cropped);
    let scaled = imageops::resize(&gray, size.width, size.height, FilterType::Triangle);
    CameraFrame::from_packed(size.width, size.height, PixelFormat::Gray8, scaled.into_raw())
}

impl CameraProvider for VirtualCameraProvider {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        vec![self.device.clone()]
    }

    fn bind(&mut self, request: &BindRequest, outputs: SessionOutputs) -> BackendResult<()> {
        self.unbind_all();

        if request.torch {
            debug!("Virtual camera has no torch");
        }

        let crop_to = if outputs.preview.is_some() {
            request.preview_resolution
        } else {
            request.analysis_resolution
        };
        let cropped = center_crop(&self.image, crop_to);
        let preview_frame = outputs
            .preview
            .as_ref()
            .map(|_| scaled_rgba(&cropped, request.preview_resolution));
        let analysis_frame = scaled_gray(&cropped, request.analysis_resolution);

        let interval = Duration::from_secs_f64(1.0 / self.frame_rate as f64);
        let SessionOutputs { analysis, mut preview } = outputs;
        let mut next_tick = Instant::now();
        let mut delivered: u64 = 0;

        let controller = LoopController::start(threads::VIRTUAL_CAMERA, move || {
            let now = Instant::now();
            if next_tick > now {
                std::thread::sleep(next_tick - now);
            }
            next_tick += interval;

            if let (Some(sender), Some(frame)) = (preview.as_mut(), preview_frame.as_ref()) {
                let mut frame = frame.clone();
                frame.captured_at = Instant::now();
                let _ = sender.try_send(frame);
            }

            let mut frame = analysis_frame.clone();
            frame.captured_at = Instant::now();
            analysis.offer(Arc::new(frame));

            delivered += 1;
            if delivered % 300 == 0 {
                trace!(delivered, "Virtual camera frames delivered");
            }
            LoopAction::Continue
        });

        info!(device = %self.device.name, fps = self.frame_rate, "Virtual camera bound");
        self.controller = Some(controller);
        Ok(())
    }

    fn unbind_all(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            debug!(device = %self.device.name, "Virtual camera unbound");
        }
    }

    fn is_bound(&self) -> bool {
        self.controller.is_some()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Virtual
    }
}

impl Drop for VirtualCameraProvider {
    fn drop(&mut self) {
        self.unbind_all();
    }
}
