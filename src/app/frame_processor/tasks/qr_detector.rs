// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection task
//!
//! This module implements QR code decoding using the rqrr crate.
//! Frames are reduced to a luma plane, downscaled when larger than the
//! configured maximum dimension, and searched for QR grids.

use crate::app::frame_processor::FrameDecoder;
use crate::backends::camera::types::CameraFrame;
use crate::constants::resolution::MAX_DECODE_DIMENSION;
use crate::errors::DecodeError;
use tracing::{debug, trace};

/// QR code detector
///
/// Optimized for real-time processing with frame downscaling.
#[derive(Debug, Clone)]
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    /// Create a new QR detector with default settings
    pub fn new() -> Self {
        Self {
            max_dimension: MAX_DECODE_DIMENSION,
        }
    }

    /// Create a QR detector with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    /// Decode every QR code in the frame, in detection order
    ///
    /// Grids that are located but fail to decode are skipped. Returns
    /// `DecodeError::NoCode` when nothing was located and the last decode
    /// error when codes were located but none could be read.
    pub fn detect_all(&self, frame: &CameraFrame) -> Result<Vec<String>, DecodeError> {
        let start = std::time::Instant::now();
        let (luma, width, height) = luma_plane(frame, self.max_dimension)?;

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| luma[y * width as usize + x],
        );
        let grids = prepared.detect_grids();

        trace!(
            count = grids.len(),
            width,
            height,
            detection_ms = start.elapsed().as_millis(),
            "QR grid detection complete"
        );

        if grids.is_empty() {
            return Err(DecodeError::NoCode);
        }

        let mut contents = Vec::with_capacity(grids.len());
        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    debug!(len = content.len(), "Decoded QR code");
                    contents.push(content);
                }
                Err(e) => {
                    debug!(error = %e, "Failed to decode QR grid");
                    last_error = Some(DecodeError::Corrupt(e.to_string()));
                }
            }
        }

        match (contents.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(DecodeError::NoCode),
            (false, _) => Ok(contents),
        }
    }
}

impl FrameDecoder for QrDetector {
    fn decode(&mut self, frame: &CameraFrame) -> Result<String, DecodeError> {
        self.detect_all(frame)?
            .into_iter()
            .next()
            .ok_or(DecodeError::NoCode)
    }
}

/// Reduce a frame to a tightly packed luma plane no larger than `max_dimension`
fn luma_plane(frame: &CameraFrame, max_dimension: u32) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    let width = frame.width;
    let height = frame.height;
    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyFrame);
    }

    let row_bytes = width as usize * frame.format.bytes_per_pixel() as usize;
    let needed = (height as usize - 1) * frame.stride as usize + row_bytes;
    if frame.data.len() < needed {
        return Err(DecodeError::EmptyFrame);
    }

    if width <= max_dimension && height <= max_dimension {
        return Ok((copy_luma_without_stride(frame), width, height));
    }

    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    let dst_width = ((width as f32 / scale) as u32).max(1);
    let dst_height = ((height as f32 / scale) as u32).max(1);
    Ok((downscale_luma(frame, dst_width, dst_height), dst_width, dst_height))
}

/// Copy luma without stride padding
fn copy_luma_without_stride(frame: &CameraFrame) -> Vec<u8> {
    let mut result = Vec::with_capacity((frame.width * frame.height) as usize);
    for y in 0..frame.height {
        for x in 0..frame.width {
            result.push(frame.luma_at(x, y));
        }
    }
    result
}

/// Downscale luma using bilinear interpolation
fn downscale_luma(frame: &CameraFrame, dst_width: u32, dst_height: u32) -> Vec<u8> {
    let src_width = frame.width;
    let src_height = frame.height;
    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = (src_x as u32).min(src_width - 1);
            let y0 = (src_y as u32).min(src_height - 1);
            let x1 = (x0 + 1).min(src_width - 1);
            let y1 = (y0 + 1).min(src_height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let p00 = frame.luma_at(x0, y0) as f32;
            let p01 = frame.luma_at(x1, y0) as f32;
            let p10 = frame.luma_at(x0, y1) as f32;
            let p11 = frame.luma_at(x1, y1) as f32;

            let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                + p01 * x_frac * (1.0 - y_frac)
                + p10 * (1.0 - x_frac) * y_frac
                + p11 * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}
