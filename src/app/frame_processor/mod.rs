// SPDX-License-Identifier: GPL-3.0-only

//! Frame processor module for frame analysis
//!
//! Frames from the analysis output land in a [`FrameSlot`]; a
//! [`FrameAnalyzer`] drains it on a dedicated thread and runs a
//! [`FrameDecoder`] on each frame. Currently implements QR code decoding.

pub mod analyzer;
pub mod slot;
pub mod tasks;

pub use analyzer::{FrameAnalyzer, log_decode_failure};
pub use slot::{BackpressureStrategy, FrameSlot, Offer};
pub use tasks::QrDetector;

use crate::backends::camera::types::CameraFrame;
use crate::errors::DecodeError;

/// Decodes a text payload from a single frame
///
/// Implementations run on the analyzer thread, one frame at a time.
pub trait FrameDecoder: Send {
    fn decode(&mut self, frame: &CameraFrame) -> Result<String, DecodeError>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn decode(&mut self, frame: &CameraFrame) -> Result<String, DecodeError> {
        (**self).decode(frame)
    }
}

/// Adapts a closure into a [`FrameDecoder`]
pub struct FnDecoder<F>(pub F);

impl<F> FrameDecoder for FnDecoder<F>
where
    F: FnMut(&CameraFrame) -> Result<String, DecodeError> + Send,
{
    fn decode(&mut self, frame: &CameraFrame) -> Result<String, DecodeError> {
        (self.0)(frame)
    }
}
