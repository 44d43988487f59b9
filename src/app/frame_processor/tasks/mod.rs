// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing tasks
//!
//! Decoder implementations that plug into the frame analyzer.

pub mod qr_detector;

pub use qr_detector::QrDetector;
