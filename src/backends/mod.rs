// SPDX-License-Identifier: GPL-3.0-only

//! Backend layer for camera capture
//!
//! Hardware access lives here: device enumeration, the GStreamer capture
//! pipeline, the image-file camera and the capture session manager that
//! owns whichever provider is active.

pub mod camera;
