// SPDX-License-Identifier: GPL-3.0-only

//! QR Scanner - camera QR code scanner with live preview
//!
//! Opens a camera preview, analyzes frames continuously for a QR code, and
//! shows the decoded text. The torch can be toggled while scanning.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`permission`]: Camera permission gate (device access or XDG portal)
//! - [`backends`]: Camera providers and the capture session manager
//! - [`app`]: Frame analysis, UI state and the scanner orchestrator
//! - [`terminal`]: Interactive terminal front end
//! - [`config`]: User configuration handling
//! - [`flash`]: Torch control via V4L2 or sysfs LEDs
//!
//! ```text
//! PermissionGate ──unlocks──▶ CaptureSessionManager ──frames──▶ FrameAnalyzer
//!                                                                    │
//!                              terminal UI ◀──watch── StateContainer ◀┘
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod permission;
pub mod terminal;

// Re-export commonly used types
pub use app::ScannerApp;
pub use app::state::{ScannerState, StateContainer};
pub use config::Config;
pub use errors::{AppError, AppResult, CameraError, DecodeError};
pub use permission::{PermissionGate, PermissionState};
