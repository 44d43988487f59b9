// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scanner
//!
//! Three failure classes matter at runtime: the camera permission was denied,
//! the camera session could not be bound, or a frame could not be decoded.
//! Only the first one changes what the user sees (no preview); the other two
//! are logged where they happen and otherwise swallowed.

use crate::backends::camera::types::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Camera access was refused by the user or the system
    PermissionDenied,
    /// Camera-related errors
    Camera(CameraError),
    /// Frame decoding errors
    Decode(DecodeError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Camera session errors
#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    /// No capture device matched the request
    NoCameraFound,
    /// The camera provider could not be acquired
    ProviderUnavailable(String),
    /// Binding preview and analysis outputs failed
    BindFailed(String),
    /// A virtual source could not be loaded
    InvalidSource(String),
}

/// Per-frame decode errors
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The frame contains no recognizable symbol
    NoCode,
    /// A symbol was located but its content could not be read
    Corrupt(String),
    /// Zero-sized or truncated frame
    EmptyFrame,
}

impl DecodeError {
    /// Frames without a code are the normal case and are not worth a warning
    pub fn is_no_code(&self) -> bool {
        matches!(self, DecodeError::NoCode)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::PermissionDenied => write!(f, "Camera permission denied"),
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Decode(e) => write!(f, "Decode error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoCameraFound => write!(f, "No camera devices found"),
            CameraError::ProviderUnavailable(msg) => {
                write!(f, "Camera provider unavailable: {}", msg)
            }
            CameraError::BindFailed(msg) => write!(f, "Failed to bind camera session: {}", msg),
            CameraError::InvalidSource(msg) => write!(f, "Invalid camera source: {}", msg),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NoCode => write!(f, "No QR code in frame"),
            DecodeError::Corrupt(msg) => write!(f, "QR code could not be read: {}", msg),
            DecodeError::EmptyFrame => write!(f, "Empty frame"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for DecodeError {}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        AppError::Decode(err)
    }
}

impl From<BackendError> for CameraError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(_) => CameraError::NoCameraFound,
            BackendError::NotAvailable(msg) | BackendError::InitializationFailed(msg) => {
                CameraError::ProviderUnavailable(msg)
            }
            BackendError::InvalidSource(msg) => CameraError::InvalidSource(msg),
            other => CameraError::BindFailed(other.to_string()),
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Camera(err.into())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
