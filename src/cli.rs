// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Interactive and headless scanning
//! - Listing available cameras
//! - Decoding a still image

use qr_scanner::app::frame_processor::QrDetector;
use qr_scanner::backends::camera::enumeration::enumerate_capture_devices;
use qr_scanner::backends::camera::virtual_camera::load_image_as_frame;
use qr_scanner::constants::timing;
use qr_scanner::{AppError, Config, PermissionState, ScannerApp};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run the terminal UI scanner
pub fn scan_interactive(config: Config, source: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let app = ScannerApp::from_config(config, source);
    qr_scanner::terminal::run(&runtime, app)
}

/// Print every decoded payload to stdout, one per line
pub fn scan_headless(
    config: Config,
    source: Option<PathBuf>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let mut app = ScannerApp::from_config(config, source);
    let mut payloads = app.subscribe_payloads();

    let permission = runtime.block_on(app.resume());
    if permission != PermissionState::Granted {
        return Err(AppError::PermissionDenied.into());
    }
    if !app.is_session_active() {
        return Err("Camera could not be started (see log for details)".into());
    }
    eprintln!("Scanning... (press Ctrl+C to stop)");

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let mut stdout = std::io::stdout();
    while !stop_flag.load(Ordering::SeqCst) {
        let next = runtime.block_on(async {
            tokio::time::timeout(timing::HEADLESS_POLL, payloads.recv()).await
        });
        match next {
            Ok(Some(payload)) => {
                writeln!(stdout, "{}", payload)?;
                stdout.flush()?;
                if once {
                    break;
                }
            }
            // Analyzer stopped
            Ok(None) => break,
            Err(_elapsed) => {}
        }
    }

    app.shutdown();
    Ok(())
}

/// List all capture devices
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_capture_devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Device: {}", camera.path);
        println!("      Facing: {}", camera.facing);
        if let Some(driver) = &camera.driver {
            println!("      Driver: {}", driver);
        }
        println!();
    }

    Ok(())
}

/// Decode every QR code in an image file
///
/// Still images are decoded at full resolution.
pub fn decode_image(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load_image_as_frame(path)?;
    let detector = QrDetector::with_max_dimension(frame.width.max(frame.height));

    for payload in detector.detect_all(&frame)? {
        println!("{}", payload.trim());
    }
    Ok(())
}
