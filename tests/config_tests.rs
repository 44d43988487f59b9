// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use qr_scanner::Config;
use qr_scanner::app::frame_processor::BackpressureStrategy;
use qr_scanner::backends::camera::{LensFacing, Resolution};
use qr_scanner::errors::AppError;
use qr_scanner::permission::PermissionMode;
use std::path::PathBuf;

fn temp_config(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("qr-scanner-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.initial_text, "Prashant");
    assert_eq!(config.lens_facing, LensFacing::Back);
    assert!(!config.torch_on_start);
    assert_eq!(config.camera_device, None);
    assert_eq!(config.preview_resolution, Resolution::square(1080));
    assert_eq!(config.analysis_resolution, Resolution::square(720));
    assert_eq!(config.backpressure, BackpressureStrategy::KeepOnlyLatest);
    assert_eq!(config.max_decode_dimension, 640);
    assert_eq!(config.permission, PermissionMode::Auto);
    assert_eq!(config.virtual_frame_rate, 30);
}

#[test]
fn test_partial_json_keeps_defaults() {
    let path = temp_config(
        "config.json",
        r#"{ "lens_facing": "front", "torch_on_start": true, "backpressure": "block_producer" }"#,
    );

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.lens_facing, LensFacing::Front);
    assert!(config.torch_on_start);
    assert_eq!(config.backpressure, BackpressureStrategy::BlockProducer);
    assert_eq!(config.initial_text, "Prashant");
    assert_eq!(config.analysis_resolution, Resolution::square(720));
}

#[test]
fn test_malformed_file_falls_back_to_defaults() {
    let path = temp_config("config.json", "{ not json");

    assert!(Config::load_from(&path).is_err());
    assert_eq!(Config::load_or_default(&path), Config::default());
}

#[test]
fn test_missing_file() {
    let path = std::env::temp_dir().join("qr-scanner-does-not-exist/config.json");

    assert_eq!(Config::load_or_default(&path), Config::default());
    assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
}

#[test]
fn test_zero_resolution_is_rejected() {
    let path = temp_config(
        "config.json",
        r#"{ "preview_resolution": { "width": 0, "height": 1080 } }"#,
    );

    assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
}
