// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=QR_SCANNER_VERSION");

    // Packagers can pin the version string without a git checkout
    let version = std::env::var("QR_SCANNER_VERSION").unwrap_or_else(|_| describe_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Build "<crate version>-<short hash>", or just the crate version outside git
fn describe_version() -> String {
    let base = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    let hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    match hash {
        Some(hash) if !hash.is_empty() => format!("{}-{}", base, hash),
        _ => base,
    }
}
