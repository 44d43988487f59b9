// SPDX-License-Identifier: GPL-3.0-only

//! Application state management
//!
//! All state the UI renders lives in one [`ScannerState`] value behind a
//! [`StateContainer`]. Writers go through the transition methods; readers
//! take snapshots or subscribe for change notifications. The container is
//! shared between the UI thread and the analyzer thread. Writes are
//! last-write-wins with no ordering token.

use crate::backends::camera::types::LensFacing;
use crate::permission::PermissionState;
use tokio::sync::watch;
use tracing::debug;

/// Everything the scanner UI renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerState {
    /// Most recent decoded payload, or the initial placeholder
    pub display_text: String,
    /// Whether the camera view should be composed at all
    pub should_show_camera: bool,
    /// Torch requested by the user
    pub flash_on: bool,
    /// Requested lens
    pub lens: LensFacing,
    /// Last answer of the permission gate
    pub permission: PermissionState,
    /// Number of successful decodes, repeats included
    pub decode_count: u64,
}

impl ScannerState {
    pub fn new(initial_text: impl Into<String>, lens: LensFacing, flash_on: bool) -> Self {
        Self {
            display_text: initial_text.into(),
            should_show_camera: false,
            flash_on,
            lens,
            permission: PermissionState::Unknown,
            decode_count: 0,
        }
    }
}

/// Owned, observable container for [`ScannerState`]
///
/// Cloning is cheap and every clone refers to the same state.
#[derive(Debug, Clone)]
pub struct StateContainer {
    tx: watch::Sender<ScannerState>,
}

impl StateContainer {
    pub fn new(initial: ScannerState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ScannerState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<ScannerState> {
        self.tx.subscribe()
    }

    /// Record the permission gate's answer
    ///
    /// Granted raises the camera-ready flag. Any other answer leaves the flag
    /// as it was, so a camera that is already showing is not torn down by a
    /// later unknown/denied check.
    pub fn permission_resolved(&self, permission: PermissionState) {
        self.tx.send_modify(|state| {
            state.permission = permission;
            if permission == PermissionState::Granted {
                state.should_show_camera = true;
            }
        });
        debug!(?permission, "Permission resolved");
    }

    /// A frame decoded successfully; always overwrites, repeats included
    pub fn payload_decoded(&self, payload: &str) {
        let payload = payload.trim();
        self.tx.send_modify(|state| {
            state.display_text.clear();
            state.display_text.push_str(payload);
            state.decode_count += 1;
        });
    }

    pub fn set_flash(&self, on: bool) {
        self.tx.send_modify(|state| state.flash_on = on);
    }

    /// Flip the torch flag and return the new value
    pub fn toggle_flash(&self) -> bool {
        let mut flash_on = false;
        self.tx.send_modify(|state| {
            state.flash_on = !state.flash_on;
            flash_on = state.flash_on;
        });
        flash_on
    }

    pub fn set_lens(&self, lens: LensFacing) {
        self.tx.send_modify(|state| state.lens = lens);
    }

    /// The camera view goes away (teardown)
    pub fn camera_closed(&self) {
        self.tx.send_modify(|state| state.should_show_camera = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> StateContainer {
        StateContainer::new(ScannerState::new("Prashant", LensFacing::Back, false))
    }

    #[test]
    fn test_initial_state() {
        let state = container().snapshot();
        assert_eq!(state.display_text, "Prashant");
        assert!(!state.should_show_camera);
        assert_eq!(state.permission, PermissionState::Unknown);
    }

    #[test]
    fn test_decoded_payload_is_trimmed() {
        let state = container();
        state.payload_decoded("\t https://example.com \n");
        assert_eq!(state.snapshot().display_text, "https://example.com");
    }

    #[test]
    fn test_repeated_payload_notifies_every_time() {
        let state = container();
        let mut rx = state.subscribe();

        state.payload_decoded("SAME");
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        state.payload_decoded("SAME");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().decode_count, 2);
    }

    #[test]
    fn test_denied_permission_keeps_camera_hidden() {
        let state = container();
        state.permission_resolved(PermissionState::Denied);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.permission, PermissionState::Denied);
        assert!(!snapshot.should_show_camera);
    }

    #[test]
    fn test_granted_then_closed() {
        let state = container();
        state.permission_resolved(PermissionState::Granted);
        assert!(state.snapshot().should_show_camera);

        state.camera_closed();
        assert!(!state.snapshot().should_show_camera);
    }

    #[test]
    fn test_toggle_flash() {
        let state = container();
        assert!(state.toggle_flash());
        assert!(!state.toggle_flash());
        state.set_flash(true);
        assert!(state.snapshot().flash_on);
    }
}
