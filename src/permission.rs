// SPDX-License-Identifier: GPL-3.0-only

//! Camera access permission
//!
//! The gate asks a [`PermissionBackend`] whether camera access is already
//! available and, when it is not, issues exactly one request. Inside Flatpak
//! the request goes through the XDG camera portal; elsewhere access is
//! decided by the permissions on the `/dev/video*` nodes.

use crate::app::state::StateContainer;
use crate::constants::portal;
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zbus::proxy::SignalStream;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Camera permission as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// Which backend answers permission questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Portal inside Flatpak, device access otherwise
    #[default]
    Auto,
    Device,
    Portal,
    /// Always granted (still images, testing)
    AlwaysGrant,
}

/// Source of camera access decisions
pub trait PermissionBackend: Send + Sync {
    /// Current state without prompting
    fn check(&self) -> PermissionState;

    /// Ask for access; may show a system dialog. Resolves to whether access
    /// was granted.
    fn request(&self) -> BoxFuture<'static, bool>;

    fn name(&self) -> &'static str;
}

/// Create the backend for a permission mode
pub fn backend_for_mode(mode: PermissionMode) -> Box<dyn PermissionBackend> {
    let mode = match mode {
        PermissionMode::Auto if is_flatpak() => PermissionMode::Portal,
        PermissionMode::Auto => PermissionMode::Device,
        other => other,
    };
    debug!(?mode, "Selected permission backend");

    match mode {
        PermissionMode::Portal => Box::new(PortalPermission),
        PermissionMode::AlwaysGrant => Box::new(StaticPermission::granted()),
        _ => Box::new(DevicePermission::new()),
    }
}

/// Check if running inside a Flatpak sandbox
pub fn is_flatpak() -> bool {
    Path::new(portal::FLATPAK_INFO).exists()
}

/// Gate that decides whether the camera may be started
pub struct PermissionGate {
    backend: Box<dyn PermissionBackend>,
}

impl PermissionGate {
    pub fn new(backend: Box<dyn PermissionBackend>) -> Self {
        Self { backend }
    }

    /// Resolve the permission and record it in `state`
    ///
    /// Granted raises the camera-ready flag. A denial is final for this call;
    /// the next resume asks again.
    pub async fn check_or_request(&self, state: &StateContainer) -> PermissionState {
        let current = self.backend.check();
        if current == PermissionState::Granted {
            state.permission_resolved(PermissionState::Granted);
            return PermissionState::Granted;
        }

        info!(backend = self.backend.name(), ?current, "Requesting camera permission");
        let resolved = if self.backend.request().await {
            PermissionState::Granted
        } else {
            warn!(backend = self.backend.name(), "Camera permission denied");
            PermissionState::Denied
        };

        state.permission_resolved(resolved);
        resolved
    }
}

/// Fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission {
    initial: PermissionState,
    grant_on_request: bool,
}

impl StaticPermission {
    pub fn new(initial: PermissionState, grant_on_request: bool) -> Self {
        Self {
            initial,
            grant_on_request,
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, true)
    }

    pub fn denied() -> Self {
        Self::new(PermissionState::Denied, false)
    }
}

impl PermissionBackend for StaticPermission {
    fn check(&self) -> PermissionState {
        self.initial
    }

    fn request(&self) -> BoxFuture<'static, bool> {
        let granted = self.grant_on_request;
        Box::pin(async move { granted })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Access decided by `/dev/video*` node permissions
#[derive(Debug, Clone)]
pub struct DevicePermission {
    dev_root: PathBuf,
}

impl Default for DevicePermission {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePermission {
    pub fn new() -> Self {
        Self::with_root("/dev")
    }

    /// Look for video nodes under a different directory
    pub fn with_root(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
        }
    }

    fn video_nodes(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dev_root) else {
            return Vec::new();
        };
        let mut nodes: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("video"))
            })
            .collect();
        nodes.sort();
        nodes
    }
}

/// Whether the process may open `path` for reading and writing
fn can_read_write(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

impl PermissionBackend for DevicePermission {
    fn check(&self) -> PermissionState {
        let nodes = self.video_nodes();
        if nodes.is_empty() {
            debug!(root = %self.dev_root.display(), "No video device nodes");
            return PermissionState::Denied;
        }
        if nodes.iter().any(|node| can_read_write(node)) {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    fn request(&self) -> BoxFuture<'static, bool> {
        let granted = self.check() == PermissionState::Granted;
        if !granted && !self.video_nodes().is_empty() {
            warn!("Video devices are not accessible; add your user to the 'video' group");
        }
        Box::pin(async move { granted })
    }

    fn name(&self) -> &'static str {
        "device"
    }
}

/// Access granted through `org.freedesktop.portal.Camera`
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalPermission;

impl PortalPermission {
    async fn access_camera() -> Result<bool, String> {
        let connection = zbus::Connection::session()
            .await
            .map_err(|e| format!("Failed to connect to session D-Bus: {}", e))?;

        let sender = connection
            .unique_name()
            .map(|name| request_sender_component(name.as_str()))
            .ok_or_else(|| "Connection has no unique name".to_string())?;
        let token = format!("qr_scanner_{}", uuid::Uuid::new_v4().simple());
        let request_path = predicted_request_path(&sender, &token);

        // Subscribe before calling so the response cannot be missed
        let mut responses = Self::subscribe_response(&connection, &request_path).await?;

        let camera_proxy = zbus::Proxy::new(
            &connection,
            portal::DESTINATION,
            portal::OBJECT_PATH,
            portal::CAMERA_INTERFACE,
        )
        .await
        .map_err(|e| format!("Failed to create camera portal proxy: {}", e))?;

        let mut options: HashMap<&str, Value> = HashMap::new();
        options.insert("handle_token", Value::new(token.as_str()));
        let handle: OwnedObjectPath = camera_proxy
            .call("AccessCamera", &(options,))
            .await
            .map_err(|e| format!("AccessCamera failed: {}", e))?;
        debug!(handle = %handle, "Camera portal request issued");

        // Older portals ignore handle_token and pick their own request path
        if let Some(actual) = resubscribe_path(&request_path, handle.as_str()) {
            debug!(expected = %request_path, actual, "Portal request path differs, resubscribing");
            responses = Self::subscribe_response(&connection, actual).await?;
        }

        let message = responses
            .next()
            .await
            .ok_or_else(|| "Portal request closed without a response".to_string())?;
        let (code, _results): (u32, HashMap<String, OwnedValue>) = message
            .body()
            .deserialize()
            .map_err(|e| format!("Malformed portal response: {}", e))?;

        debug!(code, "Camera portal responded");
        Ok(code == 0)
    }

    async fn subscribe_response(
        connection: &zbus::Connection,
        path: &str,
    ) -> Result<SignalStream<'static>, String> {
        let request_proxy = zbus::Proxy::new(
            connection,
            portal::DESTINATION,
            path.to_string(),
            portal::REQUEST_INTERFACE,
        )
        .await
        .map_err(|e| format!("Failed to create request proxy: {}", e))?;
        request_proxy
            .receive_signal("Response")
            .await
            .map_err(|e| format!("Failed to subscribe to portal response: {}", e))
    }
}

/// Request object path component for a unique bus name (`:1.42` -> `1_42`)
fn request_sender_component(unique_name: &str) -> String {
    unique_name.trim_start_matches(':').replace('.', "_")
}

/// Request path the portal derives from our sender and `handle_token`
fn predicted_request_path(sender: &str, token: &str) -> String {
    format!("{}/{}/{}", portal::REQUEST_PATH_PREFIX, sender, token)
}

/// The returned request handle when it is not the one already subscribed to
fn resubscribe_path<'a>(predicted: &str, returned: &'a str) -> Option<&'a str> {
    (predicted != returned).then_some(returned)
}

impl PermissionBackend for PortalPermission {
    fn check(&self) -> PermissionState {
        // The portal answers without a dialog once access was granted
        PermissionState::Unknown
    }

    fn request(&self) -> BoxFuture<'static, bool> {
        Box::pin(async {
            match Self::access_camera().await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!(error = %e, "Camera portal request failed");
                    false
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "portal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::ScannerState;
    use crate::backends::camera::types::LensFacing;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state() -> StateContainer {
        StateContainer::new(ScannerState::new("Prashant", LensFacing::Back, false))
    }

    struct CountingPermission {
        check: PermissionState,
        grant: bool,
        requests: Arc<AtomicUsize>,
    }

    impl PermissionBackend for CountingPermission {
        fn check(&self) -> PermissionState {
            self.check
        }

        fn request(&self) -> BoxFuture<'static, bool> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let grant = self.grant;
            Box::pin(async move { grant })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn gate(check: PermissionState, grant: bool) -> (PermissionGate, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let backend = CountingPermission {
            check,
            grant,
            requests: Arc::clone(&requests),
        };
        (PermissionGate::new(Box::new(backend)), requests)
    }

    #[tokio::test]
    async fn test_already_granted_skips_request() {
        let (gate, requests) = gate(PermissionState::Granted, false);
        let state = state();

        assert_eq!(gate.check_or_request(&state).await, PermissionState::Granted);
        assert_eq!(requests.load(Ordering::SeqCst), 0);
        assert!(state.snapshot().should_show_camera);
    }

    #[tokio::test]
    async fn test_request_granted_sets_camera_ready() {
        let (gate, requests) = gate(PermissionState::Unknown, true);
        let state = state();

        assert_eq!(gate.check_or_request(&state).await, PermissionState::Granted);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(state.snapshot().should_show_camera);
    }

    #[tokio::test]
    async fn test_denied_requests_once() {
        let (gate, requests) = gate(PermissionState::Denied, false);
        let state = state();

        assert_eq!(gate.check_or_request(&state).await, PermissionState::Denied);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        let snapshot = state.snapshot();
        assert!(!snapshot.should_show_camera);
        assert_eq!(snapshot.permission, PermissionState::Denied);
    }

    #[test]
    fn test_sender_component() {
        assert_eq!(request_sender_component(":1.42"), "1_42");
        assert_eq!(request_sender_component(":1.2.3"), "1_2_3");
    }

    #[test]
    fn test_request_path_follows_portal_handle() {
        let predicted = predicted_request_path("1_42", "qr_scanner_abc");
        assert_eq!(
            predicted,
            format!("{}/1_42/qr_scanner_abc", portal::REQUEST_PATH_PREFIX)
        );

        // Matching handle keeps the early subscription
        assert_eq!(resubscribe_path(&predicted, &predicted), None);

        let legacy = format!("{}/1_42/t7", portal::REQUEST_PATH_PREFIX);
        assert_eq!(resubscribe_path(&predicted, &legacy), Some(legacy.as_str()));
    }

    #[test]
    fn test_device_permission_without_nodes_is_denied() {
        let root = std::env::temp_dir().join(format!("qr-scanner-dev-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        let permission = DevicePermission::with_root(&root);
        assert_eq!(permission.check(), PermissionState::Denied);

        std::fs::write(root.join("video0"), b"").unwrap();
        assert_eq!(permission.check(), PermissionState::Granted);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        let mode: PermissionMode = serde_json::from_str("\"always_grant\"").unwrap();
        assert_eq!(mode, PermissionMode::AlwaysGrant);
    }
}
