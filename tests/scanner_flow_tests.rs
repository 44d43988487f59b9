// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end scanner scenarios with a scripted camera, decoder and permission

use qr_scanner::app::frame_processor::{FnDecoder, FrameDecoder};
use qr_scanner::backends::camera::{
    BackendError, BackendResult, BindRequest, CameraBackendType, CameraDevice, CameraFrame,
    CameraProvider, LensFacing, PixelFormat, ProviderFactory, SessionOutputs,
};
use qr_scanner::errors::DecodeError;
use qr_scanner::permission::StaticPermission;
use qr_scanner::{Config, PermissionState, ScannerApp, StateContainer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Bind { torch: bool, lens: LensFacing },
    Unbind,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// Records calls and offers one frame per successful bind
struct ScriptedProvider {
    calls: CallLog,
    fail_bind: Arc<AtomicBool>,
    camera_flag_at_bind: Arc<Mutex<Vec<bool>>>,
    state: Arc<Mutex<Option<StateContainer>>>,
    bound: bool,
}

impl CameraProvider for ScriptedProvider {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        vec![CameraDevice {
            name: "Scripted".to_string(),
            path: "/dev/video-test".to_string(),
            driver: None,
            facing: LensFacing::Back,
        }]
    }

    fn bind(&mut self, request: &BindRequest, outputs: SessionOutputs) -> BackendResult<()> {
        self.calls.lock().unwrap().push(Call::Bind {
            torch: request.torch,
            lens: request.lens,
        });
        if let Some(state) = self.state.lock().unwrap().as_ref() {
            self.camera_flag_at_bind
                .lock()
                .unwrap()
                .push(state.snapshot().should_show_camera);
        }
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(BackendError::PipelineFailed("scripted failure".to_string()));
        }
        self.bound = true;
        let frame = CameraFrame::from_packed(4, 4, PixelFormat::Gray8, vec![128; 16]);
        outputs.analysis.offer(Arc::new(frame));
        Ok(())
    }

    fn unbind_all(&mut self) {
        self.calls.lock().unwrap().push(Call::Unbind);
        self.bound = false;
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Virtual
    }
}

struct Harness {
    calls: CallLog,
    factory_ran: Arc<AtomicBool>,
    fail_bind: Arc<AtomicBool>,
    camera_flag_at_bind: Arc<Mutex<Vec<bool>>>,
    state: Arc<Mutex<Option<StateContainer>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            factory_ran: Arc::new(AtomicBool::new(false)),
            fail_bind: Arc::new(AtomicBool::new(false)),
            camera_flag_at_bind: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(None)),
        }
    }

    fn factory(&self, fail_bind: bool) -> ProviderFactory {
        self.fail_bind.store(fail_bind, Ordering::SeqCst);
        let calls = Arc::clone(&self.calls);
        let factory_ran = Arc::clone(&self.factory_ran);
        let fail_bind = Arc::clone(&self.fail_bind);
        let camera_flag_at_bind = Arc::clone(&self.camera_flag_at_bind);
        let state = Arc::clone(&self.state);
        Box::new(move || {
            factory_ran.store(true, Ordering::SeqCst);
            Ok(Box::new(ScriptedProvider {
                calls,
                fail_bind,
                camera_flag_at_bind,
                state,
                bound: false,
            }) as Box<dyn CameraProvider>)
        })
    }

    fn set_fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    /// Let the provider record `should_show_camera` as seen at each bind
    fn observe(&self, state: &StateContainer) {
        *self.state.lock().unwrap() = Some(state.clone());
    }

    fn camera_flag_at_bind(&self) -> Vec<bool> {
        self.camera_flag_at_bind.lock().unwrap().clone()
    }

    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

fn decoder_returning(text: &'static str) -> Box<dyn FrameDecoder> {
    Box::new(FnDecoder(move |_frame: &CameraFrame| -> Result<String, DecodeError> {
        Ok(text.to_string())
    }))
}

async fn wait_for_text(app: &ScannerApp, text: &str) {
    let mut rx = app.state().subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.display_text == text))
        .await
        .expect("timed out waiting for decoded text")
        .expect("state container dropped");
}

#[tokio::test]
async fn test_granted_permission_shows_decoded_text() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning("  HELLO\n"),
    );
    assert_eq!(app.state().snapshot().display_text, "Prashant");

    let permission = app.resume().await;
    assert_eq!(permission, PermissionState::Granted);
    assert!(app.state().snapshot().should_show_camera);
    assert!(app.is_session_active());

    wait_for_text(&app, "HELLO").await;
    assert!(app.frames_analyzed() >= 1);
}

#[tokio::test]
async fn test_denied_permission_never_touches_camera() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::denied()),
        harness.factory(false),
        decoder_returning("HELLO"),
    );

    let permission = app.resume().await;
    assert_eq!(permission, PermissionState::Denied);

    let state = app.state().snapshot();
    assert_eq!(state.display_text, "Prashant");
    assert!(!state.should_show_camera);
    assert!(!app.provider_acquired());
    assert!(!app.is_session_active());
    assert_eq!(app.frames_analyzed(), 0);
    assert!(!harness.factory_ran.load(Ordering::SeqCst));
    assert!(harness.take_calls().is_empty());
}

#[tokio::test]
async fn test_flash_toggle_rebinds_once() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning("HELLO"),
    );
    app.resume().await;
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: false,
                lens: LensFacing::Back
            }
        ]
    );

    assert!(app.toggle_flash());
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: true,
                lens: LensFacing::Back
            }
        ]
    );
    assert!(app.state().snapshot().flash_on);
}

#[tokio::test]
async fn test_lens_switch_rebinds_once() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning("HELLO"),
    );
    app.resume().await;
    harness.take_calls();

    assert_eq!(app.switch_lens(), LensFacing::Front);
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: false,
                lens: LensFacing::Front
            }
        ]
    );
}

#[tokio::test]
async fn test_repeated_resume_keeps_session() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning("HELLO"),
    );
    app.resume().await;
    harness.take_calls();

    assert_eq!(app.resume().await, PermissionState::Granted);
    assert!(harness.take_calls().is_empty());
    assert!(app.is_session_active());
}

#[tokio::test]
async fn test_bind_failure_is_swallowed() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(true),
        decoder_returning("HELLO"),
    );

    harness.observe(app.state());

    let permission = app.resume().await;
    assert_eq!(permission, PermissionState::Granted);

    // Permission raised the flag before the bind; the failed bind leaves it alone
    assert_eq!(harness.camera_flag_at_bind(), vec![true]);
    assert!(app.state().snapshot().should_show_camera);
    assert!(!app.is_session_active());
    assert_eq!(app.state().snapshot().display_text, "Prashant");

    // Toggling without a session only changes state
    assert!(app.toggle_flash());
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: false,
                lens: LensFacing::Back
            }
        ]
    );
}

#[tokio::test]
async fn test_failed_rebind_restarts_on_resume() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning("HELLO"),
    );
    app.resume().await;
    assert!(app.is_session_active());
    harness.take_calls();

    harness.set_fail_bind(true);
    assert!(app.toggle_flash());
    assert!(!app.is_session_active());
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: true,
                lens: LensFacing::Back
            },
            Call::Unbind
        ]
    );

    harness.set_fail_bind(false);
    assert_eq!(app.resume().await, PermissionState::Granted);
    assert!(app.is_session_active());
    assert_eq!(
        harness.take_calls(),
        vec![
            Call::Unbind,
            Call::Bind {
                torch: true,
                lens: LensFacing::Back
            }
        ]
    );
}

#[tokio::test]
async fn test_payloads_are_streamed_and_shutdown_releases() {
    let harness = Harness::new();
    let mut app = ScannerApp::new(
        Config::default(),
        Box::new(StaticPermission::granted()),
        harness.factory(false),
        decoder_returning(" HELLO "),
    );
    let mut payloads = app.subscribe_payloads();

    app.resume().await;
    let first = tokio::time::timeout(Duration::from_secs(5), payloads.recv())
        .await
        .expect("timed out waiting for payload");
    assert_eq!(first.as_deref(), Some("HELLO"));

    harness.take_calls();
    app.shutdown();
    assert!(!app.is_session_active());
    assert!(!app.state().snapshot().should_show_camera);
    assert_eq!(harness.take_calls(), vec![Call::Unbind]);

    // Shutdown is terminal
    app.shutdown();
    app.resume().await;
    assert!(!app.is_session_active());
}
