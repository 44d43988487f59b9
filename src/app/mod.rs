// SPDX-License-Identifier: GPL-3.0-only

//! Scanner application core
//!
//! [`ScannerApp`] ties the pieces together: the permission gate unlocks the
//! capture session, the session feeds the frame analyzer, and decoded
//! payloads land in the [`StateContainer`] the front end renders.
//!
//! # Architecture
//!
//! - `frame_processor`: Frame slot, analyzer thread and QR decoder
//! - `state`: Observable UI state and its transitions

pub mod frame_processor;
pub mod state;

use crate::backends::camera::{
    BindRequest, CaptureSessionManager, FrameSender, LensFacing, ProviderFactory,
    ProviderKind, SessionHandle, SessionOutputs, provider_factory,
};
use crate::config::Config;
use crate::permission::{PermissionBackend, PermissionGate, PermissionState, StaticPermission};
use frame_processor::{FrameAnalyzer, FrameDecoder, FrameSlot, QrDetector, log_decode_failure};
use state::{ScannerState, StateContainer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// The scanner: permission, camera session, analysis and UI state
pub struct ScannerApp {
    config: Config,
    state: StateContainer,
    gate: PermissionGate,
    sessions: CaptureSessionManager,
    slot: Arc<FrameSlot>,
    decoder: Option<Box<dyn FrameDecoder>>,
    analyzer: Option<FrameAnalyzer>,
    session: Option<SessionHandle>,
    preview: Option<FrameSender>,
    payload_tx: Option<mpsc::UnboundedSender<String>>,
    shut_down: bool,
}

impl ScannerApp {
    pub fn new(
        config: Config,
        permission: Box<dyn PermissionBackend>,
        factory: ProviderFactory,
        decoder: Box<dyn FrameDecoder>,
    ) -> Self {
        let state = StateContainer::new(ScannerState::new(
            config.initial_text.clone(),
            config.lens_facing,
            config.torch_on_start,
        ));
        let slot = Arc::new(FrameSlot::new(config.backpressure));

        Self {
            config,
            state,
            gate: PermissionGate::new(permission),
            sessions: CaptureSessionManager::new(factory),
            slot,
            decoder: Some(decoder),
            analyzer: None,
            session: None,
            preview: None,
            payload_tx: None,
            shut_down: false,
        }
    }

    /// Live camera (or `source` image) with the QR detector
    ///
    /// An image source needs no camera permission.
    pub fn from_config(config: Config, source: Option<PathBuf>) -> Self {
        let (permission, kind): (Box<dyn PermissionBackend>, ProviderKind) = match source {
            Some(path) => (
                Box::new(StaticPermission::granted()),
                ProviderKind::Image {
                    path,
                    frame_rate: config.virtual_frame_rate,
                },
            ),
            None => (
                crate::permission::backend_for_mode(config.permission),
                ProviderKind::Device,
            ),
        };
        let decoder = Box::new(QrDetector::with_max_dimension(config.max_decode_dimension));
        Self::new(config, permission, provider_factory(kind), decoder)
    }

    /// Deliver preview frames to `sender` from the next session on
    pub fn with_preview(mut self, sender: FrameSender) -> Self {
        self.preview = Some(sender);
        self
    }

    /// Every decoded payload, in decode order, repeats included
    ///
    /// Must be called before the first [`resume`](Self::resume).
    pub fn subscribe_payloads(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.payload_tx = Some(tx);
        rx
    }

    pub fn state(&self) -> &StateContainer {
        &self.state
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn provider_acquired(&self) -> bool {
        self.sessions.provider_acquired()
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.analyzer.as_ref().map(|a| a.frames_analyzed()).unwrap_or(0)
    }

    /// Check permission and start the camera when allowed
    ///
    /// Safe to call repeatedly; an active session is left alone.
    pub async fn resume(&mut self) -> PermissionState {
        if self.shut_down {
            debug!("Resume after shutdown ignored");
            return self.state.snapshot().permission;
        }

        let permission = self.gate.check_or_request(&self.state).await;
        if self.state.snapshot().should_show_camera && self.session.is_none() {
            self.start_camera().await;
        }
        permission
    }

    /// Flip the torch and rebind the session once
    pub fn toggle_flash(&mut self) -> bool {
        let flash_on = self.state.toggle_flash();
        info!(flash_on, "Torch toggled");
        self.rebind();
        flash_on
    }

    /// Switch between back and front lens and rebind the session once
    pub fn switch_lens(&mut self) -> LensFacing {
        let lens = self.state.snapshot().lens.toggled();
        self.state.set_lens(lens);
        info!(%lens, "Lens switched");
        self.rebind();
        lens
    }

    /// Release the session, stop analysis and hide the camera view
    pub fn shutdown(&mut self) {
        // Unblocks a producer waiting in `offer` under BlockProducer
        self.slot.close();
        if let Some(handle) = self.session.take() {
            self.sessions.stop(handle);
        }
        if let Some(mut analyzer) = self.analyzer.take() {
            analyzer.shutdown();
        }
        if !self.shut_down {
            self.state.camera_closed();
            self.shut_down = true;
            info!("Scanner shut down");
        }
    }

    fn bind_request(&self) -> BindRequest {
        let snapshot = self.state.snapshot();
        BindRequest {
            lens: snapshot.lens,
            torch: snapshot.flash_on,
            preview_resolution: self.config.preview_resolution,
            analysis_resolution: self.config.analysis_resolution,
            device: self.config.camera_device.clone(),
        }
    }

    fn outputs(&self) -> SessionOutputs {
        SessionOutputs {
            analysis: Arc::clone(&self.slot),
            preview: self.preview.clone(),
        }
    }

    fn ensure_analyzer(&mut self) {
        if self.analyzer.is_some() {
            return;
        }
        let Some(decoder) = self.decoder.take() else {
            return;
        };

        let state = self.state.clone();
        let payload_tx = self.payload_tx.clone();
        self.analyzer = Some(FrameAnalyzer::spawn(
            Arc::clone(&self.slot),
            decoder,
            move |payload| {
                state.payload_decoded(&payload);
                if let Some(tx) = &payload_tx {
                    let _ = tx.send(payload);
                }
            },
            log_decode_failure,
        ));
    }

    async fn start_camera(&mut self) {
        self.ensure_analyzer();

        let request = self.bind_request();
        match self.sessions.start(request, self.outputs()).await {
            Ok(handle) => {
                debug!(generation = handle.generation(), "Camera session active");
                self.session = Some(handle);
            }
            Err(e) => error!(error = %e, "Camera session could not be started"),
        }
    }

    fn rebind(&mut self) {
        let request = self.bind_request();
        let Some(handle) = self.session.as_mut() else {
            debug!("No active session; new settings apply on next start");
            return;
        };
        if let Err(e) = self.sessions.rebind(handle, request) {
            error!(error = %e, "Camera session could not be rebound");
            // The provider is already unbound; the next resume starts afresh
            self.session = None;
        }
    }
}

impl Drop for ScannerApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
