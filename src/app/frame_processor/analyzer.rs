// SPDX-License-Identifier: GPL-3.0-only

//! Frame analyzer
//!
//! Runs a [`FrameDecoder`] over frames taken from a [`FrameSlot`] on one
//! dedicated thread, so at most one frame is being decoded at any time.
//! Results are reported through two callbacks: the trimmed payload on
//! success, the error on failure. Nothing is retried, and consecutive
//! identical payloads are all reported.

use super::FrameDecoder;
use super::slot::FrameSlot;
use crate::backends::camera::frame_loop::{LoopAction, LoopController};
use crate::constants::threads;
use crate::errors::DecodeError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Log a decode failure at a level matching its severity
pub fn log_decode_failure(error: DecodeError) {
    if error.is_no_code() {
        trace!("Scanner: no code in frame");
    } else {
        warn!(error = %error, "Scanner failed");
    }
}

/// Background decode worker fed by a frame slot
pub struct FrameAnalyzer {
    slot: Arc<FrameSlot>,
    controller: Option<LoopController>,
    analyzed: Arc<AtomicU64>,
}

impl FrameAnalyzer {
    /// Start analyzing frames from `slot`
    pub fn spawn<D, S, F>(slot: Arc<FrameSlot>, mut decoder: D, mut on_success: S, mut on_failure: F) -> Self
    where
        D: FrameDecoder + 'static,
        S: FnMut(String) + Send + 'static,
        F: FnMut(DecodeError) + Send + 'static,
    {
        let analyzed = Arc::new(AtomicU64::new(0));
        let loop_slot = Arc::clone(&slot);
        let loop_analyzed = Arc::clone(&analyzed);

        let controller = LoopController::start(threads::FRAME_ANALYZER, move || {
            let Some(frame) = loop_slot.take() else {
                return LoopAction::Stop;
            };

            let result = catch_unwind(AssertUnwindSafe(|| decoder.decode(&frame)))
                .unwrap_or_else(|_| Err(DecodeError::Corrupt("decoder panicked".to_string())));

            // Hand the buffer back to the pipeline before running callbacks
            drop(frame);
            loop_analyzed.fetch_add(1, Ordering::Relaxed);

            match result {
                Ok(text) => {
                    let payload = text.trim().to_string();
                    debug!(payload = %payload, "Scanner success");
                    on_success(payload);
                }
                Err(e) => on_failure(e),
            }

            LoopAction::Continue
        });

        Self {
            slot,
            controller: Some(controller),
            analyzed,
        }
    }

    /// Number of frames that went through the decoder
    pub fn frames_analyzed(&self) -> u64 {
        self.analyzed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .map(|c| c.is_running())
            .unwrap_or(false)
    }

    /// Stop accepting frames, let the in-flight decode finish, and join
    pub fn shutdown(&mut self) {
        self.slot.close();
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            debug!(
                analyzed = self.frames_analyzed(),
                dropped = self.slot.dropped_frames(),
                "Frame analyzer stopped"
            );
        }
    }
}

impl Drop for FrameAnalyzer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
