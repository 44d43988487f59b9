// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for frame loops
//!
//! Both the frame analyzer and the virtual camera run their loop on a
//! dedicated named thread. This controller gives them the same start, stop
//! and join behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = LoopController::start("frame-analyzer", move || {
///     match slot.take() {
///         Some(frame) => {
///             analyze(&frame);
///             LoopAction::Continue
///         }
///         None => LoopAction::Stop,
///     }
/// });
///
/// slot.close();
/// controller.stop();
/// ```
pub struct LoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl LoopController {
    /// Start a new loop in a named thread
    ///
    /// The closure is called repeatedly until it returns `LoopAction::Stop`
    /// or [`stop`](Self::stop) is called. A closure that blocks must be
    /// woken by its caller before stopping, since the stop signal is only
    /// checked between iterations.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting loop thread");

        let spawn_result = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Loop thread started");

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                info!(name = %name_clone, "Loop thread exiting");
            });

        let thread_handle = match spawn_result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Dropped from inside its own loop; joining would deadlock
                return;
            }
            debug!(name = %self.name, "Waiting for loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "LoopController dropped, stopping loop");
            self.stop();
        }
    }
}
