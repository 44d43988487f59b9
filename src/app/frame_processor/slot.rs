// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot frame hand-off between the capture pipeline and the analyzer
//!
//! The analysis output never queues more than one frame. With
//! [`BackpressureStrategy::KeepOnlyLatest`] a new frame replaces an
//! unconsumed one and the producer never waits; with
//! [`BackpressureStrategy::BlockProducer`] the producer waits until the
//! analyzer has taken the previous frame.

use crate::backends::camera::types::CameraFrame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::trace;

/// How frames are handled when the analyzer is slower than the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Drop the older unprocessed frame and keep the newest
    #[default]
    KeepOnlyLatest,
    /// Stall the producer until the pending frame is consumed
    BlockProducer,
}

/// Outcome of offering a frame to the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Slot was empty
    Stored,
    /// An unconsumed frame was dropped in favour of this one
    Replaced,
    /// Slot is closed; the frame was discarded
    Closed,
}

#[derive(Default)]
struct SlotInner {
    frame: Option<Arc<CameraFrame>>,
    closed: bool,
}

/// One-frame channel with replace semantics
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    /// Signalled when a frame arrives or the slot closes
    filled: Condvar,
    /// Signalled when a frame is taken or the slot closes
    drained: Condvar,
    strategy: BackpressureStrategy,
    dropped: AtomicU64,
}

impl FrameSlot {
    pub fn new(strategy: BackpressureStrategy) -> Self {
        Self {
            inner: Mutex::new(SlotInner::default()),
            filled: Condvar::new(),
            drained: Condvar::new(),
            strategy,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn strategy(&self) -> BackpressureStrategy {
        self.strategy
    }

    // A panicking decoder must not wedge the capture thread
    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand a frame to the analyzer
    pub fn offer(&self, frame: Arc<CameraFrame>) -> Offer {
        let mut inner = self.lock();

        if self.strategy == BackpressureStrategy::BlockProducer {
            while inner.frame.is_some() && !inner.closed {
                inner = self.drained.wait(inner).unwrap_or_else(|e| e.into_inner());
            }
        }

        if inner.closed {
            return Offer::Closed;
        }

        let outcome = match inner.frame.replace(frame) {
            Some(_stale) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped, "Replaced unconsumed analysis frame");
                Offer::Replaced
            }
            None => Offer::Stored,
        };
        drop(inner);
        self.filled.notify_one();
        outcome
    }

    /// Wait for the next frame. Returns `None` once the slot is closed.
    pub fn take(&self) -> Option<Arc<CameraFrame>> {
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(frame) = inner.frame.take() {
                drop(inner);
                self.drained.notify_all();
                return Some(frame);
            }
            inner = self.filled.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Take the pending frame without waiting
    pub fn try_take(&self) -> Option<Arc<CameraFrame>> {
        let frame = self.lock().frame.take();
        if frame.is_some() {
            self.drained.notify_all();
        }
        frame
    }

    /// Close the slot, discarding any pending frame and waking both sides
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.frame = None;
        drop(inner);
        self.filled.notify_all();
        self.drained.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of frames dropped by replacement since creation
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("strategy", &self.strategy)
            .field("dropped", &self.dropped_frames())
            .field("closed", &self.is_closed())
            .finish()
    }
}
