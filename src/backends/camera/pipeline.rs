// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer V4L2 camera provider
//!
//! One pipeline per bind: `v4l2src` decoded and center-cropped to a square,
//! then split by a `tee` into a preview branch (RGBA) and an analysis branch
//! (GRAY8). Each branch ends in an appsink whose callback turns samples into
//! [`CameraFrame`]s that borrow the mapped GStreamer buffer.

use super::enumeration::{enumerate_capture_devices, select_device};
use super::types::*;
use super::{BindRequest, CameraProvider, SessionOutputs};
use crate::app::frame_processor::{BackpressureStrategy, Offer};
use crate::constants::pipeline;
use crate::flash::TorchControl;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Bus state wait after Null, in seconds
const STOP_TIMEOUT_SECS: u64 = 2;

struct ActivePipeline {
    pipeline: gstreamer::Pipeline,
    sinks: Vec<AppSink>,
    torch: TorchControl,
    torch_on: bool,
    device: CameraDevice,
}

/// Camera provider backed by GStreamer's `v4l2src`
pub struct GStreamerProvider {
    active: Option<ActivePipeline>,
}

impl GStreamerProvider {
    /// Initialize GStreamer; fails when the library cannot be loaded
    pub fn new() -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        debug!("GStreamer initialized successfully");
        Ok(Self { active: None })
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a.max(1) } else { gcd(b, a % b) }
}

/// Build the `gst-launch` description for one session
///
/// The preview branch is omitted when `preview` is `None`. Under
/// [`BackpressureStrategy::KeepOnlyLatest`] the analysis queue leaks old
/// buffers; under [`BackpressureStrategy::BlockProducer`] it holds one buffer
/// and stalls upstream.
pub fn build_pipeline_description(
    device_path: &str,
    preview: Option<Resolution>,
    analysis: Resolution,
    strategy: BackpressureStrategy,
) -> String {
    let crop_to = preview.unwrap_or(analysis);
    let divisor = gcd(crop_to.width, crop_to.height);

    let mut description = format!(
        "v4l2src device={} ! decodebin ! videoconvert ! \
         aspectratiocrop aspect-ratio={}/{} ! tee name=t",
        device_path,
        crop_to.width / divisor,
        crop_to.height / divisor,
    );

    if let Some(preview) = preview {
        description.push_str(&format!(
            " t. ! queue leaky=downstream max-size-buffers={} ! videoscale ! videoconvert ! \
             video/x-raw,format={},width={},height={} ! appsink name={}",
            pipeline::PREVIEW_MAX_BUFFERS,
            PixelFormat::RGBA.to_gst_format_string(),
            preview.width,
            preview.height,
            pipeline::PREVIEW_SINK_NAME,
        ));
    }

    let leaky = match strategy {
        BackpressureStrategy::KeepOnlyLatest => "leaky=downstream ",
        BackpressureStrategy::BlockProducer => "",
    };
    description.push_str(&format!(
        " t. ! queue {}max-size-buffers={} ! videoscale ! videoconvert ! \
         video/x-raw,format={},width={},height={} ! appsink name={}",
        leaky,
        pipeline::ANALYSIS_MAX_BUFFERS,
        PixelFormat::Gray8.to_gst_format_string(),
        analysis.width,
        analysis.height,
        pipeline::ANALYSIS_SINK_NAME,
    ));

    description
}

/// Wrap a sample's buffer in a frame without copying
fn frame_from_sample(
    sample: &gstreamer::Sample,
    format: PixelFormat,
) -> Result<CameraFrame, gstreamer::FlowError> {
    let captured_at = Instant::now();
    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
    let info = VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;

    let buffer = sample.buffer_owned().ok_or(gstreamer::FlowError::Error)?;
    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
        return Err(gstreamer::FlowError::Error);
    }
    let mapped = buffer
        .into_mapped_buffer_readable()
        .map_err(|_| gstreamer::FlowError::Error)?;

    Ok(CameraFrame {
        width: info.width(),
        height: info.height(),
        stride: info.stride()[0] as u32,
        data: FrameData::from_mapped_buffer(mapped),
        format,
        captured_at,
    })
}

fn appsink(pipeline: &gstreamer::Pipeline, name: &str) -> BackendResult<AppSink> {
    pipeline
        .by_name(name)
        .ok_or_else(|| BackendError::PipelineFailed(format!("Missing appsink '{}'", name)))?
        .dynamic_cast::<AppSink>()
        .map_err(|_| BackendError::PipelineFailed(format!("Element '{}' is not an appsink", name)))
}

fn attach_analysis_sink(sink: &AppSink, outputs: &SessionOutputs) {
    let slot = Arc::clone(&outputs.analysis);
    let keep_latest = slot.strategy() == BackpressureStrategy::KeepOnlyLatest;

    sink.set_property("emit-signals", false);
    sink.set_property("sync", false);
    sink.set_property("max-buffers", pipeline::ANALYSIS_MAX_BUFFERS);
    sink.set_property("drop", keep_latest);
    sink.set_property("enable-last-sample", false);

    sink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                let frame = frame_from_sample(&sample, PixelFormat::Gray8)?;
                if slot.offer(Arc::new(frame)) == Offer::Closed {
                    trace!("Analysis slot closed; frame discarded");
                }
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );
}

fn attach_preview_sink(sink: &AppSink, mut sender: FrameSender) {
    static PREVIEW_DROPS: AtomicU64 = AtomicU64::new(0);

    sink.set_property("emit-signals", false);
    sink.set_property("sync", false);
    sink.set_property("max-buffers", pipeline::PREVIEW_MAX_BUFFERS);
    sink.set_property("drop", true);
    sink.set_property("enable-last-sample", false);

    sink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                let frame = frame_from_sample(&sample, PixelFormat::RGBA)?;
                if sender.try_send(frame).is_err() {
                    let drops = PREVIEW_DROPS.fetch_add(1, Ordering::Relaxed) + 1;
                    if drops % 60 == 0 {
                        debug!(drops, "Preview frames dropped (channel full)");
                    }
                }
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );
}

/// Log asynchronous pipeline errors (device unplugged, negotiation failure)
fn watch_bus(pipeline: &gstreamer::Pipeline) {
    let Some(bus) = pipeline.bus() else {
        return;
    };
    bus.set_sync_handler(|_, msg| {
        match msg.view() {
            gstreamer::MessageView::Error(err) => {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer pipeline error"
                );
            }
            gstreamer::MessageView::Warning(w) => {
                warn!(warning = %w.error(), debug = ?w.debug(), "GStreamer pipeline warning");
            }
            _ => {}
        }
        gstreamer::BusSyncReply::Drop
    });
}

fn stop_pipeline(active: &ActivePipeline) {
    for sink in &active.sinks {
        sink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
    }

    if let Err(e) = active.pipeline.set_state(gstreamer::State::Null) {
        warn!(error = %e, "Failed to stop pipeline");
    }
    let (result, state, _) = active
        .pipeline
        .state(gstreamer::ClockTime::from_seconds(STOP_TIMEOUT_SECS));
    debug!(?result, ?state, "Pipeline stopped");
}

impl CameraProvider for GStreamerProvider {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        enumerate_capture_devices()
    }

    fn bind(&mut self, request: &BindRequest, outputs: SessionOutputs) -> BackendResult<()> {
        let devices = if request.device.is_some() {
            Vec::new()
        } else {
            enumerate_capture_devices()
        };
        let device = select_device(&devices, request.lens, request.device.as_deref())
            .ok_or_else(|| BackendError::DeviceNotFound("No capture devices".to_string()))?;

        let preview = outputs.preview.as_ref().map(|_| request.preview_resolution);
        let description = build_pipeline_description(
            &device.path,
            preview,
            request.analysis_resolution,
            outputs.analysis.strategy(),
        );
        info!(device = %device.path, facing = %device.facing, pipeline = %description, "Creating capture pipeline");

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| BackendError::PipelineFailed(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| BackendError::PipelineFailed("Failed to downcast to Pipeline".into()))?;

        let mut sinks = Vec::with_capacity(2);
        let analysis_sink = appsink(&pipeline, pipeline::ANALYSIS_SINK_NAME)?;
        attach_analysis_sink(&analysis_sink, &outputs);
        sinks.push(analysis_sink);

        if let Some(sender) = outputs.preview.clone() {
            let preview_sink = appsink(&pipeline, pipeline::PREVIEW_SINK_NAME)?;
            attach_preview_sink(&preview_sink, sender);
            sinks.push(preview_sink);
        }

        watch_bus(&pipeline);

        let torch = TorchControl::for_device(Some(&device.path));
        let mut active = ActivePipeline {
            pipeline,
            sinks,
            torch,
            torch_on: false,
            device,
        };

        if let Err(e) = active.pipeline.set_state(gstreamer::State::Playing) {
            stop_pipeline(&active);
            return Err(BackendError::PipelineFailed(format!(
                "Failed to start pipeline: {}",
                e
            )));
        }

        if request.torch {
            active.torch.set(true);
            active.torch_on = active.torch.is_available();
        }

        self.active = Some(active);
        Ok(())
    }

    fn unbind_all(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if active.torch_on {
            active.torch.set(false);
        }
        stop_pipeline(&active);
        info!(device = %active.device.path, "Capture pipeline released");
    }

    fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::GStreamer
    }
}

impl Drop for GStreamerProvider {
    fn drop(&mut self) {
        self.unbind_all();
    }
}
