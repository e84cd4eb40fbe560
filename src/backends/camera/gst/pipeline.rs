// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer pipeline for camera capture

use super::super::types::*;
use super::super::{FrameReceiver, FrameSender, MediaStream};
use crate::constants::{pipeline, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Live camera stream
///
/// Owns a running `autovideosrc` pipeline whose appsink publishes every RGBA
/// frame into a latest-frame channel. When audio was requested the same
/// pipeline also carries the microphone, ending in a tee that filter graphs
/// branch from.
pub struct GstStream {
    id: String,
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    frames: Arc<FrameSender>,
    mic_tee: Option<gstreamer::Element>,
    stopped: AtomicBool,
}

impl GstStream {
    /// Build the capture pipeline and bring it to PLAYING
    ///
    /// Blocks for up to [`timing::START_TIMEOUT_SECS`].
    pub fn open(constraints: StreamConstraints) -> BackendResult<Self> {
        info!(audio = constraints.audio, "Opening camera stream");

        gstreamer::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        let description = if constraints.audio {
            if let Some(name) = super::missing_elements(&pipeline::REQUIRED_AUDIO_CAPTURE_ELEMENTS)
                .first()
            {
                return Err(BackendError::InitializationFailed(format!(
                    "Audio capture element missing: {}",
                    name
                )));
            }
            format!("{} {}", pipeline::VIDEO_CAPTURE, pipeline::AUDIO_CAPTURE)
        } else {
            pipeline::VIDEO_CAPTURE.to_string()
        };

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| {
                BackendError::InitializationFailed("Launch did not produce a pipeline".to_string())
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| {
                BackendError::InitializationFailed("Failed to cast appsink".to_string())
            })?;

        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let (sender, _) = watch::channel(None);
        let frames = Arc::new(sender);
        let frame_sender = Arc::clone(&frames);
        let frame_counter = AtomicU64::new(0);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);

                    let sample = appsink.pull_sample().map_err(|e| {
                        error!(frame = frame_num, error = ?e, "Failed to pull sample");
                        gstreamer::FlowError::Eos
                    })?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
                    let video_info = VideoInfo::from_caps(caps).map_err(|e| {
                        warn!(frame = frame_num, error = ?e, "Failed to get video info");
                        gstreamer::FlowError::Error
                    })?;
                    let map = buffer
                        .map_readable()
                        .map_err(|_| gstreamer::FlowError::Error)?;

                    let frame = CameraFrame {
                        width: video_info.width(),
                        height: video_info.height(),
                        data: Arc::from(map.as_slice()),
                        format: PixelFormat::RGBA,
                        stride: video_info.stride()[0] as u32,
                        captured_at: Instant::now(),
                    };

                    if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            frame = frame_num,
                            width = frame.width,
                            height = frame.height,
                            stride = frame.stride,
                            "Frame received"
                        );
                    }

                    frame_sender.send_replace(Some(Arc::new(frame)));
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let err = pipeline_error(&pipeline, format!("Failed to start pipeline: {}", e));
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(err);
        }

        let (result, state, pending) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");
        if result.is_err() || state != gstreamer::State::Playing {
            let err = pipeline_error(&pipeline, format!("Pipeline stuck in {:?}", state));
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(err);
        }

        let mic_tee = pipeline.by_name(pipeline::MIC_TEE);
        let id = uuid::Uuid::new_v4().to_string();
        info!(id = %id, audio = mic_tee.is_some(), "Camera stream started");

        Ok(Self {
            id,
            pipeline,
            appsink,
            frames,
            mic_tee,
            stopped: AtomicBool::new(false),
        })
    }

    /// The pipeline and the microphone tee, when the stream carries audio
    pub fn audio_source(&self) -> Option<(gstreamer::Pipeline, gstreamer::Element)> {
        self.mic_tee
            .clone()
            .map(|tee| (self.pipeline.clone(), tee))
    }

    fn shutdown(&self) {
        // Clear appsink callbacks to release all references
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "Failed to stop pipeline");
            return;
        }

        let (result, state, _) = self.pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::STOP_TIMEOUT_SECS,
        ));
        debug!(result = ?result, state = ?state, "Pipeline stopped");
    }
}

impl MediaStream for GstStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_audio(&self) -> bool {
        self.mic_tee.is_some()
    }

    fn frames(&self) -> FrameReceiver {
        self.frames.subscribe()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(id = %self.id, "Stopping camera stream");
        self.shutdown();
        self.frames.send_replace(None);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::SeqCst) {
            debug!(id = %self.id, "Dropping live stream, stopping pipeline");
            self.shutdown();
        }
    }
}

/// Turn the first error on the pipeline bus into a classified backend error
fn pipeline_error(pipeline: &gstreamer::Pipeline, fallback: String) -> BackendError {
    let message = pipeline.bus().and_then(|bus| {
        bus.timed_pop_filtered(
            gstreamer::ClockTime::ZERO,
            &[gstreamer::MessageType::Error],
        )
    });

    let Some(message) = message else {
        return BackendError::InitializationFailed(fallback);
    };

    match message.view() {
        gstreamer::MessageView::Error(err) => {
            let error = err.error();
            warn!(error = %error, debug = ?err.debug(), "Pipeline error");
            if error.matches(gstreamer::ResourceError::NotAuthorized) {
                BackendError::PermissionDenied(error.to_string())
            } else {
                BackendError::InitializationFailed(error.to_string())
            }
        }
        _ => BackendError::InitializationFailed(fallback),
    }
}
