// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture platform
//!
//! Capability detection happens once in [`GstPlatform::detect`]. Streams come
//! from an `autovideosrc` pipeline feeding an RGBA appsink, and are rendered by
//! off-screen [`HeadlessVideoElement`]s.

mod element;
mod pipeline;

pub use element::{HeadlessTarget, HeadlessVideoElement};
pub use pipeline::GstStream;

use super::types::*;
use super::{MediaDevices, MediaPlatform, MediaStream, VideoElement};
use crate::backends::audio::{AudioGraph, GstAudioGraph};
use crate::constants::pipeline as pipeline_consts;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platform backed by GStreamer
pub struct GstPlatform {
    devices: Option<Arc<dyn MediaDevices>>,
}

impl GstPlatform {
    /// Initialise GStreamer and probe for the elements capture needs
    pub fn detect() -> Self {
        if let Err(e) = gstreamer::init() {
            warn!(error = %e, "GStreamer unavailable, media capture disabled");
            return Self { devices: None };
        }

        let video = missing_elements(&pipeline_consts::REQUIRED_VIDEO_ELEMENTS);
        let mut audio = missing_elements(&pipeline_consts::REQUIRED_AUDIO_CAPTURE_ELEMENTS);
        audio.extend(missing_elements(&pipeline_consts::REQUIRED_AUDIO_FILTER_ELEMENTS));

        if !video.is_empty() {
            warn!(missing = ?video, "Video capture elements missing");
        }
        if !audio.is_empty() {
            debug!(missing = ?audio, "Audio filter elements missing");
        }

        info!(
            video = video.is_empty(),
            audio = audio.is_empty(),
            "GStreamer platform detected"
        );

        Self {
            devices: video
                .is_empty()
                .then(|| Arc::new(GstMediaDevices) as Arc<dyn MediaDevices>),
        }
    }
}

impl MediaPlatform for GstPlatform {
    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>> {
        self.devices.clone()
    }

    fn create_video_element(&self) -> Arc<dyn VideoElement> {
        Arc::new(HeadlessVideoElement::new())
    }

    fn audio_graph(&self) -> Option<Arc<dyn AudioGraph>> {
        // One graph per session; it reports missing elements when wiring fails
        Some(Arc::new(GstAudioGraph::new()))
    }
}

/// Acquisition primitive opening the default camera
pub struct GstMediaDevices;

impl MediaDevices for GstMediaDevices {
    fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> BoxFuture<'static, BackendResult<Arc<dyn MediaStream>>> {
        Box::pin(async move {
            if !constraints.video {
                return Err(BackendError::InitializationFailed(
                    "Video track is required".to_string(),
                ));
            }

            // Opening the device blocks until the pipeline reaches PLAYING
            let stream = tokio::task::spawn_blocking(move || GstStream::open(constraints))
                .await
                .map_err(|e| BackendError::Other(format!("Acquisition task failed: {}", e)))??;

            Ok(Arc::new(stream) as Arc<dyn MediaStream>)
        })
    }
}

/// Names of element factories not registered with GStreamer
pub(crate) fn missing_elements(names: &[&'static str]) -> Vec<&'static str> {
    names
        .iter()
        .copied()
        .filter(|name| gstreamer::ElementFactory::find(name).is_none())
        .collect()
}
