// SPDX-License-Identifier: GPL-3.0-only

//! Audio filter graph
//!
//! Routes the stream's microphone through a low-pass filter to the default
//! output. Failure here is never fatal to the video path.

use crate::backends::camera::MediaStream;
use crate::backends::camera::gst::{GstStream, missing_elements};
use crate::constants::pipeline;
use crate::errors::AudioError;
use gstreamer::prelude::*;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Audio filter graph primitive
pub trait AudioGraph: Send + Sync {
    /// Build source and filter nodes for the stream and connect them to the output
    fn connect_filter(&self, stream: &dyn MediaStream) -> Result<(), AudioError>;

    /// Tear the graph down; idempotent
    fn disconnect(&self);
}

/// Filter branch hanging off a stream's microphone tee
struct Branch {
    pipeline: gstreamer::Pipeline,
    tee: gstreamer::Element,
    tee_pad: gstreamer::Pad,
    elements: Vec<gstreamer::Element>,
}

impl Branch {
    fn remove(self) {
        if let Some(peer) = self.tee_pad.peer() {
            let _ = self.tee_pad.unlink(&peer);
        }
        self.tee.release_request_pad(&self.tee_pad);
        for element in &self.elements {
            let _ = element.set_state(gstreamer::State::Null);
        }
        if let Err(e) = self.pipeline.remove_many(&self.elements) {
            warn!(error = %e, "Failed to remove audio filter elements");
        }
    }
}

/// GStreamer implementation of [`AudioGraph`]
///
/// Only works with [`GstStream`]s that were opened with audio.
#[derive(Default)]
pub struct GstAudioGraph {
    branch: Mutex<Option<Branch>>,
}

impl GstAudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(
        pipeline: &gstreamer::Pipeline,
        tee: &gstreamer::Element,
    ) -> Result<Branch, AudioError> {
        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory)
                .build()
                .map_err(|_| AudioError::ElementMissing(factory.to_string()))
        };
        let start_failed = |e: gstreamer::glib::BoolError| AudioError::StartFailed(e.to_string());

        let filter = make("audiocheblimit")?;
        filter.set_property_from_str("mode", "low-pass");
        filter.set_property_from_str("cutoff", pipeline::AUDIO_CUTOFF_HZ);

        let elements = vec![
            make("queue")?,
            make("audioconvert")?,
            filter,
            make("audioconvert")?,
            make("autoaudiosink")?,
        ];

        pipeline.add_many(&elements).map_err(start_failed)?;

        let tee_pad = match tee.request_pad_simple("src_%u") {
            Some(pad) => pad,
            None => {
                let _ = pipeline.remove_many(&elements);
                return Err(AudioError::StartFailed(
                    "Microphone tee refused a new branch".to_string(),
                ));
            }
        };
        let branch = Branch {
            pipeline: pipeline.clone(),
            tee: tee.clone(),
            tee_pad,
            elements,
        };

        if let Err(e) = Self::link(&branch) {
            branch.remove();
            return Err(e);
        }
        Ok(branch)
    }

    fn link(branch: &Branch) -> Result<(), AudioError> {
        gstreamer::Element::link_many(&branch.elements)
            .map_err(|e| AudioError::StartFailed(e.to_string()))?;

        let queue_pad = branch
            .elements
            .first()
            .and_then(|queue| queue.static_pad("sink"))
            .ok_or_else(|| AudioError::StartFailed("Filter queue has no sink pad".to_string()))?;
        branch
            .tee_pad
            .link(&queue_pad)
            .map_err(|e| AudioError::StartFailed(format!("{:?}", e)))?;

        // Downstream first so data never reaches a stopped element
        for element in branch.elements.iter().rev() {
            element
                .sync_state_with_parent()
                .map_err(|e| AudioError::StartFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl AudioGraph for GstAudioGraph {
    fn connect_filter(&self, stream: &dyn MediaStream) -> Result<(), AudioError> {
        if !stream.has_audio() {
            return Err(AudioError::NoAudioTrack);
        }

        let Some(gst_stream) = stream.as_any().downcast_ref::<GstStream>() else {
            return Err(AudioError::StartFailed(
                "Stream was not opened by GStreamer".to_string(),
            ));
        };
        let (pipeline, tee) = gst_stream.audio_source().ok_or(AudioError::NoAudioTrack)?;

        if let Some(name) = missing_elements(&pipeline::REQUIRED_AUDIO_FILTER_ELEMENTS).first() {
            return Err(AudioError::ElementMissing(name.to_string()));
        }

        let branch = Self::build(&pipeline, &tee)?;
        info!(stream = %stream.id(), "Audio filter graph connected");

        let previous = self
            .branch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(branch);
        if let Some(previous) = previous {
            previous.remove();
        }
        Ok(())
    }

    fn disconnect(&self) {
        let branch = self.branch.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(branch) = branch {
            debug!("Disconnecting audio filter graph");
            branch.remove();
        }
    }
}

impl Drop for GstAudioGraph {
    fn drop(&mut self) {
        self.disconnect();
    }
}
