// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture abstraction
//!
//! The session never talks to a device directly. It goes through a
//! [`MediaPlatform`], chosen once at startup, which hands out the acquisition
//! primitive, rendering elements and the optional audio graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │       Session       │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ MediaPlatform Trait │  ← Capability detection, element factory
//! └──────────┬──────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌─────────┐   ┌─────────┐
//! │GStreamer│   │  Fakes  │  ← Concrete implementations
//! └─────────┘   └─────────┘
//! ```

pub mod gst;
pub mod types;

pub use types::*;

use crate::backends::audio::AudioGraph;
use futures::future::BoxFuture;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest-frame channel shared by a stream and the elements rendering it
pub type FrameReceiver = watch::Receiver<Option<Arc<CameraFrame>>>;

/// Sending half of [`FrameReceiver`]
pub type FrameSender = watch::Sender<Option<Arc<CameraFrame>>>;

/// Callback fired by a [`VideoElement`] when its first frame is displayable
pub type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// Device-media acquisition primitive
pub trait MediaDevices: Send + Sync {
    /// Request a live stream
    ///
    /// One-shot: the returned future resolves once with either the stream or
    /// the reason the request failed. It cannot be cancelled once issued.
    fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> BoxFuture<'static, BackendResult<Arc<dyn MediaStream>>>;
}

/// A live audio/video source obtained from a device
pub trait MediaStream: Send + Sync {
    /// Identifier unique to this stream
    fn id(&self) -> &str;

    /// Whether a microphone track was granted
    fn has_audio(&self) -> bool;

    /// Subscribe to decoded video frames
    fn frames(&self) -> FrameReceiver;

    /// Release the device; idempotent
    fn stop(&self);

    /// Whether [`MediaStream::stop`] has been called
    fn is_stopped(&self) -> bool;

    /// Access the concrete stream, for graphs tied to one backend
    fn as_any(&self) -> &dyn Any;
}

/// Element that renders a live stream
pub trait VideoElement: Send + Sync {
    /// Set the rendering height in pixels
    fn set_height(&self, height: u32);

    fn height(&self) -> Option<u32>;

    /// Bind a stream as the element's source
    fn set_source(&self, stream: Arc<dyn MediaStream>, url: StreamUrl);

    /// Register a callback for the "ready to render" signal
    fn on_ready(&self, callback: ReadyCallback);

    /// Begin playback of the bound source
    fn play(&self);

    /// Frame currently displayed, if any
    fn current_frame(&self) -> Option<Arc<CameraFrame>>;

    /// Stop rendering and drop the source
    fn remove(&self);
}

/// Container the rendering element is attached to
pub trait RenderTarget: Send + Sync {
    fn attach(&self, element: &Arc<dyn VideoElement>);

    fn detach(&self, element: &Arc<dyn VideoElement>);
}

/// Capability/adapter layer exposing one normalized acquisition interface
pub trait MediaPlatform: Send + Sync {
    /// The acquisition primitive, or `None` when capture is unsupported here
    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>>;

    /// Create a detached rendering element
    fn create_video_element(&self) -> Arc<dyn VideoElement>;

    /// The audio filter graph primitive, if this platform has one
    fn audio_graph(&self) -> Option<Arc<dyn AudioGraph>>;

    /// Mint a disposable resource URL for a stream
    fn create_stream_url(&self, stream: &dyn MediaStream) -> StreamUrl {
        StreamUrl::for_stream(stream.id())
    }

    /// Release a URL created by [`MediaPlatform::create_stream_url`]
    fn revoke_stream_url(&self, _url: &StreamUrl) {}
}

/// Get the default platform (GStreamer)
pub fn default_platform() -> Arc<dyn MediaPlatform> {
    Arc::new(gst::GstPlatform::detect())
}
