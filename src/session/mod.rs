// SPDX-License-Identifier: GPL-3.0-only

//! Capture session
//!
//! A [`Session`] owns one camera interaction: it acquires the stream, renders
//! it into a target, captures stills on request and runs the QR poll loop.
//! Everything the session reports asynchronously goes through its
//! [`EventBus`].
//!
//! ```text
//!  start() ──▶ MediaDevices::request_stream ──▶ VideoElement ──ready──▶ "start"
//!                        │ failure                    │
//!                        ▼                            ├── take_snapshot() ──▶ "snapshot"
//!                     "error"                         └── QR poll tick ──▶ "qrReadSuccess" / "qrReadError"
//!  stop() ──▶ release stream, halt polling, dispose element ──▶ "stop"
//! ```

pub mod events;
pub mod qr_poll;
pub mod snapshot;
mod state;

pub use events::{EventBus, EventKind, Handler, SessionEvent, handler};
pub use snapshot::Still;
pub use state::SessionState;

use crate::backends::audio::AudioGraph;
use crate::backends::camera::{
    BackendError, MediaPlatform, MediaStream, RenderTarget, StreamConstraints, StreamUrl,
    VideoElement, default_platform,
};
use crate::config::{OptionOverrides, SessionOptions};
use crate::constants::{DEFAULT_QR_INTERVAL, MIN_QR_INTERVAL};
use crate::errors::{AudioError, SessionError, SessionResult};
use crate::frame_processor::{QrDecoder, QrOutcome, RqrrDecoder};
use qr_poll::{QrPoller, TickOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Resources held while streaming
struct Live {
    stream: Arc<dyn MediaStream>,
    element: Arc<dyn VideoElement>,
    url: StreamUrl,
    audio: Option<Arc<dyn AudioGraph>>,
}

struct SessionData {
    options: SessionOptions,
    state: SessionState,
    live: Option<Live>,
    stills: Vec<Arc<Still>>,
    poller: Option<QrPoller>,
}

struct Inner {
    target: Arc<dyn RenderTarget>,
    platform: Arc<dyn MediaPlatform>,
    decoder: Arc<dyn QrDecoder>,
    bus: EventBus,
    data: Mutex<SessionData>,
}

/// Handle to a capture session
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    target: Arc<dyn RenderTarget>,
    options: SessionOptions,
    platform: Option<Arc<dyn MediaPlatform>>,
    decoder: Option<Arc<dyn QrDecoder>>,
}

impl SessionBuilder {
    /// Replace the options wholesale
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Merge overrides over the current options
    pub fn overrides(mut self, overrides: OptionOverrides) -> Self {
        self.options.merge(overrides);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn MediaPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn QrDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Session {
        debug!(options = ?self.options, "Creating session");
        Session {
            inner: Arc::new(Inner {
                target: self.target,
                platform: self.platform.unwrap_or_else(default_platform),
                decoder: self
                    .decoder
                    .unwrap_or_else(|| Arc::new(RqrrDecoder::new()) as Arc<dyn QrDecoder>),
                bus: EventBus::new(),
                data: Mutex::new(SessionData {
                    options: self.options,
                    state: SessionState::Idle,
                    live: None,
                    stills: Vec::new(),
                    poller: None,
                }),
            }),
        }
    }
}

impl Session {
    /// Start building a session rendering into `target`
    pub fn builder(target: Arc<dyn RenderTarget>) -> SessionBuilder {
        SessionBuilder {
            target,
            options: SessionOptions::default(),
            platform: None,
            decoder: None,
        }
    }

    /// Session on the default platform with `overrides` merged over the defaults
    pub fn new(target: Arc<dyn RenderTarget>, overrides: OptionOverrides) -> Self {
        Self::builder(target).overrides(overrides).build()
    }

    // ===== Events =====

    pub fn on(&self, kind: EventKind, handler: Handler) {
        self.inner.bus.on(kind, handler);
    }

    pub fn off(&self, kind: EventKind, handler: &Handler) {
        self.inner.bus.off(kind, handler);
    }

    /// Deliver an event to this session's handlers; returns how many ran
    pub fn trigger(&self, event: &SessionEvent) -> usize {
        self.inner.bus.trigger(event)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    // ===== Accessors =====

    pub fn state(&self) -> SessionState {
        self.inner.data().state
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.data().options
    }

    /// Merge `overrides` into the current options
    pub fn set_options(&self, overrides: OptionOverrides) {
        let mut data = self.inner.data();
        data.options.merge(overrides);
        debug!(options = ?data.options, "Options updated");
    }

    /// Stills captured so far, oldest first
    pub fn snapshots(&self) -> Vec<Arc<Still>> {
        self.inner.data().stills.clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.data().stills.len()
    }

    pub fn has_stream(&self) -> bool {
        self.inner.data().live.is_some()
    }

    pub fn is_qr_polling(&self) -> bool {
        self.inner
            .data()
            .poller
            .as_ref()
            .is_some_and(QrPoller::is_running)
    }

    // ===== Lifecycle =====

    /// Request the camera stream
    ///
    /// Fails synchronously with [`SessionError::NotSupported`] (also emitted
    /// as `error`) when the platform has no acquisition primitive, and with
    /// [`SessionError::InvalidState`] unless the session is idle or stopped.
    /// Otherwise the request runs in the background and its outcome arrives
    /// as `start` or `error`; the returned handle resolves once the request
    /// has settled.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self, height: Option<u32>) -> SessionResult<JoinHandle<()>> {
        {
            let data = self.inner.data();
            data.state.ensure(data.state.can_start(), "start")?;
        }

        let Some(devices) = self.inner.platform.media_devices() else {
            warn!("Media capture is not supported on this platform");
            self.inner
                .emit(SessionEvent::Error(SessionError::NotSupported));
            return Err(SessionError::NotSupported);
        };

        let (previous, options) = {
            let mut data = self.inner.data();
            data.state.ensure(data.state.can_start(), "start")?;
            let previous = data.state;
            data.state = SessionState::Acquiring;
            (previous, data.options)
        };

        let constraints = StreamConstraints::video_with_audio(options.audio);
        info!(?constraints, ?height, "Requesting camera stream");

        let request = devices.request_stream(constraints);
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            match request.await {
                Ok(stream) => inner.attach_stream(stream, height, options),
                Err(e) => inner.acquisition_failed(e, previous),
            }
        }))
    }

    /// Release the stream and everything attached to it
    ///
    /// The QR poll loop is halted in every state. Releasing the stream is
    /// only valid while streaming; from any other state this returns
    /// [`SessionError::InvalidState`] and emits nothing.
    pub fn stop(&self) -> SessionResult<()> {
        self.stop_qr_polling();

        let live = {
            let mut data = self.inner.data();
            data.state
                .ensure(data.state == SessionState::Streaming, "stop")?;
            data.state = SessionState::Stopped;
            data.live.take()
        };

        if let Some(live) = live {
            live.stream.stop();
            if let Some(audio) = &live.audio {
                audio.disconnect();
            }
            self.inner.target.detach(&live.element);
            live.element.remove();
            self.inner.platform.revoke_stream_url(&live.url);
        }

        info!("Session stopped");
        self.inner.emit(SessionEvent::Stop);
        Ok(())
    }

    // ===== Capture =====

    /// Capture the current frame as a still
    ///
    /// Explicit dimensions override the live frame's and are capped at
    /// [`MAX_SNAPSHOT_DIMENSION`](crate::constants::MAX_SNAPSHOT_DIMENSION). Without a frame the still is blank. Returns [`SessionError::SnapshotDisabled`] without
    /// emitting anything when snapshots are off.
    pub fn take_snapshot(&self, width: Option<u32>, height: Option<u32>) -> SessionResult<Arc<Still>> {
        if !self.inner.data().options.snapshots {
            debug!("Snapshot requested while disabled");
            return Err(SessionError::SnapshotDisabled);
        }

        let frame = self.inner.current_frame();
        if frame.is_none() {
            debug!("No live frame, capturing a blank still");
        }

        let still = Arc::new(Still::capture(frame.as_deref(), width, height));
        self.inner.data().stills.push(Arc::clone(&still));

        info!(
            id = %still.id(),
            width = still.width(),
            height = still.height(),
            "Snapshot taken"
        );
        self.inner.emit(SessionEvent::Snapshot(Arc::clone(&still)));
        Ok(still)
    }

    // ===== QR polling =====

    /// Start decoding a frame every `interval`
    ///
    /// An already running loop is stopped and replaced; the return value says
    /// whether that happened. A zero interval is raised to the minimum.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start_qr_polling(&self, interval: Duration) -> bool {
        let interval = interval.max(MIN_QR_INTERVAL);
        let replaced = self.stop_qr_polling();
        if replaced {
            debug!("Replacing running QR poll loop");
        }

        let sampler = Arc::downgrade(&self.inner);
        let publisher = Arc::downgrade(&self.inner);
        let poller = QrPoller::start(
            "qr-poll",
            interval,
            move || Inner::sample_qr(&sampler),
            move |event: SessionEvent| {
                if let Some(inner) = publisher.upgrade() {
                    inner.emit(event);
                }
            },
        );

        let previous = self.inner.data().poller.replace(poller);
        if let Some(mut previous) = previous {
            previous.stop();
        }
        replaced
    }

    /// [`Session::start_qr_polling`] with the default one-second interval
    pub fn start_qr_polling_default(&self) -> bool {
        self.start_qr_polling(DEFAULT_QR_INTERVAL)
    }

    /// Cancel the poll loop; returns whether one was running
    pub fn stop_qr_polling(&self) -> bool {
        let poller = self.inner.data().poller.take();
        match poller {
            Some(mut poller) => {
                let was_running = poller.is_running();
                poller.stop();
                info!("QR polling stopped");
                was_running
            }
            None => false,
        }
    }
}

impl Inner {
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        self.bus.trigger(&event);
    }

    fn current_frame(&self) -> Option<Arc<crate::backends::camera::CameraFrame>> {
        let element = self
            .data()
            .live
            .as_ref()
            .map(|live| Arc::clone(&live.element));
        element.and_then(|element| element.current_frame())
    }

    fn attach_stream(
        self: &Arc<Self>,
        stream: Arc<dyn MediaStream>,
        height: Option<u32>,
        options: SessionOptions,
    ) {
        info!(stream = %stream.id(), "Camera stream acquired");

        let element = self.platform.create_video_element();
        if let Some(height) = height {
            element.set_height(height);
        }

        let fired = AtomicBool::new(false);
        let weak: Weak<Inner> = Arc::downgrade(self);
        element.on_ready(Box::new(move || {
            if fired.swap(true, Ordering::SeqCst) {
                trace!("Ready signal repeated, ignoring");
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.data().state == SessionState::Streaming {
                info!("Stream ready");
                inner.emit(SessionEvent::Start);
            }
        }));

        let url = self.platform.create_stream_url(stream.as_ref());
        element.set_source(Arc::clone(&stream), url.clone());

        let audio = if options.audio {
            self.link_audio(stream.as_ref())
        } else {
            None
        };

        self.target.attach(&element);

        {
            let mut data = self.data();
            data.live = Some(Live {
                stream,
                element: Arc::clone(&element),
                url,
                audio,
            });
            data.state = SessionState::Streaming;
        }

        element.play();
    }

    fn link_audio(&self, stream: &dyn MediaStream) -> Option<Arc<dyn AudioGraph>> {
        let result = match self.platform.audio_graph() {
            Some(graph) => graph.connect_filter(stream).map(|()| graph),
            None => Err(AudioError::ElementMissing("audio graph".to_string())),
        };

        match result {
            Ok(graph) => Some(graph),
            Err(e) => {
                warn!(error = %e, "Audio wiring failed, continuing with video only");
                self.emit(SessionEvent::Error(e.into()));
                None
            }
        }
    }

    fn acquisition_failed(&self, error: BackendError, previous: SessionState) {
        warn!(error = %error, "Camera stream acquisition failed");
        self.data().state = previous;
        self.emit(SessionEvent::Error(error.into()));
    }

    /// One poll tick: extract the current frame and decode it
    fn sample_qr(weak: &Weak<Inner>) -> TickOutcome<SessionEvent> {
        let Some(inner) = weak.upgrade() else {
            return TickOutcome::Stop;
        };
        let Some(frame) = inner.current_frame() else {
            trace!("No frame to scan");
            return TickOutcome::Idle;
        };

        let still = Still::capture(Some(&frame), None, None);
        match inner.decoder.decode(still.image()) {
            Ok(QrOutcome::Decoded(text)) => TickOutcome::Publish(SessionEvent::QrReadSuccess(text)),
            Ok(QrOutcome::NotFound) => TickOutcome::Idle,
            Err(e) => {
                debug!(error = %e, "QR decode failed");
                TickOutcome::Publish(SessionEvent::QrReadError(e))
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let data = self.data.get_mut().unwrap_or_else(|e| e.into_inner());
        // May run on the poll task itself when a tick held the last reference
        if let Some(mut poller) = data.poller.take() {
            poller.cancel();
        }
        if let Some(live) = data.live.take() {
            debug!("Session dropped while streaming, releasing stream");
            live.stream.stop();
            if let Some(audio) = &live.audio {
                audio.disconnect();
            }
            self.target.detach(&live.element);
            live.element.remove();
            self.platform.revoke_stream_url(&live.url);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.data();
        f.debug_struct("Session")
            .field("state", &data.state)
            .field("options", &data.options)
            .field("snapshots", &data.stills.len())
            .field("polling", &data.poller.is_some())
            .finish()
    }
}
