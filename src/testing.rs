// SPDX-License-Identifier: GPL-3.0-only

//! In-memory stand-ins for the capture primitives
//!
//! Every collaborator records what the session did to it so tests can assert
//! on the interaction without a camera.

use crate::backends::audio::AudioGraph;
use crate::backends::camera::{
    BackendError, BackendResult, CameraFrame, FrameReceiver, FrameSender, MediaDevices,
    MediaPlatform, MediaStream, ReadyCallback, RenderTarget, StreamConstraints, StreamUrl,
    VideoElement,
};
use crate::errors::{AudioError, DecodeError};
use crate::frame_processor::{QrDecoder, QrOutcome};
use futures::future::BoxFuture;
use image::RgbaImage;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Solid-colour RGBA frame
pub fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> CameraFrame {
    CameraFrame::from_rgba(width, height, rgba.repeat((width * height) as usize))
}

/// Stream whose frames are pushed by the test
pub struct FakeStream {
    id: String,
    audio: bool,
    frames: FrameSender,
    stopped: AtomicBool,
}

impl FakeStream {
    pub fn new(audio: bool) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audio,
            frames,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn push_frame(&self, frame: CameraFrame) {
        self.frames.send_replace(Some(Arc::new(frame)));
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_audio(&self) -> bool {
        self.audio
    }

    fn frames(&self) -> FrameReceiver {
        self.frames.subscribe()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How a [`FakeMediaDevices`] answers requests
#[derive(Debug, Clone)]
pub enum Acquisition {
    /// Hand out a stream showing this frame (or nothing yet)
    Grant(Option<CameraFrame>),
    /// Refuse, as a user denying permission would
    Deny(String),
    /// Fail for a device reason
    Fail(String),
}

/// Acquisition primitive with a scripted answer
pub struct FakeMediaDevices {
    answer: Mutex<Acquisition>,
    requests: Mutex<Vec<StreamConstraints>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeMediaDevices {
    pub fn new(answer: Acquisition) -> Self {
        Self {
            answer: Mutex::new(answer),
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn set_answer(&self, answer: Acquisition) {
        *lock(&self.answer) = answer;
    }

    pub fn requests(&self) -> Vec<StreamConstraints> {
        lock(&self.requests).clone()
    }

    pub fn streams(&self) -> Vec<Arc<FakeStream>> {
        lock(&self.streams).clone()
    }

    pub fn last_stream(&self) -> Option<Arc<FakeStream>> {
        lock(&self.streams).last().cloned()
    }
}

impl MediaDevices for FakeMediaDevices {
    fn request_stream(
        &self,
        constraints: StreamConstraints,
    ) -> BoxFuture<'static, BackendResult<Arc<dyn MediaStream>>> {
        lock(&self.requests).push(constraints);

        let result = match lock(&self.answer).clone() {
            Acquisition::Grant(frame) => {
                let stream = Arc::new(FakeStream::new(constraints.audio));
                if let Some(frame) = frame {
                    stream.push_frame(frame);
                }
                lock(&self.streams).push(Arc::clone(&stream));
                Ok(stream as Arc<dyn MediaStream>)
            }
            Acquisition::Deny(reason) => Err(BackendError::PermissionDenied(reason)),
            Acquisition::Fail(reason) => Err(BackendError::InitializationFailed(reason)),
        };

        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// Rendering element whose ready signal is fired by the test
#[derive(Default)]
pub struct FakeVideoElement {
    height: Mutex<Option<u32>>,
    source: Mutex<Option<(Arc<dyn MediaStream>, StreamUrl)>>,
    frames: Mutex<Option<FrameReceiver>>,
    ready: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    plays: AtomicUsize,
    removed: AtomicBool,
}

impl FakeVideoElement {
    /// Fire the "ready to render" signal
    pub fn fire_ready(&self) {
        let callbacks = lock(&self.ready).clone();
        for callback in callbacks {
            callback();
        }
    }

    pub fn ready_subscribers(&self) -> usize {
        lock(&self.ready).len()
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn source_url(&self) -> Option<StreamUrl> {
        lock(&self.source).as_ref().map(|(_, url)| url.clone())
    }
}

impl VideoElement for FakeVideoElement {
    fn set_height(&self, height: u32) {
        *lock(&self.height) = Some(height);
    }

    fn height(&self) -> Option<u32> {
        *lock(&self.height)
    }

    fn set_source(&self, stream: Arc<dyn MediaStream>, url: StreamUrl) {
        *lock(&self.frames) = Some(stream.frames());
        *lock(&self.source) = Some((stream, url));
    }

    fn on_ready(&self, callback: ReadyCallback) {
        lock(&self.ready).push(Arc::from(callback));
    }

    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }

    fn current_frame(&self) -> Option<Arc<CameraFrame>> {
        lock(&self.frames)
            .as_ref()
            .and_then(|frames| frames.borrow().clone())
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        *lock(&self.frames) = None;
        *lock(&self.source) = None;
    }
}

/// Container recording attach/detach calls
#[derive(Default)]
pub struct FakeTarget {
    attached: Mutex<Vec<Arc<dyn VideoElement>>>,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
}

impl FakeTarget {
    pub fn attached_count(&self) -> usize {
        lock(&self.attached).len()
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }
}

impl RenderTarget for FakeTarget {
    fn attach(&self, element: &Arc<dyn VideoElement>) {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.attached).push(Arc::clone(element));
    }

    fn detach(&self, element: &Arc<dyn VideoElement>) {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.attached).retain(|attached| !Arc::ptr_eq(attached, element));
    }
}

/// Audio graph that succeeds or fails on demand
#[derive(Default)]
pub struct FakeAudioGraph {
    fail: bool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeAudioGraph {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl AudioGraph for FakeAudioGraph {
    fn connect_filter(&self, stream: &dyn MediaStream) -> Result<(), AudioError> {
        if self.fail {
            return Err(AudioError::ElementMissing("biquad".to_string()));
        }
        if !stream.has_audio() {
            return Err(AudioError::NoAudioTrack);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Platform wiring the fakes together
pub struct FakePlatform {
    devices: Option<Arc<FakeMediaDevices>>,
    audio: Option<Arc<FakeAudioGraph>>,
    elements: Mutex<Vec<Arc<FakeVideoElement>>>,
    created_urls: Mutex<Vec<StreamUrl>>,
    revoked_urls: Mutex<Vec<StreamUrl>>,
}

impl FakePlatform {
    /// Platform granting streams that show `frame`
    pub fn granting(frame: Option<CameraFrame>) -> Self {
        Self::with_devices(Some(Arc::new(FakeMediaDevices::new(Acquisition::Grant(
            frame,
        )))))
    }

    /// Platform without an acquisition primitive
    pub fn unsupported() -> Self {
        Self::with_devices(None)
    }

    pub fn with_devices(devices: Option<Arc<FakeMediaDevices>>) -> Self {
        Self {
            devices,
            audio: None,
            elements: Mutex::new(Vec::new()),
            created_urls: Mutex::new(Vec::new()),
            revoked_urls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_audio(mut self, audio: FakeAudioGraph) -> Self {
        self.audio = Some(Arc::new(audio));
        self
    }

    pub fn devices(&self) -> Option<Arc<FakeMediaDevices>> {
        self.devices.clone()
    }

    pub fn audio(&self) -> Option<Arc<FakeAudioGraph>> {
        self.audio.clone()
    }

    pub fn elements(&self) -> Vec<Arc<FakeVideoElement>> {
        lock(&self.elements).clone()
    }

    pub fn last_element(&self) -> Option<Arc<FakeVideoElement>> {
        lock(&self.elements).last().cloned()
    }

    pub fn created_urls(&self) -> Vec<StreamUrl> {
        lock(&self.created_urls).clone()
    }

    pub fn revoked_urls(&self) -> Vec<StreamUrl> {
        lock(&self.revoked_urls).clone()
    }
}

impl MediaPlatform for FakePlatform {
    fn media_devices(&self) -> Option<Arc<dyn MediaDevices>> {
        self.devices
            .clone()
            .map(|devices| devices as Arc<dyn MediaDevices>)
    }

    fn create_video_element(&self) -> Arc<dyn VideoElement> {
        let element = Arc::new(FakeVideoElement::default());
        lock(&self.elements).push(Arc::clone(&element));
        element
    }

    fn audio_graph(&self) -> Option<Arc<dyn AudioGraph>> {
        self.audio
            .clone()
            .map(|audio| audio as Arc<dyn AudioGraph>)
    }

    fn create_stream_url(&self, stream: &dyn MediaStream) -> StreamUrl {
        let url = StreamUrl::for_stream(stream.id());
        lock(&self.created_urls).push(url.clone());
        url
    }

    fn revoke_stream_url(&self, url: &StreamUrl) {
        lock(&self.revoked_urls).push(url.clone());
    }
}

/// Decoder replaying scripted outcomes and counting attempts
///
/// Once the script runs out every attempt yields `NotFound`.
#[derive(Default)]
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<Result<QrOutcome, DecodeError>>>,
    attempts: AtomicUsize,
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedDecoder {
    pub fn new(script: impl IntoIterator<Item = Result<QrOutcome, DecodeError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Dimensions of every bitmap handed to the decoder
    pub fn sizes(&self) -> Vec<(u32, u32)> {
        lock(&self.sizes).clone()
    }
}

impl QrDecoder for ScriptedDecoder {
    fn decode(&self, image: &RgbaImage) -> Result<QrOutcome, DecodeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        lock(&self.sizes).push(image.dimensions());
        lock(&self.script)
            .pop_front()
            .unwrap_or(Ok(QrOutcome::NotFound))
    }
}
