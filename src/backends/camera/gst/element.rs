// SPDX-License-Identifier: GPL-3.0-only

//! Off-screen rendering element and container

use super::super::types::*;
use super::super::{FrameReceiver, MediaStream, ReadyCallback, RenderTarget, VideoElement};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SharedReadyCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ElementState {
    height: Option<u32>,
    stream: Option<Arc<dyn MediaStream>>,
    url: Option<StreamUrl>,
    frames: Option<FrameReceiver>,
    watcher: Option<JoinHandle<()>>,
}

/// Rendering element that keeps the latest frame without drawing it anywhere
///
/// The ready signal fires once, when the first frame arrives after `play`.
#[derive(Default)]
pub struct HeadlessVideoElement {
    state: Mutex<ElementState>,
    ready: Arc<Mutex<Vec<SharedReadyCallback>>>,
}

impl HeadlessVideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ElementState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// URL of the bound source
    pub fn source_url(&self) -> Option<StreamUrl> {
        self.state().url.clone()
    }
}

impl VideoElement for HeadlessVideoElement {
    fn set_height(&self, height: u32) {
        self.state().height = Some(height);
    }

    fn height(&self) -> Option<u32> {
        self.state().height
    }

    fn set_source(&self, stream: Arc<dyn MediaStream>, url: StreamUrl) {
        debug!(url = %url, "Binding stream to element");
        let mut state = self.state();
        state.frames = Some(stream.frames());
        state.stream = Some(stream);
        state.url = Some(url);
    }

    fn on_ready(&self, callback: ReadyCallback) {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::from(callback));
    }

    fn play(&self) {
        let mut state = self.state();
        let Some(mut frames) = state.frames.clone() else {
            warn!("play() called without a source");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("play() called outside a tokio runtime, ready signal disabled");
            return;
        };

        let ready = Arc::clone(&self.ready);
        let watcher = runtime.spawn(async move {
            loop {
                if frames.borrow_and_update().is_some() {
                    break;
                }
                if frames.changed().await.is_err() {
                    debug!("Stream closed before the first frame");
                    return;
                }
            }

            info!("First frame displayable");
            let callbacks = ready.lock().unwrap_or_else(|e| e.into_inner()).clone();
            for callback in callbacks {
                callback();
            }
        });

        if let Some(previous) = state.watcher.replace(watcher) {
            previous.abort();
        }
    }

    fn current_frame(&self) -> Option<Arc<CameraFrame>> {
        self.state()
            .frames
            .as_ref()
            .and_then(|frames| frames.borrow().clone())
    }

    fn remove(&self) {
        let mut state = self.state();
        if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
        state.frames = None;
        state.stream = None;
        state.url = None;
        debug!("Element removed");
    }
}

/// Container with no visible surface; tracks attached elements
#[derive(Default)]
pub struct HeadlessTarget {
    attached: Mutex<Vec<Arc<dyn VideoElement>>>,
}

impl HeadlessTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RenderTarget for HeadlessTarget {
    fn attach(&self, element: &Arc<dyn VideoElement>) {
        self.attached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(element));
    }

    fn detach(&self, element: &Arc<dyn VideoElement>) {
        self.attached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|attached| !Arc::ptr_eq(attached, element));
    }
}
