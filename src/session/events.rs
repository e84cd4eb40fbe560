// SPDX-License-Identifier: GPL-3.0-only

//! In-process publish/subscribe register keyed by event name
//!
//! Handlers run synchronously, in registration order, before `trigger`
//! returns. Panics raised by a handler are not caught: they propagate to
//! whoever triggered the event (fire-and-forward).

use crate::errors::{DecodeError, SessionError};
use crate::session::snapshot::Still;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Names of the events a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Stream ready and attached
    Start,
    /// Acquisition or feature failure
    Error,
    /// A still image was captured
    Snapshot,
    /// Stream released
    Stop,
    /// A poll tick decoded a QR code
    QrReadSuccess,
    /// A poll tick's decoder failed
    QrReadError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Start,
        EventKind::Error,
        EventKind::Snapshot,
        EventKind::Stop,
        EventKind::QrReadSuccess,
        EventKind::QrReadError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Error => "error",
            EventKind::Snapshot => "snapshot",
            EventKind::Stop => "stop",
            EventKind::QrReadSuccess => "qrReadSuccess",
            EventKind::QrReadError => "qrReadError",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown event: {}", s))
    }
}

/// An event together with its payload
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start,
    Error(SessionError),
    Snapshot(Arc<Still>),
    Stop,
    QrReadSuccess(String),
    QrReadError(DecodeError),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Start => EventKind::Start,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::Snapshot(_) => EventKind::Snapshot,
            SessionEvent::Stop => EventKind::Stop,
            SessionEvent::QrReadSuccess(_) => EventKind::QrReadSuccess,
            SessionEvent::QrReadError(_) => EventKind::QrReadError,
        }
    }
}

/// Event handler; identity is the `Arc` allocation
pub type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handler registration table
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` for `kind`; repeated registrations all fire
    pub fn on(&self, kind: EventKind, handler: Handler) {
        self.table().entry(kind).or_default().push(handler);
    }

    /// Remove every registration of `handler` for `kind`
    pub fn off(&self, kind: EventKind, handler: &Handler) {
        if let Some(handlers) = self.table().get_mut(&kind) {
            handlers.retain(|registered| !Arc::ptr_eq(registered, handler));
        }
    }

    /// Invoke the handlers registered for the event's kind
    ///
    /// Returns how many handlers ran. The handler list is copied before the
    /// first call, so handlers may register, unregister or trigger freely;
    /// such changes apply from the next trigger on.
    pub fn trigger(&self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        let handlers = match self.table().get(&kind) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                trace!(event = %kind, "No handlers registered");
                return 0;
            }
        };

        trace!(event = %kind, handlers = handlers.len(), "Triggering event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.table().get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table();
        let mut counts: Vec<_> = table
            .iter()
            .map(|(kind, handlers)| (kind.name(), handlers.len()))
            .collect();
        counts.sort();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
