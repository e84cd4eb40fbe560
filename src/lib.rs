// SPDX-License-Identifier: GPL-3.0-only

//! qrcam - camera sessions with live preview, snapshots and QR scanning
//!
//! A [`Session`] acquires a camera stream, renders it into a target, captures
//! still images on request and can poll the live feed for QR codes. Results
//! and failures are delivered through a small event bus.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: Lifecycle state machine, event bus, snapshots and the QR poll loop
//! - [`backends`]: Acquisition primitive, rendering elements and audio graph
//! - [`frame_processor`]: QR decoding behind a request/response interface
//! - [`config`]: Session options and CLI configuration
//!
//! # Example
//!
//! ```ignore
//! use qrcam::{EventKind, OptionOverrides, Session, SessionEvent, handler};
//! use qrcam::backends::camera::gst::HeadlessTarget;
//! use std::sync::Arc;
//!
//! let session = Session::new(Arc::new(HeadlessTarget::new()), OptionOverrides::default());
//! session.on(EventKind::QrReadSuccess, handler(|event| {
//!     if let SessionEvent::QrReadSuccess(text) = event {
//!         println!("{text}");
//!     }
//! }));
//! session.start(Some(480))?;
//! session.start_qr_polling_default();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame_processor;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::{Config, OptionOverrides, SessionOptions};
pub use errors::{DecodeError, SessionError, SessionResult};
pub use frame_processor::{QrDecoder, QrOutcome, RqrrDecoder};
pub use session::{
    EventBus, EventKind, Handler, Session, SessionBuilder, SessionEvent, SessionState, Still,
    handler,
};
