// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis
//!
//! Decoders consume sampled frames and report a tagged outcome instead of
//! signalling "nothing found" through the error channel.

pub mod tasks;
pub mod types;

pub use tasks::qr_detector::{QrDecoder, RqrrDecoder};
pub use types::QrOutcome;
