// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera and audio capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  Session                     │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │ Audio graph │    │     Camera       │   │
//! │  │ (GStreamer) │    │   (GStreamer)    │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`audio`]: Microphone filter graph
//! - [`camera`]: Acquisition primitive, rendering elements and frame types

pub mod audio;
pub mod camera;
