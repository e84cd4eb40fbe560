// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Constraints passed to the acquisition primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub video: bool,
    pub audio: bool,
}

impl StreamConstraints {
    /// Video-only, or video plus microphone when `audio` is set
    pub fn video_with_audio(audio: bool) -> Self {
        Self { video: true, audio }
    }
}

/// Pixel format for camera frames
///
/// Backends convert to RGBA before frames reach the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::RGBA => 4,
        }
    }
}

/// A single frame from a live stream
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel rows, each `stride` bytes long (may include padding)
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride in bytes
    pub stride: u32,
    /// When the frame was delivered by the device
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed RGBA frame
    pub fn from_rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            format: PixelFormat::RGBA,
            stride: width * PixelFormat::RGBA.bytes_per_pixel(),
            captured_at: Instant::now(),
        }
    }

    /// Convert to an owned image, dropping stride padding
    ///
    /// Rows that are cut short by a truncated buffer are filled with zeros.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let row_len = (self.width * self.format.bytes_per_pixel()) as usize;
        let stride = self.stride as usize;
        let mut packed = Vec::with_capacity(row_len * self.height as usize);

        for y in 0..self.height as usize {
            let row_start = y * stride;
            let row_end = row_start + row_len;
            match self.data.get(row_start..row_end) {
                Some(row) => packed.extend_from_slice(row),
                None => packed.resize(packed.len() + row_len, 0),
            }
        }

        RgbaImage::from_raw(self.width, self.height, packed)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Disposable resource URL bound to a live stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamUrl(String);

impl StreamUrl {
    /// Mint a fresh URL for the stream with the given id
    pub fn for_stream(stream_id: &str) -> Self {
        Self(format!("stream:{}/{}", stream_id, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// The device or the user refused access
    PermissionDenied(String),
    /// Failed to initialize the capture pipeline
    InitializationFailed(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for crate::errors::SessionError {
    fn from(err: BackendError) -> Self {
        use crate::errors::SessionError;
        match err {
            BackendError::PermissionDenied(msg) => SessionError::AcquisitionDenied(msg),
            BackendError::NotAvailable(_) => SessionError::NotSupported,
            other => SessionError::AcquisitionFailed(other.to_string()),
        }
    }
}
