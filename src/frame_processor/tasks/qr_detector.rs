// SPDX-License-Identifier: GPL-3.0-only

//! QR code decoding
//!
//! Frames are converted to grayscale, downscaled when large, and handed to
//! `rqrr`. The first grid that decodes wins.

use crate::constants::qr::MAX_DECODE_DIMENSION;
use crate::errors::DecodeError;
use crate::frame_processor::types::QrOutcome;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use std::time::Instant;
use tracing::{debug, trace};

/// Narrow request/response interface to a QR decoder
///
/// Each call is self-contained; implementations must not rely on any global
/// callback slot so that several sessions can decode concurrently.
pub trait QrDecoder: Send + Sync {
    fn decode(&self, image: &RgbaImage) -> Result<QrOutcome, DecodeError>;
}

/// QR decoder backed by `rqrr`
pub struct RqrrDecoder {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for RqrrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self {
            max_dimension: MAX_DECODE_DIMENSION,
        }
    }

    /// Create a decoder with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    fn prepare(&self, image: &RgbaImage) -> GrayImage {
        let gray = imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        if width <= self.max_dimension && height <= self.max_dimension {
            return gray;
        }

        let scale = (width as f32 / self.max_dimension as f32)
            .max(height as f32 / self.max_dimension as f32);
        let new_width = ((width as f32 / scale) as u32).max(1);
        let new_height = ((height as f32 / scale) as u32).max(1);
        trace!(width, height, new_width, new_height, "Downscaling frame for decode");

        imageops::resize(&gray, new_width, new_height, FilterType::Triangle)
    }
}

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image: &RgbaImage) -> Result<QrOutcome, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::EmptyImage);
        }

        let start = Instant::now();
        let gray = self.prepare(image);

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            gray.width() as usize,
            gray.height() as usize,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();

        trace!(
            grids = grids.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "QR detection complete"
        );

        if grids.is_empty() {
            return Ok(QrOutcome::NotFound);
        }

        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    debug!(content = %content, "Decoded QR code");
                    return Ok(QrOutcome::Decoded(content));
                }
                Err(e) => {
                    debug!(error = %e, "Failed to decode QR grid");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(DecodeError::Corrupt(
            last_error.unwrap_or_else(|| "unreadable grid".to_string()),
        ))
    }
}
