// SPDX-License-Identifier: GPL-3.0-only

//! Still-image extraction from the live stream
//!
//! Drawing a frame into an offscreen surface is shared by user snapshots and
//! QR poll ticks; only snapshots are kept.

use crate::backends::camera::CameraFrame;
use crate::constants::MAX_SNAPSHOT_DIMENSION;
use chrono::{DateTime, Local};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;
use uuid::Uuid;

/// Immutable bitmap captured from the live stream
#[derive(Debug, Clone)]
pub struct Still {
    id: Uuid,
    captured_at: DateTime<Local>,
    image: RgbaImage,
}

impl Still {
    /// Draw `frame` into a new surface
    ///
    /// Explicit dimensions override the frame's native ones and scale the
    /// frame to fit. With no frame the surface stays blank, and any dimension
    /// not given explicitly is zero. Explicit dimensions are capped at
    /// [`MAX_SNAPSHOT_DIMENSION`].
    pub fn capture(frame: Option<&CameraFrame>, width: Option<u32>, height: Option<u32>) -> Self {
        let native = frame.map(|f| (f.width, f.height)).unwrap_or((0, 0));
        let width = width.map_or(native.0, clamp_dimension);
        let height = height.map_or(native.1, clamp_dimension);

        let image = match frame {
            Some(frame) if frame.width > 0 && frame.height > 0 => {
                let source = frame.to_rgba_image();
                if (width, height) == native {
                    source
                } else {
                    imageops::resize(&source, width, height, FilterType::Triangle)
                }
            }
            _ => RgbaImage::new(width, height),
        };

        debug!(width, height, has_frame = frame.is_some(), "Captured still");
        Self::from_image(image)
    }

    /// Wrap an existing bitmap
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Local::now(),
            image,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

fn clamp_dimension(requested: u32) -> u32 {
    if requested > MAX_SNAPSHOT_DIMENSION {
        debug!(requested, max = MAX_SNAPSHOT_DIMENSION, "Clamping snapshot dimension");
    }
    requested.min(MAX_SNAPSHOT_DIMENSION)
}
