//! Image scaler.
//!
//! Decodes stored image bytes, resizes them to the size resolved for the
//! requested fit mode, and re-encodes the result as PNG.
//!
//! # Design Decisions
//!
//! - **Sniffed input**: The source format is detected from content, not from
//!   the stored filename's extension.
//!
//! - **Fixed filter**: Every render uses the same Catmull-Rom (bicubic)
//!   filter, so output bytes depend only on the source bytes and the target.
//!
//! - **Lossless output**: Output is always PNG regardless of the source
//!   format.
//!
//! The scaler is synchronous and CPU-bound. Callers run it on the
//! [`WorkerPool`](super::WorkerPool), never directly on an async task.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::RenderError;

use super::resolve::{resolve_dimensions, FitMode};

/// MIME type of everything the scaler produces.
pub const OUTPUT_CONTENT_TYPE: &str = "image/png";

/// A scaled, encoded image.
#[derive(Debug, Clone)]
pub struct ScaledImage {
    /// PNG-encoded bytes
    pub bytes: Bytes,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

/// Decode → resize → PNG encode.
#[derive(Debug, Clone)]
pub struct PngScaler {
    filter: FilterType,
}

impl PngScaler {
    /// Create a scaler with the default Catmull-Rom filter.
    pub fn new() -> Self {
        Self {
            filter: FilterType::CatmullRom,
        }
    }

    /// Render `source` at the size resolved from `target` and `mode`.
    ///
    /// # Errors
    ///
    /// - `Decode` if the bytes are not a supported image
    /// - `DegenerateSource` if the decoded image has a zero dimension
    /// - `EmptyOutput` if the resolved size has zero area
    /// - `Encode` if PNG encoding fails
    pub fn render(
        &self,
        source: &[u8],
        target: (u32, u32),
        mode: FitMode,
    ) -> Result<ScaledImage, RenderError> {
        let img = decode(source)?;

        let (width, height) = resolve_dimensions((img.width(), img.height()), target, mode)?;
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyOutput { width, height });
        }

        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, self.filter)
        };

        let mut output = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| RenderError::Encode {
                message: e.to_string(),
            })?;

        Ok(ScaledImage {
            bytes: Bytes::from(output),
            width,
            height,
        })
    }
}

impl Default for PngScaler {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(source: &[u8]) -> Result<DynamicImage, RenderError> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(decode_error)?
        .decode()
        .map_err(decode_error)
}

fn decode_error(e: impl ToString) -> RenderError {
    RenderError::Decode {
        message: e.to_string(),
    }
}
