//! `/favicon.ico`, drawn once and cached like any other computed response.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::error::RenderError;
use crate::render::{CacheEntry, Clock, SystemClock, TtlCache};

use super::response::max_age;

/// How long the drawn icon is kept and advertised to clients.
pub const FAVICON_TTL: Duration = Duration::from_secs(60 * 60 * 24);

const FAVICON_SIZE: u32 = 32;

/// Single-slot cache for the encoded icon.
pub struct FaviconCache {
    cache: TtlCache<(), Bytes>,
}

impl FaviconCache {
    pub fn new() -> Self {
        Self::with_clock(FAVICON_TTL, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    /// The cached icon, drawing it if the slot is empty or stale.
    ///
    /// Returns the entry and whether it was a cache hit.
    pub async fn get(&self) -> Result<(Arc<CacheEntry<Bytes>>, bool), RenderError> {
        let lookup = self
            .cache
            .get_or_try_insert_with((), || async { draw_favicon() })
            .await?;
        if !lookup.hit {
            debug!(bytes = lookup.entry.value().len(), "favicon drawn");
        }
        Ok((lookup.entry, lookup.hit))
    }

    /// Build the `/favicon.ico` response from the cached icon.
    pub async fn response(&self) -> Result<Response, RenderError> {
        let (entry, _) = self.get().await?;
        let seconds = max_age(self.cache.ttl(), entry.stored_at(), self.cache.now());

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/x-icon")
            .header(header::CACHE_CONTROL, format!("max-age={}", seconds))
            .body(Body::from(entry.value().clone()))
            .map_err(|e| RenderError::Encode {
                message: e.to_string(),
            })
    }
}

impl Default for FaviconCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a small framed landscape and encode it as ICO.
pub fn draw_favicon() -> Result<Bytes, RenderError> {
    let size = FAVICON_SIZE;
    let frame = Rgba([48, 56, 72, 255]);
    let sky = Rgba([120, 180, 230, 255]);
    let hill = Rgba([70, 140, 80, 255]);
    let sun = Rgba([250, 205, 60, 255]);

    let icon = RgbaImage::from_fn(size, size, |x, y| {
        let edge = x < 2 || y < 2 || x >= size - 2 || y >= size - 2;
        if edge {
            return frame;
        }

        let (dx, dy) = (x as i32 - 22, y as i32 - 9);
        if dx * dx + dy * dy <= 16 {
            return sun;
        }

        // Hill peaks under x = 12
        if y as i32 >= 12 + (x as i32 - 12).abs() / 2 + 4 {
            hill
        } else {
            sky
        }
    });

    let mut out = Cursor::new(Vec::new());
    icon.write_to(&mut out, ImageFormat::Ico)
        .map_err(|e| RenderError::Encode {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(out.into_inner()))
}
