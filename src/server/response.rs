//! Response emitter for rendered images.
//!
//! Turns a fresh cache entry into an HTTP response with validators
//! (`ETag`, `Last-Modified`), a `Cache-Control` lifetime that never outlives
//! the entry, a diagnostic `Content-Disposition`, and a body streamed in
//! fixed-size chunks.
//!
//! # Headers
//!
//! ```text
//! Content-Type:        image/png
//! Content-Length:      <exact byte length>
//! Last-Modified:       <IMF-fixdate of the render time>
//! ETag:                "<sha256 hex of '{rendered_at_ms}-{len}'>"
//! Cache-Control:       max-age=<TTL minus age, floored at 0>
//! Content-Disposition: inline; filename="..."; creation-date=...; ...
//! X-Render-Cache-Hit:  true|false
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use futures::stream::{self, StreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::render::{CacheEntry, RenderOutcome, RenderRequest, RenderedImage, OUTPUT_CONTENT_TYPE};

/// Default body chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Response header reporting whether the render came from cache.
pub const CACHE_HIT_HEADER: &str = "x-render-cache-hit";

// =============================================================================
// Header Helpers
// =============================================================================

/// Seconds a client may reuse the entry: `TTL - age`, floored at zero.
///
/// `age` is whole seconds since `stored_at`; a clock that went backwards
/// counts as age zero, so the result is always within `[0, TTL]`.
pub fn max_age(ttl: Duration, stored_at: SystemTime, now: SystemTime) -> u64 {
    let age = now.duration_since(stored_at).unwrap_or_default().as_secs();
    ttl.as_secs().saturating_sub(age)
}

/// Quoted strong validator for a rendered entry.
pub fn etag(rendered_at_ms: u64, len: usize) -> String {
    let digest = Sha256::digest(format!("{}-{}", rendered_at_ms, len).as_bytes());
    format!("\"{}\"", hex::encode(digest))
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Accepts `*`, comma-separated lists and weak (`W/`) forms.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

/// Replace characters that cannot appear in a quoted header parameter.
fn sanitize_parameter(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            ' '..='~' => c,
            _ => '_',
        })
        .collect()
}

/// Diagnostic `Content-Disposition` naming the source and requested size.
pub fn content_disposition(
    image: &RenderedImage,
    request: &RenderRequest,
    rendered_at: SystemTime,
    now: SystemTime,
) -> String {
    let filename = sanitize_parameter(&format!(
        "{}_{}x{}_{}",
        image.stored_filename, request.width, request.height, image.original_filename
    ));

    format!(
        "inline; filename=\"{}\"; creation-date=\"{}\"; modification-date=\"{}\"; read-date=\"{}\"",
        filename,
        http_date(millis_to_system_time(image.record_created_at)),
        http_date(rendered_at),
        http_date(now),
    )
}

// =============================================================================
// Body
// =============================================================================

/// Stream `bytes` in `chunk_size` pieces, then spawn `finalizer`.
///
/// The finalizer runs only once the last chunk has been handed to the
/// transport; it has no way to alter the response.
pub fn chunked_body(
    bytes: Bytes,
    chunk_size: usize,
    finalizer: Option<BoxFuture<'static, ()>>,
) -> Body {
    let chunk_size = chunk_size.max(1);
    let len = bytes.len();
    let chunks: Vec<Bytes> = (0..len)
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(len)))
        .collect();

    let tail = stream::once(async move {
        if let Some(finalizer) = finalizer {
            tokio::spawn(finalizer);
        }
    })
    .filter_map(|()| future::ready(None::<Result<Bytes, Infallible>>));

    Body::from_stream(stream::iter(chunks.into_iter().map(Ok::<_, Infallible>)).chain(tail))
}

// =============================================================================
// Image Response
// =============================================================================

/// Builder for a rendered-image response.
pub struct ImageResponse {
    entry: Arc<CacheEntry<RenderedImage>>,
    request: RenderRequest,
    ttl: Duration,
    now: SystemTime,
    cache_hit: bool,
    chunk_size: usize,
    header_only: bool,
    if_none_match: Option<String>,
    finalizer: Option<BoxFuture<'static, ()>>,
}

impl ImageResponse {
    /// Start a response for `outcome`, evaluated at `now`.
    pub fn new(
        outcome: RenderOutcome,
        request: RenderRequest,
        ttl: Duration,
        now: SystemTime,
    ) -> Self {
        Self {
            entry: outcome.entry,
            request,
            ttl,
            now,
            cache_hit: outcome.cache_hit,
            chunk_size: DEFAULT_CHUNK_SIZE,
            header_only: false,
            if_none_match: None,
            finalizer: None,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Send headers only (HEAD).
    pub fn header_only(mut self, header_only: bool) -> Self {
        self.header_only = header_only;
        self
    }

    pub fn if_none_match(mut self, value: Option<&str>) -> Self {
        self.if_none_match = value.map(str::to_owned);
        self
    }

    /// Future spawned after the body has been fully emitted.
    pub fn on_complete(mut self, finalizer: BoxFuture<'static, ()>) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    /// The validator this response will carry.
    pub fn etag(&self) -> String {
        etag(
            self.entry.stored_at_millis(),
            self.entry.value().bytes.len(),
        )
    }

    fn headers(&self, etag: &str, not_modified: bool) -> HeaderMap {
        let image = self.entry.value();
        let rendered_at = self.entry.stored_at();
        let mut headers = HeaderMap::new();

        insert(&mut headers, header::ETAG, etag.to_string());
        insert(&mut headers, header::LAST_MODIFIED, http_date(rendered_at));
        insert(
            &mut headers,
            header::CACHE_CONTROL,
            format!("max-age={}", max_age(self.ttl, rendered_at, self.now)),
        );
        insert(
            &mut headers,
            HeaderName::from_static(CACHE_HIT_HEADER),
            self.cache_hit.to_string(),
        );

        if !not_modified {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(OUTPUT_CONTENT_TYPE),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.bytes.len()));
            insert(
                &mut headers,
                header::CONTENT_DISPOSITION,
                content_disposition(image, &self.request, rendered_at, self.now),
            );
        }

        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: String) {
    match HeaderValue::try_from(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => warn!(header = %name, error = %e, "dropping invalid header value"),
    }
}

impl IntoResponse for ImageResponse {
    fn into_response(mut self) -> Response {
        let etag = self.etag();
        let not_modified = self
            .if_none_match
            .as_deref()
            .is_some_and(|value| etag_matches(value, &etag));

        let headers = self.headers(&etag, not_modified);

        if not_modified || self.header_only {
            if let Some(finalizer) = self.finalizer.take() {
                tokio::spawn(finalizer);
            }
            let status = if not_modified {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::OK
            };
            return (status, headers, Body::empty()).into_response();
        }

        let bytes = self.entry.value().bytes.clone();
        let body = chunked_body(bytes, self.chunk_size, self.finalizer.take());
        (StatusCode::OK, headers, body).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
