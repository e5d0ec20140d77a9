//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `GET|HEAD /images/{width}x{height}?mode=...` - Serve a resized image
//! - `POST /images` - Upload an image
//! - `GET /browser_cache_headers_test/{width}x{height}/{mode}` - Header test page
//! - `GET /favicon.ico` - Site icon
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{IoError, RenderError, UploadError};
use crate::intake::{self, Upload};
use crate::render::{system_time_millis, RenderRequest, RenderService};
use crate::store::ImageStore;

use super::favicon::FaviconCache;
use super::response::{ImageResponse, DEFAULT_CHUNK_SIZE};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the render service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ImageStore> {
    /// The render service for processing image requests
    pub render_service: Arc<RenderService<S>>,

    /// Body chunk size for image responses
    pub chunk_size: usize,

    /// Cached site icon
    pub favicon: Arc<FaviconCache>,
}

impl<S: ImageStore> AppState<S> {
    /// Create a new application state with the given render service.
    pub fn new(render_service: Arc<RenderService<S>>) -> Self {
        Self {
            render_service,
            chunk_size: DEFAULT_CHUNK_SIZE,
            favicon: Arc::new(FaviconCache::new()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

impl<S: ImageStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            render_service: Arc::clone(&self.render_service),
            chunk_size: self.chunk_size,
            favicon: Arc::clone(&self.favicon),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for image requests.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQueryParams {
    /// Fit mode name (defaults to `auto`)
    #[serde(default)]
    pub mode: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_parameter")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Body of a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: i64,

    /// Stored filename
    pub filename: String,

    pub original_filename: String,

    /// Lowercase hex SHA-256 of the uploaded bytes
    pub hash: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log by severity and build the JSON error body.
///
/// - 5xx at ERROR
/// - 404 at DEBUG (an empty store is expected before the first upload)
/// - other 4xx at WARN
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

fn io_error_parts(err: &IoError) -> (StatusCode, &'static str) {
    match err {
        // A record pointing at a missing file is our fault, not the client's
        IoError::NotFound(_) => (StatusCode::INTERNAL_SERVER_ERROR, "missing_file"),
        IoError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        IoError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        IoError::InvalidName(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        IoError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
    }
}

/// Convert RenderError to HTTP response.
impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            RenderError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
            RenderError::EmptyOutput { .. } => (StatusCode::BAD_REQUEST, "empty_output"),
            RenderError::EmptyStore => (StatusCode::NOT_FOUND, "not_found"),
            RenderError::DegenerateSource { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "degenerate_source")
            }
            RenderError::Decode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
            RenderError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            RenderError::Io(io_err) => io_error_parts(io_err),
            RenderError::Worker { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "worker_error"),
        };

        let message = match self {
            RenderError::InvalidParameter { message } => message,
            other => other.to_string(),
        };

        error_response(status, error_type, message)
    }
}

/// Convert UploadError to HTTP response.
impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            UploadError::MalformedContentType => (StatusCode::BAD_REQUEST, "malformed_header"),
            UploadError::UnsupportedFormat => (StatusCode::BAD_REQUEST, "unsupported_format"),
            UploadError::MissingFile => (StatusCode::BAD_REQUEST, "missing_file"),
            UploadError::Multipart(_) => (StatusCode::BAD_REQUEST, "malformed_body"),
            UploadError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "too_large"),
            UploadError::Duplicate { .. } => (StatusCode::CONFLICT, "duplicate"),
            UploadError::Io(io_err) => io_error_parts(io_err),
        };

        error_response(status, error_type, self.to_string())
    }
}

fn multipart_error(status: StatusCode, text: String) -> UploadError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        UploadError::Multipart(text)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image requests.
///
/// # Endpoint
///
/// `GET|HEAD /images/{width}x{height}?mode={auto|match_width|match_height|stretch}`
///
/// # Response
///
/// - `200 OK`: PNG image streamed in chunks (HEAD: headers only)
/// - `304 Not Modified`: `If-None-Match` matched the current ETag
/// - `400 Bad Request`: Malformed size, unknown mode, or a resolved size
///   with no pixels (sizes above 8192 are clamped)
/// - `404 Not Found`: No images stored
/// - `500 Internal Server Error`: Decode, encode, storage or worker failure
///
/// # Headers
///
/// See [`ImageResponse`]; additionally `X-Render-Cache-Hit: true|false`.
pub async fn image_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    Path(dimensions): Path<String>,
    Query(query): Query<ImageQueryParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, RenderError> {
    let request = RenderRequest::parse(&dimensions, query.mode.as_deref())?;

    let service = &state.render_service;
    let outcome = service.render(request).await?;

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let bytes = outcome.entry.value().bytes.len();
    let cache_hit = outcome.cache_hit;
    let delivered = async move {
        debug!(
            width = request.width,
            height = request.height,
            mode = %request.mode,
            bytes,
            cache_hit,
            "image delivered"
        );
    }
    .boxed();

    let response = ImageResponse::new(outcome, request, service.ttl(), service.now())
        .chunk_size(state.chunk_size)
        .header_only(method == Method::HEAD)
        .if_none_match(if_none_match)
        .on_complete(delivered);

    Ok(response.into_response())
}

/// Handle uploads.
///
/// # Endpoint
///
/// `POST /images` (multipart/form-data, first part carrying a filename)
///
/// # Response
///
/// `201 Created` with JSON body:
/// ```json
/// {
///   "id": 1,
///   "filename": "9f1c...e2.png",
///   "original_filename": "cat.png",
///   "hash": "3a7b..."
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing or non-image Content-Type, unsupported
///   format, no file part, malformed body
/// - `409 Conflict`: Identical image already stored
/// - `413 Payload Too Large`: Body exceeds the upload limit
/// - `500 Internal Server Error`: Storage error
pub async fn upload_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), UploadError> {
    let mut multipart = multipart.map_err(|e| multipart_error(e.status(), e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e.status(), e.body_text()))?
    {
        let Some(original_filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e.status(), e.body_text()))?;

        upload = Some(Upload {
            original_filename,
            content_type,
            data,
        });
        break;
    }

    let upload = upload.ok_or(UploadError::MissingFile)?;

    let service = &state.render_service;
    let now_ms = system_time_millis(service.now()) as i64;
    let record = intake::ingest(service.store().as_ref(), upload, now_ms).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: record.id,
            filename: record.stored_filename,
            original_filename: record.original_filename,
            hash: record.content_hash,
        }),
    ))
}

/// Handle browser cache test page requests.
///
/// # Endpoint
///
/// `GET /browser_cache_headers_test/{width}x{height}/{mode}`
///
/// # Response
///
/// `200 OK` with a minimal HTML page embedding the matching image URL, for
/// checking cache behaviour by hand in a browser.
pub async fn cache_test_page_handler(
    Path((dimensions, mode)): Path<(String, String)>,
) -> Result<Html<String>, RenderError> {
    let request = RenderRequest::parse(&dimensions, Some(&mode))?;

    Ok(Html(format!(
        "<html><head><title>Test</title></head><body><img src=\"/images/{}x{}?mode={}\"></body></html>",
        request.width, request.height, request.mode
    )))
}

/// Handle favicon requests.
///
/// # Endpoint
///
/// `GET /favicon.ico`
///
/// # Response
///
/// `200 OK` with an `image/x-icon` body, drawn on first use and cached for a
/// day; `Cache-Control: max-age` counts down with the cached copy.
pub async fn favicon_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
) -> Result<Response, RenderError> {
    state.favicon.response().await
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
