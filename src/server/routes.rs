//! Router configuration for the image server.
//!
//! This module defines the HTTP routes and applies middleware for CORS,
//! request timing, upload size limits and tracing.
//!
//! # Route Structure
//!
//! ```text
//! /health                                          - Health check
//! /favicon.ico                                     - Site icon
//! /images                                          - Upload (POST)
//! /images/{width}x{height}?mode=                   - Resized image (GET, HEAD)
//! /browser_cache_headers_test/{width}x{height}/{mode} - Header test page
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use imgrender::render::RenderService;
//! use imgrender::server::{create_router, RouterConfig};
//! use imgrender::store::LocalImageStore;
//!
//! let store = LocalImageStore::new("db.db", "files");
//! let service = Arc::new(RenderService::new(store));
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{CONTENT_TYPE, IF_NONE_MATCH};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    cache_test_page_handler, favicon_handler, health_handler, image_handler, upload_handler,
    AppState,
};
use super::response::DEFAULT_CHUNK_SIZE;
use super::timing::process_time_middleware;
use crate::render::RenderService;
use crate::store::ImageStore;

/// Default upload body limit (32 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Body chunk size for image responses
    pub chunk_size: usize,

    /// Largest accepted upload body
    pub max_upload_bytes: usize,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - Image bodies stream in 4096 byte chunks
    /// - Uploads are limited to 32 MiB
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// The service is shared, not owned: the caller keeps a handle so it can
/// shut the worker pool down after the server stops.
pub fn create_router<S>(render_service: Arc<RenderService<S>>, config: RouterConfig) -> Router
where
    S: ImageStore,
{
    let app_state = AppState::new(render_service).with_chunk_size(config.chunk_size);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/favicon.ico", get(favicon_handler::<S>))
        .route(
            "/images",
            post(upload_handler::<S>).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/images/{dimensions}", get(image_handler::<S>))
        .route(
            "/browser_cache_headers_test/{dimensions}/{mode}",
            get(cache_test_page_handler),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(process_time_middleware));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, IF_NONE_MATCH])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
