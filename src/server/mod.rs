//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET|HEAD /images/{w}x{h}    POST /images    /favicon.ico      │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────┐  ┌──────────┐   │
//! │  │  handlers   │  │  response   │  │  timing  │  │  routes  │   │
//! │  │ (requests,  │  │ (headers,   │  │ (X-Proc- │  │ (router  │   │
//! │  │  errors)    │  │  chunking)  │  │  Time)   │  │  config) │   │
//! │  └─────────────┘  └─────────────┘  └──────────┘  └──────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod favicon;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod timing;

pub use favicon::{draw_favicon, FaviconCache, FAVICON_TTL};
pub use handlers::{
    cache_test_page_handler, favicon_handler, health_handler, image_handler, upload_handler,
    AppState, ErrorResponse, HealthResponse, ImageQueryParams, UploadResponse,
};
pub use response::{
    chunked_body, content_disposition, etag, etag_matches, http_date, max_age, ImageResponse,
    CACHE_HIT_HEADER, DEFAULT_CHUNK_SIZE,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use timing::{process_time_middleware, PROCESS_TIME_HEADER};
