//! # imgrender
//!
//! An image server that renders resized variants of stored images on demand
//! and caches each requested size for a bounded time window.
//!
//! ## Features
//!
//! - **Lazy rendering**: Nothing is resized until a size is requested
//! - **Fit modes**: `auto`, `match_width`, `match_height` and `stretch`
//! - **Time-bounded caching**: One render per `(width, height, mode)` per TTL,
//!   with concurrent misses sharing a single render
//! - **Cache-aware responses**: ETag, Last-Modified and a Cache-Control
//!   lifetime that never outlives the cached entry
//! - **Uploads**: Validated, content-hashed and deduplicated
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`render`] - Dimension resolution, scaling, worker pool and result cache
//! - [`store`] - Image records (SQLite) and files (local directory)
//! - [`intake`] - Upload validation and storage
//! - [`server`] - Axum-based HTTP server, routes and response emitter
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgrender::{create_router, LocalImageStore, RenderService, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = LocalImageStore::new("db.db", "files");
//!     store.initialize().await?;
//!
//!     let service = Arc::new(RenderService::new(store));
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod intake;
pub mod render;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, Command, InitDbConfig, ServeConfig};
pub use error::{IoError, RenderError, UploadError};
pub use render::{
    resolve_dimensions, CacheEntry, Clock, FitMode, ManualClock, RenderKey, RenderOptions,
    RenderOutcome, RenderRequest, RenderService, RenderedImage, SystemClock, TtlCache,
};
pub use server::{create_router, AppState, ImageResponse, RouterConfig};
pub use store::{ImageRecord, ImageStore, LocalImageStore, NewImageRecord};
