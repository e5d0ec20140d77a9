//! Render service layer.
//!
//! This module turns a requested size and fit mode into cached PNG bytes.
//!
//! # Architecture
//!
//! The render service sits between the HTTP layer and the image store:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             Render Service              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TtlCache    │  │  PngScaler on   │  │
//! │  │  (rendered   │  │  WorkerPool     │  │
//! │  │   PNGs)      │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              ImageStore                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`RenderService`]: Main entry point, orchestrates the full pipeline
//! - [`TtlCache`]: Generic time-bounded cache with single-flight population
//! - [`RenderKey`]: Composite cache key `(width, height, mode)`
//! - [`PngScaler`]: Decodes the source, resizes, encodes PNG
//! - [`WorkerPool`]: Bounded pool keeping CPU work off the async executor
//! - [`resolve_dimensions`]: Output size for each [`FitMode`]

mod cache;
mod pool;
mod resolve;
mod scaler;
mod service;

pub use cache::{
    system_time_millis, CacheEntry, Clock, Lookup, ManualClock, SystemClock, TtlCache,
    DEFAULT_CACHE_TTL,
};
pub use pool::WorkerPool;
pub use resolve::{resolve_dimensions, FitMode};
pub use scaler::{PngScaler, ScaledImage, OUTPUT_CONTENT_TYPE};
pub use service::{
    RenderKey, RenderOptions, RenderOutcome, RenderRequest, RenderService, RenderedImage,
    MAX_DIMENSION,
};
