//! Render Service for orchestrating lazy image renders.
//!
//! The RenderService is the main entry point for image requests. It
//! orchestrates:
//! - Cache lookups by `(width, height, mode)`
//! - Random record selection from the store
//! - Off-path decoding, scaling and PNG encoding
//! - Result caching with single-flight population
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RenderService                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                      render()                           │    │
//! │  │  1. Derive key        4. Read stored file               │    │
//! │  │  2. Check cache       5. Scale on worker pool           │    │
//! │  │  3. Pick a record     6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TtlCache  │      │  ImageStore  │    │ WorkerPool +     │  │
//! │    │           │      │              │    │ PngScaler        │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::RenderError;
use crate::store::ImageStore;

use super::cache::{CacheEntry, Clock, SystemClock, TtlCache, DEFAULT_CACHE_TTL};
use super::pool::WorkerPool;
use super::resolve::FitMode;
use super::scaler::PngScaler;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 8192;

// =============================================================================
// Render Request
// =============================================================================

/// A request for a resized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    /// Requested width (0-8192)
    pub width: u32,

    /// Requested height (0-8192)
    pub height: u32,

    /// How the requested size relates to the source aspect ratio
    pub mode: FitMode,
}

impl RenderRequest {
    /// Create a request, clamping each dimension to [`MAX_DIMENSION`].
    pub fn new(width: u32, height: u32, mode: FitMode) -> Self {
        Self {
            width: width.min(MAX_DIMENSION),
            height: height.min(MAX_DIMENSION),
            mode,
        }
    }

    /// Parse a `{width}x{height}` path segment and optional mode name.
    ///
    /// Both numbers must be plain decimal digits; signs and whitespace are
    /// rejected. Values above [`MAX_DIMENSION`] are clamped to it.
    pub fn parse(dimensions: &str, mode: Option<&str>) -> Result<Self, RenderError> {
        let (width, height) = dimensions.split_once('x').ok_or_else(bad_dimensions)?;
        let mode = match mode {
            Some(name) => name.parse()?,
            None => FitMode::default(),
        };
        Ok(Self::new(parse_dimension(width)?, parse_dimension(height)?, mode))
    }

    /// The cache key for this request.
    pub fn key(&self) -> RenderKey {
        RenderKey {
            width: self.width,
            height: self.height,
            mode: self.mode,
        }
    }
}

fn parse_dimension(value: &str) -> Result<u32, RenderError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_dimensions());
    }
    // Only overflow can fail here, and anything that large clamps anyway
    Ok(value.parse::<u32>().unwrap_or(MAX_DIMENSION).min(MAX_DIMENSION))
}

fn bad_dimensions() -> RenderError {
    RenderError::invalid(format!(
        "Bad parameters, expected {{width}}x{{height}} as non-negative integers (clamped to 0-{})",
        MAX_DIMENSION
    ))
}

/// Cache key for rendered images.
///
/// Two requests share a key exactly when width, height and mode all match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub width: u32,
    pub height: u32,
    pub mode: FitMode,
}

// =============================================================================
// Rendered Image
// =============================================================================

/// A rendered variant and the record it was rendered from.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    /// Stored filename of the source record
    pub stored_filename: String,

    /// Filename the source was uploaded under
    pub original_filename: String,

    /// Source record creation time (epoch milliseconds)
    pub record_created_at: i64,

    /// PNG-encoded output
    pub bytes: Bytes,

    /// Resolved output width
    pub width: u32,

    /// Resolved output height
    pub height: u32,
}

/// Response from the render service.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// The fresh cache entry (its `stored_at` is the render time)
    pub entry: Arc<CacheEntry<RenderedImage>>,

    /// Whether the entry was served from cache
    pub cache_hit: bool,
}

// =============================================================================
// Render Service
// =============================================================================

/// Tunables for [`RenderService`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// How long a rendered variant stays fresh
    pub cache_ttl: Duration,

    /// Concurrent render jobs (0 = one per CPU)
    pub workers: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            workers: 0,
        }
    }
}

/// Service for rendering and caching resized images.
///
/// Constructed once at startup and shared by all handlers. It owns the
/// result cache and the worker pool; [`shutdown`](Self::shutdown) stops the
/// pool from accepting new renders.
///
/// # Type Parameters
///
/// * `S` - The image store supplying records and their files
///
/// # Example
///
/// ```ignore
/// use imgrender::render::{RenderRequest, RenderService, FitMode};
///
/// let service = RenderService::new(store);
/// let request = RenderRequest::new(640, 480, FitMode::Auto);
/// let outcome = service.render(request).await?;
///
/// println!("{} bytes, cache hit: {}", outcome.entry.value().bytes.len(), outcome.cache_hit);
/// ```
pub struct RenderService<S: ImageStore> {
    store: Arc<S>,

    cache: Arc<TtlCache<RenderKey, RenderedImage>>,

    pool: WorkerPool,

    scaler: PngScaler,
}

impl<S: ImageStore> RenderService<S> {
    /// Create a service with a 1 hour TTL and one worker per CPU.
    pub fn new(store: S) -> Self {
        Self::with_options(store, RenderOptions::default())
    }

    pub fn with_options(store: S, options: RenderOptions) -> Self {
        Self::with_clock(store, options, Arc::new(SystemClock))
    }

    /// Create a service whose cache is stamped and aged by `clock`.
    pub fn with_clock(store: S, options: RenderOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(store),
            cache: Arc::new(TtlCache::with_clock(options.cache_ttl, clock)),
            pool: WorkerPool::new(options.workers),
            scaler: PngScaler::new(),
        }
    }

    /// Get a rendered image, using the cache when a fresh entry exists.
    ///
    /// On a miss the render runs in its own task: if the caller goes away the
    /// render still completes and is cached. Concurrent misses on one key
    /// share a single render.
    ///
    /// # Errors
    ///
    /// - `EmptyStore` if there are no records
    /// - `Io` if the store fails or the record's file is missing
    /// - `Decode`, `DegenerateSource`, `EmptyOutput`, `Encode` from the scaler
    pub async fn render(&self, request: RenderRequest) -> Result<RenderOutcome, RenderError> {
        let key = request.key();

        if let Some(entry) = self.cache.get(&key).await {
            debug!(
                width = request.width,
                height = request.height,
                mode = %request.mode,
                "render cache hit"
            );
            return Ok(RenderOutcome {
                entry,
                cache_hit: true,
            });
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let pool = self.pool.clone();
        let scaler = self.scaler.clone();

        let lookup = tokio::spawn(async move {
            cache
                .get_or_try_insert_with(key, || generate(store.as_ref(), &pool, scaler, request))
                .await
        })
        .await
        .map_err(|e| RenderError::Worker {
            message: e.to_string(),
        })??;

        Ok(RenderOutcome {
            entry: lookup.entry,
            cache_hit: lookup.hit,
        })
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Current time according to the cache clock.
    pub fn now(&self) -> SystemTime {
        self.cache.now()
    }

    /// Get cache statistics.
    ///
    /// Returns `(entry_count, in_flight_keys)`.
    pub async fn cache_stats(&self) -> (usize, usize) {
        (self.cache.len().await, self.cache.in_flight().await)
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Stop accepting new renders. Renders already running complete.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

/// Pick a record, load its file and scale it on the worker pool.
async fn generate<S: ImageStore>(
    store: &S,
    pool: &WorkerPool,
    scaler: PngScaler,
    request: RenderRequest,
) -> Result<RenderedImage, RenderError> {
    let record = store
        .random_record()
        .await?
        .ok_or(RenderError::EmptyStore)?;

    let raw = store.read_file(&record.stored_filename).await?;

    let target = (request.width, request.height);
    let scaled = pool
        .run(move || scaler.render(&raw, target, request.mode))
        .await?;

    info!(
        record_id = record.id,
        stored_filename = %record.stored_filename,
        mode = %request.mode,
        width = scaled.width,
        height = scaled.height,
        bytes = scaled.bytes.len(),
        "rendered image"
    );

    Ok(RenderedImage {
        stored_filename: record.stored_filename,
        original_filename: record.original_filename,
        record_created_at: record.created_at,
        bytes: scaled.bytes,
        width: scaled.width,
        height: scaled.height,
    })
}

// =============================================================================
// Tests
// =============================================================================
