//! Render cache integration tests.
//!
//! Tests verify:
//! - Repeated requests within the TTL reuse one render
//! - Entries expire after the TTL and are rendered afresh
//! - Keys include the fit mode
//! - Concurrent misses on one key render once
//! - Failures are not cached

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::future::join_all;

use imgrender::render::{FitMode, RenderRequest, RenderService};

use super::test_utils::{
    body_bytes, build_router, build_router_with_clock, get, header, landscape_store,
    MockImageStore,
};

const TTL: Duration = Duration::from_secs(3600);

// =============================================================================
// Idempotence Within TTL
// =============================================================================

#[tokio::test]
async fn test_repeat_request_is_cache_hit() {
    let store = landscape_store();
    let router = build_router(store.clone());

    let first = get(&router, "/images/120x80").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-render-cache-hit"), "false");
    let first_etag = header(&first, "etag").to_string();
    let first_modified = header(&first, "last-modified").to_string();
    let first_body = body_bytes(first).await;

    let second = get(&router, "/images/120x80").await;
    assert_eq!(header(&second, "x-render-cache-hit"), "true");
    assert_eq!(header(&second, "etag"), first_etag);
    assert_eq!(header(&second, "last-modified"), first_modified);
    assert_eq!(body_bytes(second).await, first_body);

    // One render: one record lookup, one file read
    assert_eq!(store.random_calls(), 1);
    assert_eq!(store.read_calls(), 1);
}

// =============================================================================
// Freshness Transition
// =============================================================================

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let store = landscape_store();
    let (router, clock) = build_router_with_clock(store.clone(), TTL);

    let first = get(&router, "/images/64x64").await;
    let first_etag = header(&first, "etag").to_string();
    let first_modified = header(&first, "last-modified").to_string();

    // Just inside the window: still cached
    clock.advance(TTL - Duration::from_secs(1));
    let inside = get(&router, "/images/64x64").await;
    assert_eq!(header(&inside, "x-render-cache-hit"), "true");
    assert_eq!(header(&inside, "etag"), first_etag);
    assert_eq!(header(&inside, "cache-control"), "max-age=1");

    // Past the window: rendered again with new validators
    clock.advance(Duration::from_secs(2));
    let after = get(&router, "/images/64x64").await;
    assert_eq!(header(&after, "x-render-cache-hit"), "false");
    assert_ne!(header(&after, "etag"), first_etag);
    assert_ne!(header(&after, "last-modified"), first_modified);
    assert_eq!(header(&after, "cache-control"), "max-age=3600");

    assert_eq!(store.random_calls(), 2);
}

#[tokio::test]
async fn test_zero_ttl_never_caches() {
    let store = landscape_store();
    let (router, _clock) = build_router_with_clock(store.clone(), Duration::ZERO);

    for _ in 0..3 {
        let response = get(&router, "/images/32x32").await;
        assert_eq!(header(&response, "x-render-cache-hit"), "false");
        assert_eq!(header(&response, "cache-control"), "max-age=0");
    }
    assert_eq!(store.random_calls(), 3);
}

// =============================================================================
// Key Distinctness
// =============================================================================

#[tokio::test]
async fn test_mode_is_part_of_key() {
    let store = landscape_store();
    let router = build_router(store.clone());

    let stretch = get(&router, "/images/100x100?mode=stretch").await;
    assert_eq!(header(&stretch, "x-render-cache-hit"), "false");

    let auto = get(&router, "/images/100x100?mode=auto").await;
    assert_eq!(header(&auto, "x-render-cache-hit"), "false");

    // No mode means auto
    let default = get(&router, "/images/100x100").await;
    assert_eq!(header(&default, "x-render-cache-hit"), "true");

    assert_eq!(store.random_calls(), 2);
}

#[tokio::test]
async fn test_sizes_cached_independently() {
    let store = landscape_store();
    let router = build_router(store.clone());

    get(&router, "/images/100x50").await;
    get(&router, "/images/50x100").await;
    let again = get(&router, "/images/100x50").await;

    assert_eq!(header(&again, "x-render-cache-hit"), "true");
    assert_eq!(store.random_calls(), 2);
}

// =============================================================================
// Single-Flight
// =============================================================================

#[tokio::test]
async fn test_concurrent_misses_render_once() {
    let store = landscape_store().with_read_delay(Duration::from_millis(50));
    let router = build_router(store.clone());

    let responses = join_all((0..16).map(|_| {
        let router = router.clone();
        async move { get(&router, "/images/90x60").await }
    }))
    .await;

    let mut etags = Vec::new();
    let mut misses = 0;
    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
        if header(&response, "x-render-cache-hit") == "false" {
            misses += 1;
        }
        etags.push(header(&response, "etag").to_string());
    }

    assert_eq!(misses, 1);
    assert!(etags.iter().all(|e| *e == etags[0]));
    assert_eq!(store.read_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_service_calls_share_entry() {
    let store = landscape_store().with_read_delay(Duration::from_millis(20));
    let service = Arc::new(RenderService::new(store.clone()));
    let request = RenderRequest::new(30, 30, FitMode::Stretch);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.render(request).await.unwrap() })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let first = &outcomes[0].entry;
    assert!(outcomes.iter().all(|o| Arc::ptr_eq(&o.entry, first)));
    assert_eq!(store.read_calls(), 1);

    let (entries, in_flight) = service.cache_stats().await;
    assert_eq!(entries, 1);
    assert_eq!(in_flight, 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_render_is_not_cached() {
    let store = landscape_store();
    let router = build_router(store.clone());

    store.set_fail_reads(true);
    let failed = get(&router, "/images/70x70").await;
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    store.set_fail_reads(false);
    let recovered = get(&router, "/images/70x70").await;
    assert_eq!(recovered.status(), StatusCode::OK);
    assert_eq!(header(&recovered, "x-render-cache-hit"), "false");

    assert_eq!(store.read_calls(), 2);
}

#[tokio::test]
async fn test_empty_store_is_not_cached() {
    let store = MockImageStore::new();
    let router = build_router(store.clone());

    let response = get(&router, "/images/10x10").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(&router, "/images/10x10").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(store.random_calls(), 2);
}

// =============================================================================
// Service Lifecycle
// =============================================================================

#[tokio::test]
async fn test_shutdown_rejects_new_renders_but_serves_cache() {
    let service = RenderService::new(landscape_store());
    let cached = RenderRequest::new(20, 20, FitMode::Auto);
    service.render(cached).await.unwrap();

    service.shutdown();

    let outcome = service.render(cached).await.unwrap();
    assert!(outcome.cache_hit);

    let fresh = RenderRequest::new(21, 21, FitMode::Auto);
    assert!(service.render(fresh).await.is_err());
}
