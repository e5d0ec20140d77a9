//! API integration tests for image retrieval and error handling.
//!
//! Tests verify:
//! - Resized image retrieval for each fit mode
//! - Error cases (empty store, malformed size, unknown mode, missing file)
//! - HTTP response codes and headers, HEAD and conditional requests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;

use super::test_utils::{
    body_bytes, body_json, build_router, build_router_with_clock, decoded_dimensions, get, header,
    is_valid_png, jpeg_fixture, landscape_store, png_fixture, MockImageStore,
};

// =============================================================================
// Basic Retrieval
// =============================================================================

#[tokio::test]
async fn test_image_retrieval_success() {
    let router = build_router(landscape_store());

    let response = get(&router, "/images/400x300").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert!(response.headers().contains_key("etag"));
    assert!(response.headers().contains_key("last-modified"));
    assert!(response.headers().contains_key("cache-control"));
    assert!(response.headers().contains_key("content-disposition"));

    let length: usize = header(&response, "content-length").parse().unwrap();
    let body = body_bytes(response).await;
    assert_eq!(body.len(), length);
    assert!(is_valid_png(&body));

    // Landscape source under auto matches the requested width
    assert_eq!(decoded_dimensions(&body), (400, 200));
}

#[tokio::test]
async fn test_each_mode_resolves_size() {
    let router = build_router(landscape_store());

    let cases = [
        ("/images/400x300?mode=auto", (400, 200)),
        ("/images/400x300?mode=match_width", (400, 200)),
        ("/images/400x300?mode=match_height", (600, 300)),
        ("/images/400x300?mode=stretch", (400, 300)),
    ];

    for (uri, expected) in cases {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        let body = body_bytes(response).await;
        assert_eq!(decoded_dimensions(&body), expected, "{}", uri);
    }
}

#[tokio::test]
async fn test_portrait_auto_matches_height() {
    let store = MockImageStore::new().with_image("tall.jpg", "tall.jpg", jpeg_fixture(300, 600));
    let router = build_router(store);

    let response = get(&router, "/images/100x200").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(decoded_dimensions(&body), (100, 200));
}

#[tokio::test]
async fn test_content_disposition_names_source() {
    let router = build_router(landscape_store());

    let response = get(&router, "/images/40x30").await;
    let disposition = header(&response, "content-disposition");
    assert!(disposition.starts_with("inline; filename=\"landscape.png_40x30_wide.png\""));
    assert!(disposition.contains("creation-date="));
    assert!(disposition.contains("modification-date="));
    assert!(disposition.contains("read-date="));
}

#[tokio::test]
async fn test_chunked_body_is_complete() {
    // Large enough to span several 4096 byte chunks
    let store = MockImageStore::new().with_image("big.png", "big.png", png_fixture(1200, 900, 3));
    let router = build_router(store);

    let response = get(&router, "/images/1200x900?mode=stretch").await;
    let length: usize = header(&response, "content-length").parse().unwrap();
    let body = body_bytes(response).await;

    assert_eq!(body.len(), length);
    assert_eq!(decoded_dimensions(&body), (1200, 900));
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_empty_store_returns_404() {
    let router = build_router(MockImageStore::new());

    let response = get(&router, "/images/100x100").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error = body_json(response).await;
    assert_eq!(error["error"], "not_found");
    assert_eq!(error["status"], 404);
}

#[tokio::test]
async fn test_malformed_size_returns_400() {
    let router = build_router(landscape_store());

    for uri in [
        "/images/abcx100",
        "/images/100xabc",
        "/images/100",
        "/images/-5x100",
        "/images/+5x100",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let error = body_json(response).await;
        assert_eq!(error["error"], "invalid_parameter", "{}", uri);
        assert!(error["message"].as_str().unwrap().contains("8192"));
    }
}

#[tokio::test]
async fn test_oversized_dimensions_are_clamped() {
    let store = MockImageStore::new().with_image("tiny.png", "tiny.png", png_fixture(8, 4, 0));
    let router = build_router(store);

    let response = get(&router, "/images/10000x1?mode=match_height").await;
    assert_eq!(response.status(), StatusCode::OK);
    let clamped = header(&response, "content-disposition").to_string();
    let body = body_bytes(response).await;
    assert_eq!(decoded_dimensions(&body), (2, 1));

    // Same key as the clamped size
    let response = get(&router, "/images/8192x1?mode=match_height").await;
    assert_eq!(header(&response, "x-render-cache-hit"), "true");
    assert!(clamped.contains("filename=\"tiny.png_8192x1_tiny.png\""));
}

#[tokio::test]
async fn test_invalid_request_does_not_touch_store() {
    let store = landscape_store();
    let router = build_router(store.clone());

    let response = get(&router, "/images/abcx100").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.random_calls(), 0);
}

#[tokio::test]
async fn test_unknown_mode_returns_400() {
    let router = build_router(landscape_store());

    let response = get(&router, "/images/100x100?mode=fill").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert_eq!(error["error"], "invalid_parameter");
}

#[tokio::test]
async fn test_zero_area_output_returns_400() {
    let router = build_router(landscape_store());

    let response = get(&router, "/images/400x0?mode=stretch").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert_eq!(error["error"], "empty_output");
}

#[tokio::test]
async fn test_max_dimension_accepted() {
    let store = MockImageStore::new().with_image("tiny.png", "tiny.png", png_fixture(8, 4, 0));
    let router = build_router(store);

    let response = get(&router, "/images/8192x1?mode=match_height").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(decoded_dimensions(&body), (2, 1));
}

#[tokio::test]
async fn test_missing_file_returns_500() {
    let store = MockImageStore::new().with_dangling_record("gone.png");
    let router = build_router(store);

    let response = get(&router, "/images/10x10").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_undecodable_file_returns_500() {
    let store = MockImageStore::new().with_image("junk.png", "junk.png", b"not an image".to_vec());
    let router = build_router(store);

    let response = get(&router, "/images/10x10").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let error = body_json(response).await;
    assert_eq!(error["error"], "decode_error");
}

// =============================================================================
// Header Semantics
// =============================================================================

#[tokio::test]
async fn test_head_has_headers_but_no_body() {
    let router = build_router(landscape_store());

    let request = Request::builder()
        .method("HEAD")
        .uri("/images/200x100")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert!(response.headers().contains_key("etag"));
    let length: usize = header(&response, "content-length").parse().unwrap();
    assert!(length > 0);

    let body = body_bytes(response).await;
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_if_none_match_returns_304() {
    let router = build_router(landscape_store());

    let first = get(&router, "/images/200x100").await;
    let etag = header(&first, "etag").to_string();

    let request = Request::builder()
        .uri("/images/200x100")
        .header("if-none-match", &etag)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, "etag"), etag);
    assert!(response.headers().contains_key("cache-control"));
    assert!(body_bytes(response).await.is_empty());

    // A stale validator gets the full image
    let request = Request::builder()
        .uri("/images/200x100")
        .header("if-none-match", "\"something-else\"")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_max_age_within_ttl() {
    let ttl = Duration::from_secs(600);
    let (router, clock) = build_router_with_clock(landscape_store(), ttl);

    let response = get(&router, "/images/50x50").await;
    assert_eq!(header(&response, "cache-control"), "max-age=600");

    clock.advance(Duration::from_secs(250));
    let response = get(&router, "/images/50x50").await;
    assert_eq!(header(&response, "x-render-cache-hit"), "true");
    assert_eq!(header(&response, "cache-control"), "max-age=350");
}

#[tokio::test]
async fn test_process_time_header_on_every_response() {
    let router = build_router(landscape_store());

    for uri in ["/images/10x10", "/images/abcx10", "/health"] {
        let response = get(&router, uri).await;
        let seconds: f64 = header(&response, "x-process-time").parse().unwrap();
        assert!(seconds >= 0.0, "{}", uri);
    }
}

// =============================================================================
// Other Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let router = build_router(MockImageStore::new());

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_cache_test_page() {
    let router = build_router(MockImageStore::new());

    let response = get(&router, "/browser_cache_headers_test/320x240/match_width").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").starts_with("text/html"));

    let body = body_bytes(response).await;
    let page = std::str::from_utf8(&body).unwrap();
    assert!(page.contains("<img src=\"/images/320x240?mode=match_width\">"));
}

#[tokio::test]
async fn test_cache_test_page_rejects_bad_mode() {
    let router = build_router(MockImageStore::new());

    let response = get(&router, "/browser_cache_headers_test/320x240/fill").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_favicon_served_from_cache() {
    let router = build_router(MockImageStore::new());

    let first = get(&router, "/favicon.ico").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "content-type"), "image/x-icon");
    assert!(header(&first, "cache-control").starts_with("max-age="));
    let first_body = body_bytes(first).await;
    assert_eq!(&first_body[..4], &[0, 0, 1, 0]);

    let second = get(&router, "/favicon.ico").await;
    assert_eq!(body_bytes(second).await, first_body);
}
