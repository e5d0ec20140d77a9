//! Upload integration tests.
//!
//! Tests verify:
//! - Accepted uploads are stored and become renderable
//! - Duplicates (including concurrent ones), non-images and malformed parts
//!   are rejected
//! - The SQLite-backed store works end to end through the router

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use imgrender::render::RenderService;
use imgrender::store::{ImageStore, LocalImageStore};
use imgrender::{create_router, RouterConfig};

use super::test_utils::{
    body_json, build_router, decoded_dimensions, get, jpeg_fixture, multipart_body, png_fixture,
    upload, MockImageStore, BOUNDARY,
};

#[tokio::test]
async fn test_upload_success() {
    let store = MockImageStore::new();
    let router = build_router(store.clone());

    let data = png_fixture(40, 20, 5);
    let response = upload(&router, multipart_body("cat.png", Some("image/png"), &data)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["id"], 1);
    assert_eq!(json["original_filename"], "cat.png");
    assert!(json["filename"].as_str().unwrap().ends_with(".png"));
    assert_eq!(json["hash"].as_str().unwrap().len(), 64);

    assert_eq!(store.record_count().await, 1);
    let stored = store
        .read_file(json["filename"].as_str().unwrap())
        .await
        .unwrap();
    assert_eq!(&stored[..], &data[..]);
}

#[tokio::test]
async fn test_uploaded_image_is_renderable() {
    let router = build_router(MockImageStore::new());

    let response = get(&router, "/images/10x10").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let data = jpeg_fixture(200, 100);
    let response = upload(&router, multipart_body("dog.jpg", Some("image/jpeg"), &data)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = get(&router, "/images/100x100").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = super::test_utils::body_bytes(response).await;
    assert_eq!(decoded_dimensions(&body), (100, 50));
}

#[tokio::test]
async fn test_duplicate_upload_returns_409() {
    let store = MockImageStore::new();
    let router = build_router(store.clone());
    let data = png_fixture(16, 16, 9);

    let first = upload(&router, multipart_body("a.png", Some("image/png"), &data)).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = upload(&router, multipart_body("b.png", Some("image/png"), &data)).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let json = body_json(second).await;
    assert_eq!(json["message"], "Entry already exists.");
    assert_eq!(store.record_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_uploads_accept_one() {
    let store = MockImageStore::new();
    let router = build_router(store.clone());
    let data = png_fixture(24, 24, 3);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let router = router.clone();
            let body = multipart_body(&format!("{}.png", i), Some("image/png"), &data);
            tokio::spawn(async move { upload(&router, body).await.status() })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.record_count().await, 1);
    assert_eq!(store.file_count().await, 1);
}

#[tokio::test]
async fn test_non_image_upload_returns_400() {
    let store = MockImageStore::new();
    let router = build_router(store.clone());

    // Declared as an image, but the bytes are not
    let response = upload(
        &router,
        multipart_body("fake.png", Some("image/png"), b"hello world"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        "Unknown File Format, accepts: jpeg, png, gif, bmp, webp"
    );

    // Real image bytes, but declared as text
    let data = png_fixture(4, 4, 0);
    let response = upload(&router, multipart_body("a.png", Some("text/plain"), &data)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(store.record_count().await, 0);
}

#[tokio::test]
async fn test_missing_content_type_returns_400() {
    let router = build_router(MockImageStore::new());
    let data = png_fixture(4, 4, 0);

    let response = upload(&router, multipart_body("a.png", None, &data)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["message"], "Malformed header. Content-Type");
}

#[tokio::test]
async fn test_no_file_part_returns_400() {
    let router = build_router(MockImageStore::new());

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let response = upload(&router, body.into_bytes()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "missing_file");
}

#[tokio::test]
async fn test_non_multipart_request_returns_400() {
    let router = build_router(MockImageStore::new());

    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "malformed_body");
}

#[tokio::test]
async fn test_oversized_upload_returns_413() {
    let service = Arc::new(RenderService::new(MockImageStore::new()));
    let router = create_router(
        service,
        RouterConfig::new()
            .with_tracing(false)
            .with_max_upload_bytes(2048),
    );

    let data = vec![0u8; 8192];
    let response = upload(&router, multipart_body("big.png", Some("image/png"), &data)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalImageStore::new(dir.path().join("db.db"), dir.path().join("files"));
    store.initialize().await.unwrap();

    let service = Arc::new(RenderService::new(store));
    let router = create_router(Arc::clone(&service), RouterConfig::new().with_tracing(false));

    let data = png_fixture(300, 150, 2);
    let response = upload(&router, multipart_body("wide.png", Some("image/png"), &data)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;

    let record = service.store().random_record().await.unwrap().unwrap();
    assert_eq!(json["filename"], record.stored_filename.as_str());
    assert_eq!(record.original_filename, "wide.png");

    let response = get(&router, "/images/60x60?mode=match_width").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = super::test_utils::body_bytes(response).await;
    assert_eq!(decoded_dimensions(&body), (60, 30));
}
