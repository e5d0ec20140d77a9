//! Request timing middleware.
//!
//! Stamps every response with `X-Process-Time`: seconds (as a float) from
//! the request entering the router to the response head being ready. Body
//! streaming time is not included.

use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Response header carrying handler latency in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

pub async fn process_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&elapsed.to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
