//! Stamps every response with an `X-Request-ID` header and logs 5xxs
//! with it, per spec §7 ("All 5xx responses are logged with a
//! correlation id echoed in the response header").

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub async fn stamp_request_id(request: Request, next: Next) -> Response {
    let request_id = Uuid::now_v7();
    let mut response = next.run(request).await;

    if response.status().is_server_error() {
        tracing::error!(request_id = %request_id, status = %response.status(), "request failed");
    }

    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&request_id.to_string()).expect("uuid is a valid header value"),
    );
    response
}
