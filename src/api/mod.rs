//! HTTP surface: the proxy route plus a liveness probe.
//!
//! Handlers are thin: they translate HTTP concerns (methods, status codes,
//! content types) into calls on the configured [`Generator`] and back.

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;

use crate::backends::Generator;

pub mod proxy;

/// Cross-origin headers attached to every proxy response.
pub const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
];

/// Shared, immutable per-process state.
pub struct AppState {
    pub generator: Arc<dyn Generator>,
}

/// Build the axum router with the proxy mounted at `route`.
pub fn router(state: Arc<AppState>, route: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(route, any(proxy::handle))
        .with_state(state)
}

/// `GET /healthz`: 200 `{"status": "ok"}` without touching the backend.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub(crate) fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}
