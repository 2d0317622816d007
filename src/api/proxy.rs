//! The proxy route.
//!
//! | Request | Response |
//! |---|---|
//! | `OPTIONS` | 204, empty body |
//! | other non-`POST` | 405 `{"error": "Method not allowed"}` |
//! | `POST`, no usable `prompt` | 400 `{"error": "Missing prompt"}` |
//! | `POST`, `stream` truthy | 200 `text/plain`, fragments written as produced |
//! | `POST`, `responseFormat: "text"` | 200 `text/plain`, generated text |
//! | `POST` | 200 `application/json`, `{text, model, raw}` |
//!
//! Backend failures become 500; see [`AppError`] for the full mapping.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::TryStreamExt as _;
use serde_json::json;

use super::{with_cors, AppState};
use crate::{error::AppError, payload::PromptRequest};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Entry point for every method on the proxy route.
///
/// The body is taken as raw bytes so that malformed JSON reaches the
/// validator as an empty payload instead of being rejected by an extractor.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Result<Response, AppError> {
    if method == Method::OPTIONS {
        return Ok(with_cors(StatusCode::NO_CONTENT.into_response()));
    }
    if method != Method::POST {
        return Ok(with_cors(
            (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "error": "Method not allowed" })),
            )
                .into_response(),
        ));
    }

    let request = PromptRequest::from_body(&body)?;
    tracing::debug!(
        stream = request.stream,
        max_output_tokens = request.max_output_tokens,
        temperature = request.temperature,
        response_format = request.response_format.as_deref().unwrap_or("json"),
        "prompt accepted"
    );

    if request.stream {
        let stream = state
            .generator
            .stream(&request.prompt, request.max_output_tokens)
            .await?
            .inspect_err(|e| tracing::warn!(error = %e, "stream aborted mid-response"));
        return Ok(with_cors(
            ([(header::CONTENT_TYPE, TEXT_PLAIN)], Body::from_stream(stream)).into_response(),
        ));
    }

    let generation = state
        .generator
        .generate(&request.prompt, request.max_output_tokens)
        .await?;

    let response = if request.wants_plain_text() {
        ([(header::CONTENT_TYPE, TEXT_PLAIN)], generation.text).into_response()
    } else {
        Json(generation).into_response()
    };
    Ok(with_cors(response))
}
