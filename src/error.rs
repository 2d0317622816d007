//! Error taxonomy for the proxy and its HTTP mapping.
//!
//! Every failure a request can hit ends up as an [`AppError`], which renders
//! itself as `{"error": "<message>"}` with a status chosen by kind:
//!
//! | Variant | Status |
//! |---|---|
//! | [`AppError::Validation`] | 400 |
//! | [`AppError::MissingCredential`] | 400 |
//! | [`AppError::Backend`] | 500 |
//!
//! Handlers return `Result<Response, AppError>` and propagate with `?`;
//! backend code works in [`anyhow`] and converts via the `From` impl.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::api::with_cors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or incomplete request payload. The message is sent verbatim.
    #[error("{0}")]
    Validation(String),

    /// Neither API-key variable was set at startup.
    #[error("Missing GEMINI_API_KEY")]
    MissingCredential,

    /// Anything the Gemini call raised: transport, HTTP status, decoding.
    #[error("{0:#}")]
    Backend(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingCredential => StatusCode::BAD_REQUEST,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "backend error");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }

        with_cors((status, Json(json!({ "error": self.to_string() }))).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // -----------------------------------------------------------------------
    // IntoResponse
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn validation_error_is_400_with_message_verbatim() {
        let response = AppError::validation("Missing prompt").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing prompt");
    }

    #[tokio::test]
    async fn missing_credential_is_400() {
        let response = AppError::MissingCredential.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing GEMINI_API_KEY");
    }

    #[tokio::test]
    async fn backend_error_is_500_with_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("POST /v1beta/models/x");
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        let msg = json["error"].as_str().unwrap();
        assert!(msg.contains("POST /v1beta/models/x"), "missing context: {msg}");
        assert!(msg.contains("connection refused"), "missing cause: {msg}");
    }

    #[tokio::test]
    async fn error_responses_carry_cors_and_json_content_type() {
        let response = AppError::validation("nope").into_response();
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        assert_eq!(headers["content-type"], "application/json");
    }

    // -----------------------------------------------------------------------
    // Conversions & formatting
    // -----------------------------------------------------------------------

    #[test]
    fn converts_from_anyhow_error() {
        let err: AppError = anyhow::anyhow!("plain anyhow").into();
        assert!(matches!(err, AppError::Backend(_)));
    }

    #[test]
    fn debug_format_includes_inner_error_message() {
        let err = AppError::validation("debug me");
        let s = format!("{err:?}");
        assert!(s.contains("debug me"), "debug output: {s}");
    }
}
