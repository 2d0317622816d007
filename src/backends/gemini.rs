//! Gemini `generateContent` client.
//!
//! Speaks the REST API directly:
//!
//! | Call | Endpoint |
//! |---|---|
//! | buffered | `POST /v1beta/models/{model}:generateContent` |
//! | streaming | `POST /v1beta/models/{model}:streamGenerateContent?alt=sse` |
//!
//! Authentication is the `x-goog-api-key` header.
//!
//! # Parameter profiles
//!
//! API revisions differ in which request fields they accept. The deployment
//! picks a [`ParamProfile`]; under [`ParamProfile::Auto`] the full body is
//! tried first and, only if Gemini rejects the *shape* of the request (an
//! unknown or invalid field name), the call is repeated once with the prompt
//! alone. Transport errors, quota errors and every other status propagate
//! unmodified.

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::{Stream, StreamExt as _};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Generation, TextStream};
use crate::{
    config::{BackendConfig, ParamProfile},
    error::AppError,
};

/// The one model this proxy serves.
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Fragments buffered between the SSE reader task and the HTTP response.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Failure of a single `generateContent` round trip.
#[derive(Debug, thiserror::Error)]
enum CallError {
    /// HTTP 400 naming a field the API does not accept.
    #[error("Gemini rejected the request parameters: {0}")]
    ParamsRejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<CallError> for AppError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Other(inner) => AppError::Backend(inner),
            rejected => AppError::Backend(anyhow::Error::new(rejected)),
        }
    }
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    /// Buffered requests; has the configured request timeout.
    client: Client,
    /// Streaming requests; no request-level timeout.
    stream_client: Client,
    base_url: String,
    api_key: Option<String>,
    params: ParamProfile,
}

impl GeminiClient {
    /// Build a client. A missing key is not an error here; it surfaces as
    /// [`AppError::MissingCredential`] on the first call.
    pub fn new(cfg: &BackendConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("building reqwest client")?;

        let stream_client = Client::builder()
            .default_headers(headers)
            .build()
            .context("building streaming reqwest client")?;

        Ok(Self {
            client,
            stream_client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            params: cfg.params,
        })
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key.as_deref().ok_or(AppError::MissingCredential)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/v1beta/models/{GEMINI_MODEL}:{method}", self.base_url)
    }

    /// Run a buffered generation call and shape the result.
    #[tracing::instrument(skip(self, prompt))]
    pub async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation, AppError> {
        let key = self.api_key()?;

        let response = match self.params {
            ParamProfile::Full => {
                self.generate_content(key, &request_body(prompt, Some(max_output_tokens)))
                    .await?
            }
            ParamProfile::Minimal => self.generate_content(key, &request_body(prompt, None)).await?,
            ParamProfile::Auto => {
                match self
                    .generate_content(key, &request_body(prompt, Some(max_output_tokens)))
                    .await
                {
                    Err(CallError::ParamsRejected(detail)) => {
                        warn!(%detail, "full parameter set rejected, retrying with prompt only");
                        self.generate_content(key, &request_body(prompt, None)).await?
                    }
                    other => other?,
                }
            }
        };

        Ok(Generation {
            text: response_text(&response).trim().to_string(),
            model: GEMINI_MODEL.to_string(),
            raw: Some(response),
        })
    }

    async fn generate_content(&self, key: &str, body: &Value) -> Result<Value, CallError> {
        let url = self.url("generateContent");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        let text = response.text().await.context("reading Gemini response body")?;

        if !status.is_success() {
            if is_params_rejection(status, &text) {
                return Err(CallError::ParamsRejected(text));
            }
            return Err(anyhow::anyhow!("Gemini returned HTTP {status}: {text}").into());
        }

        let parsed = serde_json::from_str(&text)
            .with_context(|| format!("parsing Gemini response as JSON: {text}"))?;
        Ok(parsed)
    }

    /// Open a `streamGenerateContent` SSE stream and translate its events into
    /// text fragments on the fly.
    ///
    /// A background task reads the SSE body and forwards fragments through a
    /// bounded channel; it exits as soon as the returned stream is dropped.
    pub async fn stream_content(&self, prompt: &str, max_output_tokens: u32) -> Result<TextStream, AppError> {
        let key = self.api_key()?;
        let body = match self.params {
            ParamProfile::Minimal => request_body(prompt, None),
            ParamProfile::Full | ParamProfile::Auto => request_body(prompt, Some(max_output_tokens)),
        };

        let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
        let response = self
            .stream_client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url} (streaming)"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini returned HTTP {status}: {text}").into());
        }

        let (tx, mut rx) = mpsc::channel::<anyhow::Result<String>>(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(pump(response.bytes_stream(), tx));

        let stream = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
        Ok(Box::pin(stream))
    }
}

/// Read an SSE body and forward its text fragments to `tx`.
///
/// Returns when the body ends, on the first transport or in-band error, or as
/// soon as the receiving side of `tx` is dropped.
async fn pump<S, E>(byte_stream: S, tx: mpsc::Sender<anyhow::Result<String>>)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    // Raw bytes: a multi-byte character may straddle two chunks, but never a
    // newline.
    let mut buf: Vec<u8> = Vec::new();
    let mut trim = TrimEdges::default();
    let mut fragments = 0usize;

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Gemini stream interrupted");
                let _ = tx.send(Err(anyhow::Error::new(e).context("reading Gemini stream"))).await;
                return;
            }
        };
        buf.extend_from_slice(&bytes);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&buf[..pos]).trim_end_matches('\r').to_string();
            buf.drain(..=pos);

            let Some(data) = line.strip_prefix("data:").map(str::trim) else { continue };
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let event: Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "skipping non-JSON stream event");
                    continue;
                }
            };

            if let Some(err) = event.get("error") {
                let _ = tx.send(Err(anyhow::anyhow!("Gemini stream error: {err}"))).await;
                return;
            }

            for fragment in fragments_from_event(&event).iter().filter_map(|f| trim.push(f)) {
                fragments += 1;
                if tx.send(Ok(fragment)).await.is_err() {
                    debug!(fragments, "stream consumer went away");
                    return;
                }
            }
        }
    }
    debug!(fragments, "Gemini stream finished");
}

/// Trims a text delivered in pieces the way [`str::trim`] trims it whole.
///
/// Leading whitespace is dropped until the first visible character; trailing
/// whitespace is held back until more text follows it and is discarded if
/// the stream ends first.
#[derive(Debug, Default)]
pub(crate) struct TrimEdges {
    started: bool,
    pending: String,
}

impl TrimEdges {
    /// Feed the next fragment; returns what can be emitted now, if anything.
    pub(crate) fn push(&mut self, fragment: &str) -> Option<String> {
        let fragment = if self.started { fragment } else { fragment.trim_start() };
        if fragment.is_empty() {
            return None;
        }
        self.started = true;

        let mut text = std::mem::take(&mut self.pending);
        text.push_str(fragment);
        let visible = text.trim_end().len();
        if visible == 0 {
            self.pending = text;
            return None;
        }
        self.pending = text.split_off(visible);
        Some(text)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Request / response shaping
// ──────────────────────────────────────────────────────────────────────────────

/// Build a `generateContent` request body. `None` omits `generationConfig`.
pub(crate) fn request_body(prompt: &str, max_output_tokens: Option<u32>) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
    });
    if let Some(limit) = max_output_tokens {
        body["generationConfig"] = json!({ "maxOutputTokens": limit });
    }
    body
}

/// Concatenate the text parts of the first candidate, skipping thought parts.
/// Empty when the response carries no text.
pub(crate) fn response_text(resp: &Value) -> String {
    candidate_texts(resp).concat()
}

fn candidate_texts(resp: &Value) -> Vec<String> {
    resp.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p["thought"] != Value::Bool(true))
                .filter_map(|p| p["text"].as_str())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Turn one streamed event into zero or more text fragments.
///
/// Accepts a bare string, an object with a `text` or `output` field (string
/// or array of strings, one fragment per element), or a regular
/// `GenerateContentResponse` chunk. Empty fragments are dropped.
pub(crate) fn fragments_from_event(event: &Value) -> Vec<String> {
    let fragments = match event {
        Value::String(s) => vec![s.clone()],
        Value::Object(obj) => match obj.get("text").or_else(|| obj.get("output")) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => candidate_texts(event),
        },
        _ => Vec::new(),
    };
    fragments.into_iter().filter(|f| !f.is_empty()).collect()
}

/// Gemini reports unknown request fields as `400 INVALID_ARGUMENT` with an
/// "Invalid JSON payload … Unknown name" message.
fn is_params_rejection(status: StatusCode, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST
        && (body.contains("Unknown name") || body.contains("Invalid JSON payload"))
}
