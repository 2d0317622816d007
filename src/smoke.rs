//! `gemini-proxy --smoke-test [URL]`: post a fixed sample prompt to a running
//! proxy and return its JSON reply.

use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};

pub const DEFAULT_URL: &str = "http://localhost:8080/api/gemini";

/// Target URL: explicit argument, then `GEMINI_TEST_URL`, then [`DEFAULT_URL`].
pub fn target(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var("GEMINI_TEST_URL").ok())
        .unwrap_or_else(|| DEFAULT_URL.to_string())
}

pub fn sample_payload() -> Value {
    json!({ "prompt": "Hello from automated test", "maxOutputTokens": 64 })
}

/// POST the sample payload to `url` and decode the response.
///
/// Non-2xx statuses are failures. An empty body decodes as `{}`.
pub async fn run(url: &str) -> anyhow::Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("building reqwest client")?;

    let response = client
        .post(url)
        .json(&sample_payload())
        .send()
        .await
        .with_context(|| format!("POST {url}"))?
        .error_for_status()?;

    let body = response.bytes().await.context("reading response body")?;
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(&body).context("parsing response as JSON")
}
