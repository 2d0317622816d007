//! Inbound request payload.
//!
//! Parsing is deliberately lenient, because browser and script clients send
//! loosely typed JSON: numbers may arrive as strings, `stream` may be any
//! truthy value, and a body that is not JSON at all is treated as an empty
//! payload (which then fails the prompt check).

use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// A validated prompt request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    /// Accepted and validated, but not forwarded to the backend.
    pub temperature: f64,
    pub stream: bool,
    pub response_format: Option<String>,
}

impl PromptRequest {
    /// Validate a decoded JSON payload.
    ///
    /// Anything other than an object (including `null`) is treated as `{}`.
    pub fn from_value(payload: &Value) -> Result<Self, AppError> {
        let empty = serde_json::Map::new();
        let obj = payload.as_object().unwrap_or(&empty);

        let prompt = match obj.get("prompt") {
            Some(Value::String(p)) if !p.is_empty() => p.clone(),
            _ => return Err(AppError::validation("Missing prompt")),
        };

        let temperature = match obj.get("temperature") {
            None | Some(Value::Null) => DEFAULT_TEMPERATURE,
            Some(v) => coerce_f64(v).ok_or_else(|| {
                AppError::validation(format!("Invalid temperature: {v}"))
            })?,
        };

        let max_output_tokens = match obj.get("maxOutputTokens") {
            None | Some(Value::Null) => DEFAULT_MAX_OUTPUT_TOKENS,
            Some(v) => coerce_token_limit(v).ok_or_else(|| {
                AppError::validation(format!("Invalid maxOutputTokens: {v}"))
            })?,
        };

        Ok(Self {
            prompt,
            max_output_tokens,
            temperature,
            stream: obj.get("stream").is_some_and(is_truthy),
            response_format: obj
                .get("responseFormat")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }

    /// Decode and validate a raw request body.
    ///
    /// Unparsable bodies become an empty payload.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        let payload = serde_json::from_slice(body).unwrap_or(Value::Null);
        Self::from_value(&payload)
    }

    pub fn wants_plain_text(&self) -> bool {
        self.response_format.as_deref() == Some("text")
    }
}

fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn coerce_token_limit(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Number(n) => n.as_f64()?.trunc(),
        Value::String(s) => s.trim().parse::<i64>().ok()? as f64,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    (0.0..=f64::from(u32::MAX)).contains(&n).then_some(n as u32)
}

/// Loose truthiness: `false`, `0`, `""`, `[]`, `{}` and `null` are false.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
