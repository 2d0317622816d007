//! Text-generation backends.
//!
//! The proxy talks to the model through the [`Generator`] capability
//! interface. Two variants exist, differing only in how they stream:
//!
//! - [`StreamingBackend`]: true incremental delivery via Gemini's
//!   `streamGenerateContent`, falling back to buffered slicing if the stream
//!   cannot be opened.
//! - [`BufferedBackend`]: generate in full, then emit fixed-size slices of the
//!   text with a short pause between them.
//!
//! Both share one [`GeminiClient`] for the actual HTTP calls. The variant is
//! chosen once at startup from `backend.streaming`.

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::{Config, StreamMode},
    error::AppError,
};

pub mod buffered;
pub mod gemini;
pub mod streaming;

pub use buffered::BufferedBackend;
pub use gemini::{GeminiClient, GEMINI_MODEL};
pub use streaming::StreamingBackend;

/// Lazy, finite sequence of text fragments. Dropping it stops production.
pub type TextStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Result of a buffered generation call, serialised as the JSON response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    /// Generated text, trimmed of surrounding whitespace.
    pub text: String,
    /// Model identifier that produced `text`.
    pub model: String,
    /// The backend's full response, passed through for diagnostics.
    pub raw: Option<Value>,
}

/// Capability interface for anything that can turn a prompt into text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the full response for `prompt`.
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation, AppError>;

    /// Generate the response as a stream of fragments whose concatenation is
    /// the generated text.
    async fn stream(&self, prompt: &str, max_output_tokens: u32) -> Result<TextStream, AppError>;
}

/// Build the configured [`Generator`] variant.
pub fn build(config: &Config) -> anyhow::Result<Arc<dyn Generator>> {
    let client = Arc::new(GeminiClient::new(&config.backend, config.api_key.clone())?);
    let buffered = BufferedBackend::new(Arc::clone(&client), &config.backend);

    tracing::debug!(streaming = %config.backend.streaming, params = ?config.backend.params, "backend selected");

    Ok(match config.backend.streaming {
        StreamMode::Native => Arc::new(StreamingBackend::new(client, buffered)),
        StreamMode::Buffered => Arc::new(buffered),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generation_serialises_with_null_raw() {
        let g = Generation {
            text: "hi".into(),
            model: GEMINI_MODEL.into(),
            raw: None,
        };
        assert_eq!(
            serde_json::to_value(&g).unwrap(),
            json!({ "text": "hi", "model": "gemini-2.5-flash", "raw": null })
        );
    }

    #[test]
    fn build_accepts_both_stream_modes() {
        let mut config = Config::default();
        assert!(build(&config).is_ok());
        config.backend.streaming = StreamMode::Buffered;
        assert!(build(&config).is_ok());
    }
}
