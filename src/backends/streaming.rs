//! Native streaming with buffered fallback.

use std::sync::Arc;

use async_trait::async_trait;

use super::{BufferedBackend, GeminiClient, Generation, Generator, TextStream};
use crate::error::AppError;

/// Streams through `streamGenerateContent`. If the stream cannot be opened
/// (endpoint unavailable, request rejected, transport error) the request is
/// served by the wrapped [`BufferedBackend`] instead.
///
/// Failures after the first fragment are not retried: the stream ends with
/// an error and the client sees a truncated body.
pub struct StreamingBackend {
    client: Arc<GeminiClient>,
    fallback: BufferedBackend,
}

impl StreamingBackend {
    pub fn new(client: Arc<GeminiClient>, fallback: BufferedBackend) -> Self {
        Self { client, fallback }
    }
}

#[async_trait]
impl Generator for StreamingBackend {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation, AppError> {
        self.client.generate(prompt, max_output_tokens).await
    }

    async fn stream(&self, prompt: &str, max_output_tokens: u32) -> Result<TextStream, AppError> {
        match self.client.stream_content(prompt, max_output_tokens).await {
            Ok(stream) => Ok(stream),
            Err(AppError::MissingCredential) => Err(AppError::MissingCredential),
            Err(e) => {
                tracing::warn!(error = %e, "native stream unavailable, falling back to buffered");
                self.fallback.stream(prompt, max_output_tokens).await
            }
        }
    }
}
