//! Compute-then-slice streaming.
//!
//! [`BufferedBackend`] runs a normal generation call, then replays the text
//! as fixed-size fragments with a short pause between them so clients can
//! render progressively. It is also the fallback for [`StreamingBackend`]
//! when a native stream cannot be opened.
//!
//! [`StreamingBackend`]: super::StreamingBackend

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{GeminiClient, Generation, Generator, TextStream};
use crate::{config::BackendConfig, error::AppError};

pub struct BufferedBackend {
    client: Arc<GeminiClient>,
    chunk_chars: usize,
    chunk_delay: Duration,
}

impl BufferedBackend {
    pub fn new(client: Arc<GeminiClient>, cfg: &BackendConfig) -> Self {
        Self {
            client,
            chunk_chars: cfg.chunk_chars.max(1),
            chunk_delay: Duration::from_millis(cfg.chunk_delay_ms),
        }
    }
}

#[async_trait]
impl Generator for BufferedBackend {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation, AppError> {
        self.client.generate(prompt, max_output_tokens).await
    }

    async fn stream(&self, prompt: &str, max_output_tokens: u32) -> Result<TextStream, AppError> {
        let generation = self.client.generate(prompt, max_output_tokens).await?;
        let fragments = slice_text(&generation.text, self.chunk_chars);
        tracing::debug!(fragments = fragments.len(), "replaying buffered generation");
        Ok(paced(fragments, self.chunk_delay))
    }
}

/// Split `text` into fragments of at most `chunk_chars` characters.
///
/// Never splits a character. Empty text yields a single empty fragment so a
/// reader waiting for the first chunk always gets one.
pub(crate) fn slice_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(chunk_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Emit `fragments` one at a time, sleeping `delay` between consecutive ones.
///
/// Lazy: nothing happens until polled, and dropping the stream abandons the
/// remaining fragments.
pub(crate) fn paced(fragments: Vec<String>, delay: Duration) -> TextStream {
    let stream = futures_util::stream::unfold(
        (fragments.into_iter(), true),
        move |(mut rest, first)| async move {
            let next = rest.next()?;
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((Ok::<_, anyhow::Error>(next), (rest, false)))
        },
    );
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt as _, TryStreamExt as _};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // -----------------------------------------------------------------------
    // slice_text / paced
    // -----------------------------------------------------------------------

    #[test]
    fn slices_concatenate_back_to_the_original() {
        let text = "The quick brown fox jumps over the lazy dog.".repeat(10);
        let fragments = slice_text(&text, 128);
        assert_eq!(fragments.len(), 4);
        assert!(fragments.iter().all(|f| f.chars().count() <= 128));
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn empty_text_yields_exactly_one_empty_fragment() {
        assert_eq!(slice_text("", 128), vec![String::new()]);
    }

    #[test]
    fn multibyte_characters_are_never_split() {
        let text = "héllo wörld — ✓✓✓";
        let fragments = slice_text(text, 3);
        assert_eq!(fragments.concat(), text);
        assert!(fragments.iter().all(|f| f.chars().count() <= 3));
    }

    #[tokio::test(start_paused = true)]
    async fn paced_stream_emits_in_order_and_terminates() {
        let fragments = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out: Vec<String> = paced(fragments, Duration::from_millis(10))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_stream_sleeps_only_between_fragments() {
        let start = tokio::time::Instant::now();
        let mut stream = paced(vec!["a".into(), "b".into()], Duration::from_millis(10));

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(stream.next().await.unwrap().unwrap(), "b");
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_early_is_quiet() {
        let fragments: Vec<String> = (0..1_000).map(|i| i.to_string()).collect();
        let mut stream = paced(fragments, Duration::from_millis(1));
        assert_eq!(stream.next().await.unwrap().unwrap(), "0");
        drop(stream);
    }

    // -----------------------------------------------------------------------
    // BufferedBackend against a mock Gemini
    // -----------------------------------------------------------------------

    async fn backend_replying(text: &str, chunk_chars: usize) -> (MockServer, BufferedBackend) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": text }] } }]
            })))
            .mount(&server)
            .await;

        let cfg = BackendConfig {
            base_url: server.uri(),
            chunk_chars,
            chunk_delay_ms: 0,
            ..BackendConfig::default()
        };
        let client = Arc::new(GeminiClient::new(&cfg, Some("test-key".into())).unwrap());
        (server, BufferedBackend::new(client, &cfg))
    }

    #[tokio::test]
    async fn stream_concatenation_equals_generate_text() {
        let (_server, backend) = backend_replying("  A reasonably long answer, sliced.  ", 5).await;

        let full = backend.generate("p", 64).await.unwrap();
        let fragments: Vec<String> = backend.stream("p", 64).await.unwrap().try_collect().await.unwrap();

        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), full.text);
    }

    #[tokio::test]
    async fn stream_of_empty_generation_is_one_empty_fragment() {
        let (_server, backend) = backend_replying("   ", 128).await;
        let fragments: Vec<String> = backend.stream("p", 64).await.unwrap().try_collect().await.unwrap();
        assert_eq!(fragments, vec![String::new()]);
    }
}
