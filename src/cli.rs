//! Process mode: `gemini-proxy --cli`.
//!
//! Reads one JSON payload from stdin, runs a buffered generation and writes a
//! single JSON line to stdout: the `{text, model, raw}` result (exit 0) or
//! `{"error": "..."}` (exit 1). `stream` and `responseFormat` are ignored.

use std::io::Write;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt as _};

use crate::{
    backends::{self, Generator},
    config::Config,
    payload::PromptRequest,
};

/// Build the backend from the startup configuration, then [`run`].
///
/// A configuration or backend-construction failure is reported on `output`
/// like any other failure.
pub async fn start<R, W>(config: anyhow::Result<Config>, input: R, output: W) -> i32
where
    R: AsyncRead + Unpin,
    W: Write,
{
    match config.and_then(|config| backends::build(&config)) {
        Ok(generator) => run(generator.as_ref(), input, output).await,
        Err(e) => finish(output, Err(format!("{e:#}"))),
    }
}

/// Run one CLI invocation and return the process exit code.
pub async fn run<R, W>(generator: &dyn Generator, mut input: R, output: W) -> i32
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut raw = String::new();
    let outcome = match input.read_to_string(&mut raw).await {
        Ok(_) => execute(generator, &raw).await,
        Err(e) => Err(format!("reading stdin: {e}")),
    };
    finish(output, outcome)
}

/// Write the single output line and map the outcome to an exit code.
fn finish<W: Write>(mut output: W, outcome: Result<Value, String>) -> i32 {
    let (document, code) = match outcome {
        Ok(result) => (result, 0),
        Err(message) => {
            tracing::debug!(%message, "cli run failed");
            (json!({ "error": message }), 1)
        }
    };

    if let Err(e) = writeln!(output, "{document}").and_then(|()| output.flush()) {
        tracing::error!(error = %e, "writing cli output");
        return 1;
    }
    code
}

async fn execute(generator: &dyn Generator, raw: &str) -> Result<Value, String> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    let payload: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let request = PromptRequest::from_value(&payload).map_err(|e| e.to_string())?;

    let generation = generator
        .generate(&request.prompt, request.max_output_tokens)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(generation).map_err(|e| e.to_string())
}
