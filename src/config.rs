//! Configuration types for gemini-proxy.
//!
//! Config is resolved once at startup: from a TOML file when
//! `GEMINI_PROXY_CONFIG` points at one, from built-in defaults otherwise,
//! and validated before the server opens any ports. The resolved value is
//! passed by reference into the server and CLI paths; nothing reads the
//! process environment after startup.
//!
//! # Example
//! ```toml
//! [server]
//! port  = 8080
//! route = "/api/gemini"
//!
//! [backend]
//! base_url    = "https://generativelanguage.googleapis.com"
//! params      = "auto"
//! streaming   = "native"
//! chunk_chars = 128
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::credentials;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Gemini API key, resolved from the environment at startup.
    ///
    /// Never read from (or written to) the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the startup configuration from the process environment.
    ///
    /// See [`Config::from_lookup`] for the variables read; the API key then
    /// comes from [`credentials::resolve`].
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.api_key = credentials::resolve(&credentials::GEMINI_VARS);
        Ok(config)
    }

    /// Resolve the configuration from variables supplied by `lookup`.
    ///
    /// - `GEMINI_PROXY_CONFIG` selects a TOML file; defaults apply when unset.
    /// - `PORT` overrides `server.port`.
    ///
    /// `api_key` is left unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = match lookup("GEMINI_PROXY_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                Self::load(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(port) = lookup("PORT") {
            config.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.route.starts_with('/'),
            "server.route must start with `/`, got `{}`",
            self.server.route
        );
        anyhow::ensure!(
            !self.backend.base_url.trim().is_empty(),
            "backend.base_url must not be empty"
        );
        anyhow::ensure!(self.backend.chunk_chars > 0, "backend.chunk_chars must be at least 1");
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen port (default: 8080). `PORT` in the environment wins.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Path of the single proxy route (default: `/api/gemini`).
    #[serde(default = "defaults::route")]
    pub route: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            route: defaults::route(),
            log_level: None,
            log_json: false,
        }
    }
}

/// Gemini API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL, without the `/v1beta` suffix (added by the client).
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Timeout for buffered generation calls in milliseconds (default: 60 000).
    /// Streaming calls are not subject to it.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Which request parameters the backend is sent.
    #[serde(default)]
    pub params: ParamProfile,

    /// How streamed responses are produced.
    #[serde(default)]
    pub streaming: StreamMode,

    /// Fragment size, in characters, for buffered streaming (default: 128).
    #[serde(default = "defaults::chunk_chars")]
    pub chunk_chars: usize,

    /// Pause between buffered fragments in milliseconds (default: 10).
    #[serde(default = "defaults::chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            timeout_ms: defaults::timeout_ms(),
            params: ParamProfile::default(),
            streaming: StreamMode::default(),
            chunk_chars: defaults::chunk_chars(),
            chunk_delay_ms: defaults::chunk_delay_ms(),
        }
    }
}

/// Parameter set sent with each generation request.
///
/// Different API revisions accept different request shapes. Rather than
/// probing at runtime, the deployment picks one here.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParamProfile {
    /// Try [`Full`](Self::Full); on a parameter-shape rejection retry once
    /// with [`Minimal`](Self::Minimal).
    #[default]
    Auto,
    /// Prompt plus `generationConfig.maxOutputTokens`.
    Full,
    /// Prompt only.
    Minimal,
}

/// Streaming capability variant.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Use `streamGenerateContent`; fall back to buffered slicing if the
    /// stream cannot be opened.
    #[default]
    Native,
    /// Generate in full, then slice the text into fixed-size fragments.
    Buffered,
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Buffered => "buffered",
        })
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn route() -> String { "/api/gemini".into() }
    pub fn base_url() -> String { "https://generativelanguage.googleapis.com".into() }
    pub fn timeout_ms() -> u64 { 60_000 }
    pub fn chunk_chars() -> usize { 128 }
    pub fn chunk_delay_ms() -> u64 { 10 }
}
