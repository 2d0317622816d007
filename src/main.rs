use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

mod api;
mod backends;
mod cli;
mod config;
mod credentials;
mod error;
mod payload;
mod smoke;

use config::Config;

const DEFAULT_LOG_FILTER: &str = "gemini_proxy=info,tower_http=warn";

const USAGE: &str = "usage: gemini-proxy [--cli | --healthcheck | --smoke-test [URL]]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let mode = args.next();

    match mode.as_deref() {
        // Docker HEALTHCHECK: hit /healthz and exit without needing curl in the image.
        Some("--healthcheck") => return healthcheck().await,
        Some("--smoke-test") => return smoke_test(args.next()).await,
        Some("--cli") | None => {}
        Some(other) => anyhow::bail!("unknown argument `{other}`\n{USAGE}"),
    }

    // Reconciles the API-key variables before any client is built.
    let config = Config::from_env();

    if mode.as_deref() == Some("--cli") {
        if let Ok(config) = &config {
            init_tracing(&config.server);
        }
        let code = cli::start(config, tokio::io::stdin(), std::io::stdout()).await;
        std::process::exit(code);
    }

    let config = config?;
    init_tracing(&config.server);

    let generator = backends::build(&config).context("building Gemini backend")?;

    if config.api_key.is_none() {
        tracing::warn!("neither GOOGLE_API_KEY nor GEMINI_API_KEY is set; generation requests will fail with 400");
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(
        %addr,
        route = %config.server.route,
        streaming = %config.backend.streaming,
        "gemini-proxy listening"
    );

    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO));

    let state = Arc::new(api::AppState { generator });
    let app = api::router(state, &config.server.route).layer(trace_layer);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Logs go to stderr so `--cli` keeps stdout for its JSON document.
fn init_tracing(server: &config::ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(
                server.log_level.as_deref().unwrap_or(DEFAULT_LOG_FILTER),
            )
        })
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if server.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
async fn healthcheck() -> anyhow::Result<()> {
    let port = Config::from_env().map(|c| c.server.port).unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let ok = reqwest::get(&url)
        .await
        .map(|resp| resp.status().is_success())
        .unwrap_or(false);

    std::process::exit(if ok { 0 } else { 1 });
}

/// Post the sample payload to a running proxy and pretty-print its reply.
async fn smoke_test(url: Option<String>) -> anyhow::Result<()> {
    let url = smoke::target(url);
    println!("Posting to: {url}");

    match smoke::run(&url).await {
        Ok(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Request failed: {e:#}");
            std::process::exit(1);
        }
    }
}
