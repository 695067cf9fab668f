//! Entrypoint: CLI parsing, config/tracing bootstrap, and axum router assembly.

mod client;
mod config;
mod dispatcher;
mod error;
mod models;
mod proxy;
mod router;
mod stream;
mod transform;

use anyhow::{Context, Result};
use axum::{routing::get, routing::post, Extension, Router};
use clap::Parser;
use client::UpstreamClient;
use config::Config;
use daemonize::Daemonize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Local protocol-translation proxy: Anthropic Messages API in front, OpenAI
/// Chat Completions or Responses API upstream.
#[derive(Parser, Debug)]
#[command(name = "messages-bridge", version, about)]
struct Cli {
    /// Listen port (overrides PORT / the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Upstream OpenAI-compatible base URL (overrides UPSTREAM_BASE_URL).
    #[arg(long)]
    upstream: Option<String>,

    /// Path to a `.env`-style config file to load before falling back to the
    /// standard cascade (cwd, `~/.messages-bridge.env`, `/etc/messages-bridge/.env`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run as a background daemon instead of attached to the current terminal.
    #[arg(long)]
    daemon: bool,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("messages_bridge={default_level},tower_http=info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env_with_path(cli.config.clone()).context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(upstream) = cli.upstream.clone() {
        config = config.with_upstream_base_url(upstream)?;
    }

    if cli.daemon {
        Daemonize::new()
            .pid_file("/tmp/messages-bridge.pid")
            .working_directory(".")
            .start()
            .context("failed to daemonize")?;
    }

    init_tracing(config.debug);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let listen_addr = config.listen_addr();
    let config = Arc::new(config);

    let http_client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let upstream = UpstreamClient::new(http_client);

    tracing::info!(
        upstream_base_url = %config.upstream_base_url,
        listen = %listen_addr,
        "starting messages-bridge"
    );

    let app = Router::new()
        .route("/health", get(proxy::health_handler))
        .route("/v1/messages", post(proxy::messages_handler))
        .fallback(proxy::not_found_handler)
        .layer(Extension(config))
        .layer(Extension(upstream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
