//! market-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config, boots
//! the engine, wires middleware, and starts the HTTP server. Route handlers
//! live in `routes.rs`; shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use market_config::MarketConfig;
use market_daemon::{routes, state::AppState};
use market_engine::Engine;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience: load `.env.local` if present. Silent if missing —
    // production injects environment variables directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = MarketConfig::from_env().context("load configuration")?;
    let bind_addr = config.bind_addr;

    let engine = Engine::bootstrap(&config).await.context("bootstrap engine")?;
    engine.start().await;
    info!("engine started: tick_interval={:?} news_interval={:?}", config.tick_interval, config.news_interval);

    let shared = Arc::new(AppState::new(engine.clone()));

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(permissive_cors());

    info!("market-daemon listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await.context("bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    engine.stop().await;
    info!("market-daemon shut down complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// Public surface, relied on by external trading UIs from arbitrary
/// origins; unlike an operator console there is no fixed set of localhost
/// ports to allow-list.
fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install ctrl-c handler");
        return;
    }
    warn!("shutdown signal received, draining connections");
}
