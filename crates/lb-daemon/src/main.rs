//! lb-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads configuration,
//! builds the shared state, wires middleware, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state types live in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use lb_daemon::{routes, state};
use lb_gatekeeper::MemoryProfiles;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = lb_config::load_from_env().context("config load failed")?;
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let profiles = match &loaded.config.profiles_path {
        Some(path) => {
            let dir = state::load_profiles(path)?;
            info!(count = dir.len(), "profile directory seeded from {path}");
            dir
        }
        None => {
            warn!("no profiles_path configured; every mutation will fail authentication");
            MemoryProfiles::new()
        }
    };

    // Postgres is optional for the daemon; the CLI owns migrations.
    let pool = match std::env::var(lb_db::ENV_DB_URL) {
        Ok(_) => match lb_db::connect_from_env().await {
            Ok(pool) => {
                info!("postgres pool connected");
                Some(pool)
            }
            Err(e) => {
                warn!("postgres unavailable, continuing without it: {e:#}");
                None
            }
        },
        Err(_) => None,
    };

    let shared = Arc::new(state::AppState::new(
        &loaded.config,
        loaded.config_hash.clone(),
        profiles,
        pool,
    )?);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    if loaded.config.sweep.enabled {
        state::spawn_sweep_tick(
            Arc::clone(&shared),
            Duration::from_secs(loaded.config.sweep.interval_secs.max(1)),
        );
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8890)));
    info!("lb-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("LB_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS for local tooling only; the daemon is not an internet-facing surface.
fn cors_localhost_only() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
