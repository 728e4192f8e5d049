//! Bus Tracker - Bus tracking API server
//!
//! Serves the bus tracking REST API with a fail-open cache facade and tiered
//! rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bus_tracker::store::MemoryDocumentStore;
use bus_tracker::{create_router, AppState, CacheFacade, Config, RateLimiter};

/// Main entry point for the bus tracking server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache facade (never blocks startup on the cache)
/// 4. Select the rate limiter counter store
/// 5. Create the document store, authorizer and router
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bus_tracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Bus Tracker API");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, cache={}, cache_timeout={}ms, record_ttl={}s, location_ttl={}s",
        config.server_port,
        config
            .cache_target
            .as_ref()
            .map(|t| t.redacted())
            .unwrap_or_else(|| "none".to_string()),
        config.cache_timeout_ms,
        config.record_ttl,
        config.location_ttl
    );

    let cache = Arc::new(CacheFacade::from_config(&config));
    let limiter = Arc::new(RateLimiter::connect(&config, cache.clone()).await);
    info!(store = limiter.store_kind(), "Rate limiter ready");

    let state = AppState::from_config(
        &config,
        Arc::new(MemoryDocumentStore::new()),
        cache,
        limiter,
    );
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    // Peer addresses feed the rate limiter identity
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // Dropping the router state stops the background sweepers
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
