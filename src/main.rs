mod chain;
mod config;
mod db;
mod entities;
mod error;
mod identity;
mod invites;
mod mailer;
mod models;
mod routes;
mod state;
mod token;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let port = config.port;

    let db = db::connect(&config.database_url).await?;
    let state = AppState::new(db, &config);

    // Periodic cleanup of in-memory maps and stale verifications
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                state.cleanup_memory();
                match routes::email::cleanup_expired(&state.db).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "expired email verifications removed"),
                    Err(e) => tracing::warn!(error = %e, "email verification cleanup failed"),
                }
            }
        });
    }

    let app = routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Piggy ID Server v{:<19}║", env!("CARGO_PKG_VERSION"));
    println!("  ╠══════════════════════════════════════════════╣");
    println!("  ║  Running on: http://localhost:{:<14}║", port);
    println!("  ╚══════════════════════════════════════════════╝");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
