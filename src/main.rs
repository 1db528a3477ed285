//! RiskCast backend server.
//!
//! Bootstraps configuration, storage, the service registry, and the HTTP
//! surface, then serves until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use riskcast_backend::alerts::AlertDispatcher;
use riskcast_backend::api::build_router;
use riskcast_backend::auth::AuthState;
use riskcast_backend::config::Config;
use riskcast_backend::db::Database;
use riskcast_backend::middleware::{RateLimitConfig, RateLimitLayer};
use riskcast_backend::registry::Services;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "riskcast", about = "RiskCast risk-decision backend")]
struct Args {
    /// Listen port (overrides PORT from the environment).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path (overrides DATABASE_PATH).
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,riskcast_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }
    let config = Arc::new(config);

    let db = Database::open(&config.database_path)?;
    let alerts = AlertDispatcher::start(config.alert_queue_depth);
    let services = Services::init(Arc::clone(&config), db, Some(alerts))?;

    let auth = AuthState::new(&config, services.audit.clone());
    let limiter = RateLimitLayer::new(RateLimitConfig::from_config(&config));

    // Periodic cleanup of stale rate-limit windows.
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let router = build_router(services, auth, limiter);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "riskcast backend listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
