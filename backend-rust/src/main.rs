mod bus;
mod config;
mod db;
mod error;
mod handlers;
mod loader;
mod replay;
mod rules;
mod track;

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use bus::EventBus;
use config::Config;
use db::Database;
use handlers::AppState;
use replay::ReplayManager;

// ─── Cooldown janitor ─────────────────────────────────────────────────────────

/// Hourly reap of cooldown rows that have fallen a day behind the newest one.
async fn cooldown_cleanup(db: Database) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        match db.cleanup_cooldowns().await {
            Ok(0) => {}
            Ok(reaped) => info!(reaped, "cooldown rows cleaned up"),
            Err(e) => warn!(error = %e, "cooldown cleanup failed"),
        }
    }
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seawatch_backend=info".into()),
        )
        .init();

    // Invalid configuration refuses to start
    let config = Config::from_env()?;
    config.validate()?;
    info!(
        "🌊 Seawatch backend v{} starting — store: {}",
        env!("CARGO_PKG_VERSION"),
        config.database_url
    );

    let db = Database::connect(&config.database_url).await?;
    let bus = EventBus::new();
    let manager = ReplayManager::new(Arc::new(config.clone()), db.clone(), bus.clone());

    tokio::spawn(cooldown_cleanup(db.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(AppState { manager, db, bus }).layer(cors);

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
