use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use tictactoe_rooms::config::ServerConfig;
use tictactoe_rooms::http::{router, AppState};
use tictactoe_rooms::{MatchCoordinator, MemoryStore, SqliteStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tictactoe_rooms=debug,tower_http=info")),
        )
        .init();

    let config = ServerConfig::parse();
    let coordinator = match &config.database {
        Some(path) => {
            let store = SqliteStore::open(path).with_context(|| format!("opening database {}", path))?;
            tracing::info!(database = %path, "using SQLite store");
            MatchCoordinator::new(Arc::new(store))
        }
        None => {
            tracing::info!("no database configured, rooms live in memory");
            MatchCoordinator::new(Arc::new(MemoryStore::new()))
        }
    };

    let purger = coordinator.clone();
    let retention = config.retention();
    let mut ticker = tokio::time::interval(config.purge_interval());
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let coordinator = purger.clone();
            match tokio::task::spawn_blocking(move || coordinator.purge_expired(retention)).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "purge failed"),
                Err(err) => tracing::warn!(error = %err, "purge task panicked"),
            }
        }
    });

    let app = router(AppState { coordinator }, &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %config.bind, "tic-tac-toe server listening");
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
