use anyhow::Result;
use axum::{routing::get, Router};
use std::{net::SocketAddr, sync::Arc};

use game_manager::AppState;
use persistence::{postgres::PostgresStore, redis_cache::RedisCache};
use ws::ws_handler;

mod config;
mod game_manager;
mod http;
mod persistence;
mod ws;

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let cfg = config::ServerConfig::from_env()?;

    // An unreachable durable store is fatal; the cache is best-effort and
    // connects lazily.
    let store = PostgresStore::connect(&cfg.database).await?;
    let cache = RedisCache::open(&cfg.redis_url)?;

    let port = cfg.port;
    let state = Arc::new(AppState::new(cfg, Arc::new(store), Arc::new(cache)));
    state.clone().spawn_sweeper();

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(http::health))
        .route("/info", get(http::info))
        .route("/leaderboard", get(http::leaderboard))
        .route("/users/{id}/stats", get(http::user_stats))
        .route("/games", get(http::active_games))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
