//! Observability endpoints. Thin reads over `AppState` and the store; the
//! game core never depends on anything here.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::game_manager::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct HealthQuery {
    mode: Option<String>,
}

/// Light check by default; `?mode=full` also exercises the cache.
pub async fn health(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HealthQuery>,
) -> (StatusCode, Json<HealthResponse>) {
    if params.mode.as_deref() == Some("full") {
        if state.cache.get_position("healthcheck").await.is_err() {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse { status: "error" }),
            );
        }
    }
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Serialize)]
pub struct InfoResponse {
    name: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    active_games: usize,
    connections: usize,
}

pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "chess-server",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_games: state.games.len(),
        connections: state.connections.len(),
    })
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    id: i64,
    username: String,
    elo: i32,
    games_played: i32,
    games_won: i32,
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, StatusCode> {
    let limit = page.limit.unwrap_or(10).clamp(1, 100);
    let offset = page.offset.unwrap_or(0).max(0);
    let users = state
        .store
        .leaderboard(limit, offset)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "leaderboard query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| LeaderboardEntry {
                id: u.id,
                username: u.username,
                elo: u.elo,
                games_played: u.games_played,
                games_won: u.games_won,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    id: i64,
    username: String,
    elo: i32,
    games_played: i32,
    games_won: i32,
    win_rate: f64,
    created_at: chrono::DateTime<chrono::Utc>,
    last_login: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserStats>, StatusCode> {
    let user = state
        .store
        .find_user_by_id(id)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "user stats query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let win_rate = if user.games_played > 0 {
        f64::from(user.games_won) / f64::from(user.games_played)
    } else {
        0.0
    };
    Ok(Json(UserStats {
        id: user.id,
        username: user.username,
        elo: user.elo,
        games_played: user.games_played,
        games_won: user.games_won,
        win_rate,
        created_at: user.created_at,
        last_login: user.last_login,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGameSummary {
    game_id: String,
    white: String,
    black: String,
    time_control_minutes: u32,
}

pub async fn active_games(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveGameSummary>> {
    Json(
        state
            .games
            .iter()
            .map(|entry| ActiveGameSummary {
                game_id: entry.key().clone(),
                white: entry.value().info.white_name.clone(),
                black: entry.value().info.black_name.clone(),
                time_control_minutes: entry.value().info.time_control_minutes,
            })
            .collect(),
    )
}
