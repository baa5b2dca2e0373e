//! Persistence gateway: a durable relational store for users, games and
//! move records, plus an ephemeral best-effort cache for the latest
//! position of each active game.
//!
//! The in-memory session is always the authority during play; nothing in
//! here is consulted for move validation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{Color, EndReason};
use std::sync::Arc;

pub mod postgres;
pub mod redis_cache;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub elo: i32,
    pub games_played: i32,
    pub games_won: i32,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Durable store operations. Writes for a single game are serialized by the
/// owning session actor; writes across games may interleave freely.
#[async_trait::async_trait]
pub trait GameStore: Send + Sync {
    async fn insert_user(&self, username: &str, password_hash: &str) -> Result<UserRecord>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>>;

    async fn touch_last_login(&self, user_id: i64) -> Result<()>;

    async fn insert_waiting_game(
        &self,
        game_id: &str,
        creator_id: i64,
        time_control_minutes: u32,
    ) -> Result<()>;

    /// Sets the black player and flips status to `inprogress`.
    async fn promote_to_in_progress(&self, game_id: &str, black_id: i64) -> Result<()>;

    async fn delete_waiting(&self, game_id: &str) -> Result<()>;

    async fn append_move(
        &self,
        game_id: &str,
        move_number: u32,
        san: &str,
        player_id: i64,
    ) -> Result<()>;

    async fn finalize_game(
        &self,
        game_id: &str,
        winner_id: Option<i64>,
        reason: EndReason,
        total_moves: u32,
    ) -> Result<()>;

    /// Atomic `elo = max(100, elo + delta); games_played += 1;
    /// games_won += won`. The floor lives here, not in the calculator.
    async fn apply_rating_delta(&self, user_id: i64, delta: i32, won: bool) -> Result<()>;

    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>>;
}

/// Ephemeral position cache. Loss-tolerant by contract: callers log failures
/// and carry on, and every reader handles absence.
#[async_trait::async_trait]
pub trait PositionCache: Send + Sync {
    async fn put_position(&self, game_id: &str, fen: &str) -> Result<()>;

    async fn put_turn(&self, game_id: &str, turn: Color) -> Result<()>;

    async fn get_position(&self, game_id: &str) -> Result<Option<String>>;
}

pub type GameStorePtr = Arc<dyn GameStore>;
pub type PositionCachePtr = Arc<dyn PositionCache>;
