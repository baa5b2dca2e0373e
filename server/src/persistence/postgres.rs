//! Postgres-backed durable store.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use shared::EndReason;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use super::{GameStore, UserRecord};
use crate::config::DatabaseConfig;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    elo: i32,
    games_played: i32,
    games_won: i32,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl From<UserRow> for UserRecord {
    fn from(r: UserRow) -> Self {
        UserRecord {
            id: r.id,
            username: r.username,
            password_hash: r.password_hash,
            elo: r.elo,
            games_played: r.games_played,
            games_won: r.games_won,
            created_at: r.created_at,
            last_login: r.last_login,
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    elo INTEGER NOT NULL DEFAULT 1200,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_login TIMESTAMPTZ,
    games_played INTEGER NOT NULL DEFAULT 0,
    games_won INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    player_white_id BIGINT NOT NULL REFERENCES users(id),
    player_black_id BIGINT REFERENCES users(id),
    status TEXT NOT NULL DEFAULT 'waiting',
    winner_id BIGINT,
    end_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    finished_at TIMESTAMPTZ,
    total_moves INTEGER NOT NULL DEFAULT 0,
    time_control_minutes INTEGER NOT NULL DEFAULT 30
);

CREATE TABLE IF NOT EXISTS game_moves (
    id BIGSERIAL PRIMARY KEY,
    game_id TEXT NOT NULL REFERENCES games(id),
    move_number INTEGER NOT NULL,
    move_notation TEXT NOT NULL,
    player_id BIGINT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_game_moves_game ON game_moves (game_id, move_number);
"#;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects with retry and ensures the schema exists. An unreachable
    /// store here is a deployment error, so the caller aborts on `Err`.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = connect_with_retry(cfg).await?;

        for stmt in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(stmt).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

async fn connect_with_retry(cfg: &DatabaseConfig) -> Result<PgPool> {
    for attempt in 1..=cfg.retry_count {
        match PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .connect(&cfg.url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt == cfg.retry_count => {
                return Err(anyhow!(
                    "failed to connect to database after {} attempts: {e}",
                    cfg.retry_count
                ));
            }
            Err(_) => {
                let backoff = Duration::from_secs(std::cmp::min(2u64.pow(attempt - 1), 8));
                tracing::warn!(
                    attempt,
                    max = cfg.retry_count,
                    "database not ready, retrying in {}s",
                    backoff.as_secs()
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
    unreachable!("exhausted retries should have returned above")
}

#[async_trait::async_trait]
impl GameStore for PostgresStore {
    async fn insert_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2)
             RETURNING id, username, password_hash, elo, games_played, games_won,
                       created_at, last_login",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, elo, games_played, games_won,
                    created_at, last_login
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, elo, games_played, games_won,
                    created_at, last_login
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn touch_last_login(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_waiting_game(
        &self,
        game_id: &str,
        creator_id: i64,
        time_control_minutes: u32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO games (id, player_white_id, status, time_control_minutes)
             VALUES ($1, $2, 'waiting', $3)",
        )
        .bind(game_id)
        .bind(creator_id)
        .bind(time_control_minutes as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn promote_to_in_progress(&self, game_id: &str, black_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE games SET player_black_id = $1, status = 'inprogress' WHERE id = $2",
        )
        .bind(black_id)
        .bind(game_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_waiting(&self, game_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM games WHERE id = $1 AND status = 'waiting'")
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_move(
        &self,
        game_id: &str,
        move_number: u32,
        san: &str,
        player_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO game_moves (game_id, move_number, move_notation, player_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(game_id)
        .bind(move_number as i32)
        .bind(san)
        .bind(player_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_game(
        &self,
        game_id: &str,
        winner_id: Option<i64>,
        reason: EndReason,
        total_moves: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE games
             SET status = 'finished', winner_id = $1, end_reason = $2,
                 finished_at = now(), total_moves = $3
             WHERE id = $4",
        )
        .bind(winner_id)
        .bind(reason.as_str())
        .bind(total_moves as i32)
        .bind(game_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_rating_delta(&self, user_id: i64, delta: i32, won: bool) -> Result<()> {
        // GREATEST re-reads the current rating inside the write, so two
        // finalizations touching the same user cannot lose an update.
        sqlx::query(
            "UPDATE users
             SET elo = GREATEST(100, elo + $1),
                 games_played = games_played + 1,
                 games_won = games_won + $2
             WHERE id = $3",
        )
        .bind(delta)
        .bind(if won { 1 } else { 0 })
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, elo, games_played, games_won,
                    created_at, last_login
             FROM users ORDER BY elo DESC, games_won DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
