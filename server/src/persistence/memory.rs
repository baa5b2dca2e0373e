//! In-memory store and cache backing the test harness.

use anyhow::{anyhow, Result};
use chrono::Utc;
use shared::{Color, EndReason};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{GameStore, PositionCache, UserRecord};

#[derive(Debug, Clone)]
pub struct StoredGame {
    pub white_id: i64,
    pub black_id: Option<i64>,
    pub status: String,
    pub winner_id: Option<i64>,
    pub end_reason: Option<EndReason>,
    pub total_moves: u32,
    pub time_control_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct StoredMove {
    pub game_id: String,
    pub move_number: u32,
    pub san: String,
    pub player_id: i64,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<i64, UserRecord>,
    games: HashMap<String, StoredGame>,
    moves: Vec<StoredMove>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Seeds a user with a given rating, bypassing registration.
    pub fn seed_user(&self, username: &str, password_hash: &str, elo: i32) -> UserRecord {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let user = UserRecord {
            id: inner.next_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            elo,
            games_played: 0,
            games_won: 0,
            created_at: Utc::now(),
            last_login: None,
        };
        inner.users.insert(user.id, user.clone());
        user
    }

    pub fn game(&self, game_id: &str) -> Option<StoredGame> {
        self.inner.lock().unwrap().games.get(game_id).cloned()
    }

    pub fn moves_for(&self, game_id: &str) -> Vec<StoredMove> {
        self.inner
            .lock()
            .unwrap()
            .moves
            .iter()
            .filter(|m| m.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn rating_of(&self, user_id: i64) -> Option<i32> {
        self.inner.lock().unwrap().users.get(&user_id).map(|u| u.elo)
    }
}

#[async_trait::async_trait]
impl GameStore for MemoryStore {
    async fn insert_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.users.values().any(|u| u.username == username) {
                return Err(anyhow!("username taken"));
            }
        }
        Ok(self.seed_user(username, password_hash, 1200))
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        Ok(self.inner.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn touch_last_login(&self, user_id: i64) -> Result<()> {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(&user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert_waiting_game(
        &self,
        game_id: &str,
        creator_id: i64,
        time_control_minutes: u32,
    ) -> Result<()> {
        self.inner.lock().unwrap().games.insert(
            game_id.to_string(),
            StoredGame {
                white_id: creator_id,
                black_id: None,
                status: "waiting".into(),
                winner_id: None,
                end_reason: None,
                total_moves: 0,
                time_control_minutes,
            },
        );
        Ok(())
    }

    async fn promote_to_in_progress(&self, game_id: &str, black_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| anyhow!("no such game"))?;
        game.black_id = Some(black_id);
        game.status = "inprogress".into();
        Ok(())
    }

    async fn delete_waiting(&self, game_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.games.get(game_id).is_some_and(|g| g.status == "waiting") {
            inner.games.remove(game_id);
        }
        Ok(())
    }

    async fn append_move(
        &self,
        game_id: &str,
        move_number: u32,
        san: &str,
        player_id: i64,
    ) -> Result<()> {
        self.inner.lock().unwrap().moves.push(StoredMove {
            game_id: game_id.to_string(),
            move_number,
            san: san.to_string(),
            player_id,
        });
        Ok(())
    }

    async fn finalize_game(
        &self,
        game_id: &str,
        winner_id: Option<i64>,
        reason: EndReason,
        total_moves: u32,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let game = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| anyhow!("no such game"))?;
        game.status = "finished".into();
        game.winner_id = winner_id;
        game.end_reason = Some(reason);
        game.total_moves = total_moves;
        Ok(())
    }

    async fn apply_rating_delta(&self, user_id: i64, delta: i32, won: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no such user"))?;
        user.elo = (user.elo + delta).max(100);
        user.games_played += 1;
        if won {
            user.games_won += 1;
        }
        Ok(())
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.inner.lock().unwrap().users.values().cloned().collect();
        users.sort_by(|a, b| b.elo.cmp(&a.elo).then(b.games_won.cmp(&a.games_won)));
        Ok(users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl PositionCache for MemoryCache {
    async fn put_position(&self, game_id: &str, fen: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(format!("game:{game_id}:fen"), fen.to_string());
        Ok(())
    }

    async fn put_turn(&self, game_id: &str, turn: Color) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(format!("game:{game_id}:turn"), turn.to_string());
        Ok(())
    }

    async fn get_position(&self, game_id: &str) -> Result<Option<String>> {
        Ok(self
            .map
            .lock()
            .unwrap()
            .get(&format!("game:{game_id}:fen"))
            .cloned())
    }
}
