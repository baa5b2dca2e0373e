//! Waiting games and the rating-band search.
//!
//! The creator of a waiting game always takes white; the searcher who joins
//! takes black. Bands widen ±100 → ±200 → ±400 → unbounded, and within the
//! first non-empty band the closest rating wins, oldest game breaking ties.

use shared::{Color, OpponentSummary, ServerMessage};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::game_manager::{session, AppState, SessionInfo, WaitingGame};
use crate::persistence::UserRecord;

const RATING_BANDS: [Option<i32>; 4] = [Some(100), Some(200), Some(400), None];

impl AppState {
    pub async fn handle_create_game(&self, conn_id: &str, time_control: Option<u32>) {
        let Some(user) = self.authed(conn_id) else {
            self.error_to(conn_id, "Not authenticated");
            return;
        };
        if self.player_to_game.contains_key(&user.id) {
            tracing::warn!(player_id = user.id, "create_game while already in a game");
            self.error_to(conn_id, "Already in a game");
            return;
        }

        let Some(record) = self.fetch_user(conn_id, user.id).await else {
            return;
        };

        let mut waiting = self.waiting.lock().await;
        if waiting.values().any(|w| w.creator_id == user.id) {
            self.error_to(conn_id, "Already waiting for an opponent");
            return;
        }

        let time_control = time_control.unwrap_or(self.cfg.default_time_control_minutes);
        let game_id = Uuid::new_v4().to_string();

        if let Err(e) = self
            .store
            .insert_waiting_game(&game_id, user.id, time_control)
            .await
        {
            tracing::warn!(game_id = %game_id, error = %e, "failed to insert waiting game");
            self.error_to(conn_id, "Could not create game");
            return;
        }

        waiting.insert(
            game_id.clone(),
            WaitingGame {
                game_id: game_id.clone(),
                creator_id: user.id,
                creator_name: user.username.clone(),
                creator_rating: record.elo,
                time_control_minutes: time_control,
                created_at: Instant::now(),
            },
        );
        drop(waiting);

        tracing::info!(game_id = %game_id, creator = user.id, time_control, "waiting game created");
        self.send_to_conn(
            conn_id,
            ServerMessage::WaitingForOpponent {
                game_id,
                time_control,
                position: Color::White,
            },
        );
    }

    pub async fn handle_search(self: &Arc<Self>, conn_id: &str) {
        let Some(user) = self.authed(conn_id) else {
            self.error_to(conn_id, "Not authenticated");
            return;
        };
        if self.player_to_game.contains_key(&user.id) {
            self.error_to(conn_id, "Already in a game");
            return;
        }
        let Some(searcher) = self.fetch_user(conn_id, user.id).await else {
            return;
        };

        let candidate = {
            let mut waiting = self.waiting.lock().await;
            let game_id = RATING_BANDS.iter().find_map(|band| {
                waiting
                    .values()
                    .filter(|w| w.creator_id != searcher.id)
                    .filter(|w| self.user_online(w.creator_id))
                    .filter(|w| {
                        band.map_or(true, |b| (w.creator_rating - searcher.elo).abs() <= b)
                    })
                    .min_by_key(|w| ((w.creator_rating - searcher.elo).abs(), w.created_at))
                    .map(|w| w.game_id.clone())
            });
            game_id.and_then(|id| waiting.remove(&id))
        };

        match candidate {
            Some(game) => {
                tracing::info!(
                    game_id = %game.game_id,
                    searcher = searcher.id,
                    creator = game.creator_id,
                    creator_rating = game.creator_rating,
                    searcher_rating = searcher.elo,
                    "match found"
                );
                self.start_session(game, &searcher).await;
            }
            None => {
                tracing::debug!(searcher = searcher.id, "no waiting games in any band");
                self.send_to_conn(conn_id, ServerMessage::NoGamesFound);
            }
        }
    }

    async fn start_session(self: &Arc<Self>, game: WaitingGame, joiner: &UserRecord) {
        if let Err(e) = self
            .store
            .promote_to_in_progress(&game.game_id, joiner.id)
            .await
        {
            tracing::warn!(game_id = %game.game_id, error = %e, "failed to promote game row");
        }

        let info = SessionInfo {
            white_id: game.creator_id,
            white_name: game.creator_name.clone(),
            black_id: joiner.id,
            black_name: joiner.username.clone(),
            time_control_minutes: game.time_control_minutes,
        };
        let game_id = game.game_id.clone();

        let inbox = session::spawn(self.clone(), game_id.clone(), info.clone());
        self.games.insert(
            game_id.clone(),
            crate::game_manager::ActiveGame {
                inbox,
                info: info.clone(),
            },
        );
        self.player_to_game.insert(game.creator_id, game_id.clone());
        self.player_to_game.insert(joiner.id, game_id.clone());

        self.send_to_user(
            game.creator_id,
            ServerMessage::MatchFound {
                game_id: game_id.clone(),
                your_color: Color::White,
                opponent: OpponentSummary {
                    username: joiner.username.clone(),
                    elo: joiner.elo,
                },
                time_control: game.time_control_minutes,
            },
        );
        self.send_to_user(
            joiner.id,
            ServerMessage::MatchFound {
                game_id,
                your_color: Color::Black,
                opponent: OpponentSummary {
                    username: game.creator_name,
                    elo: game.creator_rating,
                },
                time_control: game.time_control_minutes,
            },
        );
    }

    pub async fn handle_cancel(&self, conn_id: &str) {
        let Some(user) = self.authed(conn_id) else {
            self.error_to(conn_id, "Not authenticated");
            return;
        };

        let removed = {
            let mut waiting = self.waiting.lock().await;
            let game_id = waiting
                .values()
                .find(|w| w.creator_id == user.id)
                .map(|w| w.game_id.clone());
            game_id.and_then(|id| waiting.remove(&id))
        };

        match removed {
            Some(game) => {
                tracing::info!(game_id = %game.game_id, creator = user.id, "matchmaking cancelled");
                if let Err(e) = self.store.delete_waiting(&game.game_id).await {
                    tracing::warn!(game_id = %game.game_id, error = %e, "failed to delete waiting row");
                }
                self.send_to_conn(conn_id, ServerMessage::MatchmakingCancelled);
            }
            None => self.error_to(conn_id, "No waiting game to cancel"),
        }
    }

    fn error_to(&self, conn_id: &str, message: &str) {
        self.send_to_conn(
            conn_id,
            ServerMessage::Error {
                message: message.into(),
            },
        );
    }

    /// Fresh user row; rating-sensitive paths never trust cached values.
    async fn fetch_user(&self, conn_id: &str, user_id: i64) -> Option<UserRecord> {
        match self.store.find_user_by_id(user_id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                self.error_to(conn_id, "Unknown user");
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "user lookup failed");
                self.error_to(conn_id, "Service unavailable, try again");
                None
            }
        }
    }
}
