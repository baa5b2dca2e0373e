//! Finalization bookkeeping: durable outcome, rating application, and
//! eviction of the session from the active-games index.

use anyhow::Result;
use shared::{Color, EndReason};
use std::collections::HashMap;

use crate::game_manager::rating::{elo_deltas, MatchResult};
use crate::game_manager::{AppState, SessionInfo};

/// One user-row update queued for a finalization.
struct RatingApplication {
    user_id: i64,
    delta: i32,
    won: bool,
}

impl AppState {
    /// Persists a finished game and its rating consequences, retrying the
    /// batch once. Returns the per-username Elo changes for decisive
    /// outcomes; `None` when the result was a draw or the ratings could not
    /// be computed.
    pub async fn finalize_game_record(
        &self,
        game_id: &str,
        info: &SessionInfo,
        reason: EndReason,
        winner: Option<Color>,
        total_moves: u32,
    ) -> Option<HashMap<String, i32>> {
        let (applications, changes) = self.rating_applications(info, winner).await;
        let winner_id = winner.map(|c| info.id_of(c));

        for attempt in 0..2u32 {
            match self
                .persist_finalize(game_id, winner_id, reason, total_moves, &applications)
                .await
            {
                Ok(()) => return changes,
                Err(e) if attempt == 0 => {
                    tracing::warn!(game_id = %game_id, error = %e, "finalize write failed, retrying");
                }
                Err(e) => {
                    // The session is evicted regardless; players still get
                    // their game_over.
                    tracing::error!(game_id = %game_id, error = %e, "finalize write failed, giving up");
                }
            }
        }
        changes
    }

    async fn persist_finalize(
        &self,
        game_id: &str,
        winner_id: Option<i64>,
        reason: EndReason,
        total_moves: u32,
        applications: &[RatingApplication],
    ) -> Result<()> {
        self.store
            .finalize_game(game_id, winner_id, reason, total_moves)
            .await?;
        for app in applications {
            self.store
                .apply_rating_delta(app.user_id, app.delta, app.won)
                .await?;
        }
        Ok(())
    }

    /// Decisive games move ratings both ways; draws count the game for both
    /// players without moving ratings.
    async fn rating_applications(
        &self,
        info: &SessionInfo,
        winner: Option<Color>,
    ) -> (Vec<RatingApplication>, Option<HashMap<String, i32>>) {
        let Some(winner_color) = winner else {
            let draw = vec![
                RatingApplication {
                    user_id: info.white_id,
                    delta: 0,
                    won: false,
                },
                RatingApplication {
                    user_id: info.black_id,
                    delta: 0,
                    won: false,
                },
            ];
            return (draw, None);
        };

        let winner_id = info.id_of(winner_color);
        let loser_id = info.id_of(winner_color.opposite());

        let (winner_row, loser_row) = match (
            self.store.find_user_by_id(winner_id).await,
            self.store.find_user_by_id(loser_id).await,
        ) {
            (Ok(Some(w)), Ok(Some(l))) => (w, l),
            (w, l) => {
                tracing::warn!(
                    winner = winner_id,
                    loser = loser_id,
                    winner_found = matches!(w, Ok(Some(_))),
                    loser_found = matches!(l, Ok(Some(_))),
                    "could not load users for rating update"
                );
                // Still count the game; ratings stay put.
                let fallback = vec![
                    RatingApplication {
                        user_id: winner_id,
                        delta: 0,
                        won: true,
                    },
                    RatingApplication {
                        user_id: loser_id,
                        delta: 0,
                        won: false,
                    },
                ];
                return (fallback, None);
            }
        };

        let (winner_delta, loser_delta) = elo_deltas(
            winner_row.elo,
            winner_row.games_played,
            loser_row.elo,
            loser_row.games_played,
            MatchResult::AWins,
        );

        let mut changes = HashMap::new();
        changes.insert(winner_row.username.clone(), winner_delta);
        changes.insert(loser_row.username.clone(), loser_delta);

        let applications = vec![
            RatingApplication {
                user_id: winner_id,
                delta: winner_delta,
                won: true,
            },
            RatingApplication {
                user_id: loser_id,
                delta: loser_delta,
                won: false,
            },
        ];
        (applications, Some(changes))
    }

    /// Removes a finished game from the active indexes. Safe to call once
    /// per game; later routing attempts see "not active".
    pub fn evict_session(&self, game_id: &str, info: &SessionInfo) {
        self.games.remove(game_id);
        // Only clear index entries that still point at this game; a player
        // may already be in a newer one.
        for player in [info.white_id, info.black_id] {
            if self
                .player_to_game
                .get(&player)
                .is_some_and(|g| g.value() == game_id)
            {
                self.player_to_game.remove(&player);
            }
        }
        tracing::debug!(game_id = %game_id, "session evicted");
    }
}
