//! The per-game session actor.
//!
//! One task owns the oracle state and the clock for one game; every inbound
//! command, the timer broadcast, and flag-fall are arms of a single select
//! loop, so they can never observe a half-updated game. Parallelism is
//! across sessions, never within one.

use chrono::Utc;
use shared::{ClockInfo, Color, EndReason, MoveInput, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::game_manager::clock::Clock;
use crate::game_manager::oracle::{Position, Terminal};
use crate::game_manager::AppState;

#[derive(Debug)]
pub enum SessionCommand {
    Move { player_id: i64, input: MoveInput },
    Resign { player_id: i64 },
    Chat { player_id: i64, message: String },
    /// Serves both `reconnect_to_game` and `request_game_sync`.
    Sync { player_id: i64 },
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub white_id: i64,
    pub white_name: String,
    pub black_id: i64,
    pub black_name: String,
    pub time_control_minutes: u32,
}

impl SessionInfo {
    pub fn seat_of(&self, player_id: i64) -> Option<Color> {
        if player_id == self.white_id {
            Some(Color::White)
        } else if player_id == self.black_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn id_of(&self, color: Color) -> i64 {
        match color {
            Color::White => self.white_id,
            Color::Black => self.black_id,
        }
    }

    pub fn name_of(&self, color: Color) -> &str {
        match color {
            Color::White => &self.white_name,
            Color::Black => &self.black_name,
        }
    }
}

const MAX_CHAT_LEN: usize = 200;

pub fn spawn(
    state: Arc<AppState>,
    game_id: String,
    info: SessionInfo,
) -> mpsc::UnboundedSender<SessionCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session {
        clock: Clock::new(info.time_control_minutes),
        position: Position::new(),
        started_at: Instant::now(),
        finished: false,
        state,
        game_id,
        info,
        inbox: rx,
    };
    tokio::spawn(session.run());
    tx
}

struct Session {
    state: Arc<AppState>,
    game_id: String,
    info: SessionInfo,
    position: Position,
    clock: Clock,
    started_at: Instant,
    inbox: mpsc::UnboundedReceiver<SessionCommand>,
    finished: bool,
}

impl Session {
    async fn run(mut self) {
        tracing::info!(
            game_id = %self.game_id,
            white = self.info.white_id,
            black = self.info.black_id,
            "session started"
        );
        let mut ticker = tokio::time::interval(self.state.cfg.timer_broadcast_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // the first tick completes immediately

        loop {
            tokio::select! {
                cmd = self.inbox.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                _ = ticker.tick() => self.broadcast_timer(),
                _ = tokio::time::sleep_until(self.clock.flag_deadline()) => {
                    self.flag_fall().await;
                }
            }
            if self.finished {
                break;
            }
        }

        // Commands that were already queued when the game ended still get
        // their failure reply.
        while let Ok(cmd) = self.inbox.try_recv() {
            let player_id = match cmd {
                SessionCommand::Move { player_id, .. }
                | SessionCommand::Resign { player_id }
                | SessionCommand::Chat { player_id, .. }
                | SessionCommand::Sync { player_id } => player_id,
            };
            self.state.send_to_user(
                player_id,
                ServerMessage::Error {
                    message: "Game is not active".into(),
                },
            );
        }
        tracing::debug!(game_id = %self.game_id, "session task ended");
    }

    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Move { player_id, input } => self.apply_move(player_id, &input).await,
            SessionCommand::Resign { player_id } => self.resign(player_id).await,
            SessionCommand::Chat { player_id, message } => self.chat(player_id, message),
            SessionCommand::Sync { player_id } => self.sync(player_id),
        }
    }

    async fn apply_move(&mut self, player_id: i64, input: &MoveInput) {
        let Some(color) = self.info.seat_of(player_id) else {
            self.state.send_to_user(
                player_id,
                ServerMessage::Error {
                    message: "You are not a player in this game".into(),
                },
            );
            return;
        };

        // Turn discipline comes before the oracle ever sees the move.
        if self.position.turn() != color {
            self.state.send_to_user(
                player_id,
                ServerMessage::InvalidMove {
                    reason: "Not your turn".into(),
                },
            );
            return;
        }

        // The mover may have flagged between the deadline and this command.
        if self.clock.remaining(color).is_zero() {
            self.flag_fall().await;
            return;
        }

        let applied = match self.position.apply(input) {
            Ok(applied) => applied,
            Err(_) => {
                self.state.send_to_user(
                    player_id,
                    ServerMessage::InvalidMove {
                        reason: "Invalid move".into(),
                    },
                );
                return;
            }
        };

        self.clock.switch();

        let move_number = self.position.move_count();
        if let Err(e) = self
            .state
            .store
            .append_move(&self.game_id, move_number, &applied.san, player_id)
            .await
        {
            // The session stays authoritative; the record is best effort.
            tracing::warn!(game_id = %self.game_id, move_number, error = %e, "failed to persist move");
        }

        let fen = self.position.fen();
        if let Err(e) = self.state.cache.put_position(&self.game_id, &fen).await {
            tracing::debug!(game_id = %self.game_id, error = %e, "position cache write failed");
        }
        if let Err(e) = self
            .state
            .cache
            .put_turn(&self.game_id, self.position.turn())
            .await
        {
            tracing::debug!(game_id = %self.game_id, error = %e, "turn cache write failed");
        }

        match self.position.terminal() {
            Some(Terminal::Checkmate { winner }) => {
                self.finalize(EndReason::Checkmate, Some(winner), None, None).await
            }
            Some(Terminal::Stalemate) => {
                self.finalize(EndReason::Stalemate, None, None, None).await
            }
            Some(Terminal::Draw(reason)) => self.finalize(reason, None, None, None).await,
            None => self.broadcast_move(color, &applied.san, &applied.from, &applied.to, &fen),
        }
    }

    fn broadcast_move(&self, mover: Color, san: &str, from: &str, to: &str, fen: &str) {
        let snap = self.clock.snapshot();
        let ts = Utc::now().timestamp_millis();
        let turn = self.position.turn();

        for seat in [Color::White, Color::Black] {
            let msg = ServerMessage::MoveMade {
                game_id: self.game_id.clone(),
                san: san.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                fen: fen.to_string(),
                turn,
                player: self.info.name_of(mover).to_string(),
                player_time_remaining: snap.remaining(seat).as_secs_f64(),
                opponent_time_remaining: snap.remaining(seat.opposite()).as_secs_f64(),
                server_timestamp: ts,
                last_opponent_move: (seat != mover).then(|| san.to_string()),
            };
            self.state.send_to_user(self.info.id_of(seat), msg);
        }
    }

    async fn resign(&mut self, player_id: i64) {
        let Some(color) = self.info.seat_of(player_id) else {
            self.state.send_to_user(
                player_id,
                ServerMessage::Error {
                    message: "You are not a player in this game".into(),
                },
            );
            return;
        };
        tracing::info!(game_id = %self.game_id, player_id, "resignation");
        let resigned = self.info.name_of(color).to_string();
        self.finalize(
            EndReason::Resignation,
            Some(color.opposite()),
            Some(resigned),
            None,
        )
        .await;
    }

    async fn flag_fall(&mut self) {
        if self.finished {
            return;
        }
        let loser = self.clock.running();
        tracing::info!(game_id = %self.game_id, side = %loser, "flag fell");
        let timed_out = self.info.name_of(loser).to_string();
        self.finalize(
            EndReason::Timeout,
            Some(loser.opposite()),
            None,
            Some(timed_out),
        )
        .await;
    }

    fn chat(&self, player_id: i64, message: String) {
        let Some(color) = self.info.seat_of(player_id) else {
            self.state.send_to_user(
                player_id,
                ServerMessage::Error {
                    message: "You are not a player in this game".into(),
                },
            );
            return;
        };
        let trimmed: String = message.trim().chars().take(MAX_CHAT_LEN).collect();
        if trimmed.is_empty() {
            return;
        }
        let msg = ServerMessage::Chat {
            game_id: self.game_id.clone(),
            username: self.info.name_of(color).to_string(),
            message: trimmed,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.state.send_to_user(self.info.white_id, msg.clone());
        self.state.send_to_user(self.info.black_id, msg);
    }

    fn sync(&self, player_id: i64) {
        let Some(color) = self.info.seat_of(player_id) else {
            self.state.send_to_user(
                player_id,
                ServerMessage::Error {
                    message: "You are not a player in this game".into(),
                },
            );
            return;
        };
        let msg = ServerMessage::GameStateSync {
            game_id: self.game_id.clone(),
            fen: self.position.fen(),
            turn: self.position.turn(),
            moves: self.position.history().to_vec(),
            is_player_white: color == Color::White,
            timer_data: self.clock_info(),
            game_status: "active".into(),
        };
        self.state.send_to_user(player_id, msg);
    }

    fn clock_info(&self) -> ClockInfo {
        let snap = self.clock.snapshot();
        ClockInfo {
            player1_time: snap.white_remaining.as_secs_f64(),
            player2_time: snap.black_remaining.as_secs_f64(),
            current_player: snap.running,
            server_timestamp: Utc::now().timestamp_millis(),
        }
    }

    fn broadcast_timer(&self) {
        if self.finished {
            return;
        }
        let msg = ServerMessage::TimerUpdate {
            game_id: self.game_id.clone(),
            clock: self.clock_info(),
        };
        self.state.send_to_user(self.info.white_id, msg.clone());
        self.state.send_to_user(self.info.black_id, msg);
    }

    /// Single-shot termination: persists the outcome, applies ratings,
    /// broadcasts `game_over` as the final event, and evicts the session.
    async fn finalize(
        &mut self,
        reason: EndReason,
        winner: Option<Color>,
        resigned_player: Option<String>,
        timed_out_player: Option<String>,
    ) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.clock.stop();

        let total_moves = self.position.move_count();
        let elo_changes: Option<HashMap<String, i32>> = self
            .state
            .finalize_game_record(&self.game_id, &self.info, reason, winner, total_moves)
            .await;

        let winner_name = winner.map(|c| self.info.name_of(c).to_string());
        tracing::info!(
            game_id = %self.game_id,
            reason = %reason,
            winner = winner_name.as_deref().unwrap_or("none"),
            total_moves,
            "game over"
        );

        let msg = ServerMessage::GameOver {
            game_id: self.game_id.clone(),
            result: reason,
            winner: winner_name,
            reason,
            final_fen: self.position.fen(),
            total_moves,
            game_duration: self.started_at.elapsed().as_secs(),
            elo_changes,
            resigned_player,
            timed_out_player,
        };
        self.state.send_to_user(self.info.white_id, msg.clone());
        self.state.send_to_user(self.info.black_id, msg);

        self.state.evict_session(&self.game_id, &self.info);
    }
}
