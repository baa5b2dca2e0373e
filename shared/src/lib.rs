//! Wire protocol shared between the chess server and its clients.
//!
//! Events are JSON objects tagged by a `type` field with snake_case event
//! names and camelCase payload fields. Clock values travel as seconds (f64),
//! timestamps as epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// How a game ended. Doubles as the `result` and `reason` fields of
/// `game_over` and as the persisted `end_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    Threefold,
    FiftyMove,
    Resignation,
    Timeout,
    AgreedDraw,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Checkmate => "checkmate",
            EndReason::Stalemate => "stalemate",
            EndReason::InsufficientMaterial => "insufficient_material",
            EndReason::Threefold => "threefold",
            EndReason::FiftyMove => "fifty_move",
            EndReason::Resignation => "resignation",
            EndReason::Timeout => "timeout",
            EndReason::AgreedDraw => "agreed_draw",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A move as submitted by a client: either SAN (`"Nf3"`) or an explicit
/// from/to pair with optional promotion piece letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveInput {
    San(String),
    Coords {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentSummary {
    pub username: String,
    pub elo: i32,
}

/// Synchronized clock snapshot. `player1_time` is white's remaining time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInfo {
    pub player1_time: f64,
    pub player2_time: f64,
    pub current_player: Color,
    pub server_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Heartbeat,
    #[serde(rename_all = "camelCase")]
    CreateGame {
        #[serde(default)]
        time_control: Option<u32>,
    },
    SearchForGame,
    CancelMatchmaking,
    #[serde(rename_all = "camelCase")]
    Move {
        game_id: String,
        #[serde(rename = "move")]
        mv: MoveInput,
    },
    #[serde(rename_all = "camelCase")]
    Resign {
        game_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        game_id: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ReconnectToGame {
        game_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestGameSync {
        game_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ConnectionConfirmed {
        socket_id: String,
        server: String,
        timestamp: i64,
    },
    RegistrationSuccess {
        username: String,
    },
    RegistrationFailure {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    LoginSuccess {
        user_id: i64,
        username: String,
        elo: i32,
        games_played: i32,
        games_won: i32,
    },
    LoginFailure {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    WaitingForOpponent {
        game_id: String,
        time_control: u32,
        position: Color,
    },
    NoGamesFound,
    #[serde(rename_all = "camelCase")]
    MatchFound {
        game_id: String,
        your_color: Color,
        opponent: OpponentSummary,
        time_control: u32,
    },
    #[serde(rename_all = "camelCase")]
    MoveMade {
        game_id: String,
        san: String,
        from: String,
        to: String,
        fen: String,
        turn: Color,
        player: String,
        player_time_remaining: f64,
        opponent_time_remaining: f64,
        server_timestamp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_opponent_move: Option<String>,
    },
    InvalidMove {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    TimerUpdate {
        game_id: String,
        #[serde(flatten)]
        clock: ClockInfo,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        game_id: String,
        username: String,
        message: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    GameOver {
        game_id: String,
        result: EndReason,
        winner: Option<String>,
        reason: EndReason,
        final_fen: String,
        total_moves: u32,
        game_duration: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        elo_changes: Option<HashMap<String, i32>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        resigned_player: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timed_out_player: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GameStateSync {
        game_id: String,
        fen: String,
        turn: Color,
        moves: Vec<String>,
        is_player_white: bool,
        timer_data: ClockInfo,
        game_status: String,
    },
    MatchmakingCancelled,
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_move_accepts_san_and_coords() {
        let san: ClientMessage =
            serde_json::from_str(r#"{"type":"move","gameId":"g1","move":"Nf3"}"#).unwrap();
        match san {
            ClientMessage::Move {
                mv: MoveInput::San(s),
                ..
            } => assert_eq!(s, "Nf3"),
            other => panic!("expected SAN move, got {other:?}"),
        }

        let coords: ClientMessage = serde_json::from_str(
            r#"{"type":"move","gameId":"g1","move":{"from":"e7","to":"e8","promotion":"q"}}"#,
        )
        .unwrap();
        match coords {
            ClientMessage::Move {
                mv: MoveInput::Coords { from, to, promotion },
                ..
            } => {
                assert_eq!(from, "e7");
                assert_eq!(to, "e8");
                assert_eq!(promotion.as_deref(), Some("q"));
            }
            other => panic!("expected coords move, got {other:?}"),
        }
    }

    #[test]
    fn server_events_are_snake_case_tagged() {
        let json = serde_json::to_string(&ServerMessage::NoGamesFound).unwrap();
        assert_eq!(json, r#"{"type":"no_games_found"}"#);

        let json = serde_json::to_string(&ServerMessage::WaitingForOpponent {
            game_id: "g1".into(),
            time_control: 30,
            position: Color::White,
        })
        .unwrap();
        assert!(json.contains(r#""type":"waiting_for_opponent""#));
        assert!(json.contains(r#""gameId":"g1""#));
        assert!(json.contains(r#""position":"white""#));
    }

    #[test]
    fn timer_update_flattens_clock_fields() {
        let json = serde_json::to_string(&ServerMessage::TimerUpdate {
            game_id: "g1".into(),
            clock: ClockInfo {
                player1_time: 1799.5,
                player2_time: 1800.0,
                current_player: Color::Black,
                server_timestamp: 1_700_000_000_000,
            },
        })
        .unwrap();
        assert!(json.contains(r#""player1Time":1799.5"#));
        assert!(json.contains(r#""currentPlayer":"black""#));
    }

    #[test]
    fn game_over_omits_absent_optionals() {
        let json = serde_json::to_string(&ServerMessage::GameOver {
            game_id: "g1".into(),
            result: EndReason::Stalemate,
            winner: None,
            reason: EndReason::Stalemate,
            final_fen: "8/8/8/8/8/8/8/8 w - - 0 1".into(),
            total_moves: 40,
            game_duration: 600,
            elo_changes: None,
            resigned_player: None,
            timed_out_player: None,
        })
        .unwrap();
        assert!(json.contains(r#""winner":null"#));
        assert!(!json.contains("eloChanges"));
        assert!(!json.contains("resignedPlayer"));
    }
}
