use dashmap::DashMap;
use shared::ServerMessage;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::persistence::{GameStorePtr, PositionCachePtr};

pub mod auth;
pub mod clock;
pub mod lifecycle;
pub mod matchmaking;
pub mod oracle;
pub mod rating;
pub mod registry;
pub mod session;

pub use registry::{AuthedUser, Connection, Tx};
pub use session::{SessionCommand, SessionInfo};

/// A waiting game: created, durable, and visible to the band search until
/// paired, cancelled, or its creator goes away.
#[derive(Debug, Clone)]
pub struct WaitingGame {
    pub game_id: String,
    pub creator_id: i64,
    pub creator_name: String,
    pub creator_rating: i32,
    pub time_control_minutes: u32,
    pub created_at: Instant,
}

/// An in-progress game: the session actor's inbox plus enough read-only
/// detail for routing and observability.
pub struct ActiveGame {
    pub inbox: tokio::sync::mpsc::UnboundedSender<SessionCommand>,
    pub info: SessionInfo,
}

pub struct AppState {
    pub cfg: ServerConfig,
    pub store: GameStorePtr,
    pub cache: PositionCachePtr,
    /// Live connections keyed by socket id.
    pub connections: DashMap<String, Connection>,
    /// Which socket currently speaks for an authenticated player.
    pub user_conns: DashMap<i64, String>,
    /// Open waiting games keyed by game id.
    pub waiting: Mutex<HashMap<String, WaitingGame>>,
    /// Active sessions keyed by game id.
    pub games: DashMap<String, ActiveGame>,
    /// Player id -> the game they are in.
    pub player_to_game: DashMap<i64, String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(cfg: ServerConfig, store: GameStorePtr, cache: PositionCachePtr) -> Self {
        Self {
            cfg,
            store,
            cache,
            connections: DashMap::new(),
            user_conns: DashMap::new(),
            waiting: Mutex::new(HashMap::new()),
            games: DashMap::new(),
            player_to_game: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn send_to_conn(&self, conn_id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(conn_id) {
            let _ = conn.tx.send(msg);
        }
    }

    /// Delivers to whatever socket currently speaks for the player, so a
    /// reconnect transparently re-points every broadcast.
    pub fn send_to_user(&self, user_id: i64, msg: ServerMessage) {
        if let Some(conn_id) = self.user_conns.get(&user_id) {
            self.send_to_conn(conn_id.value(), msg);
        }
    }

    pub fn user_online(&self, user_id: i64) -> bool {
        self.user_conns.contains_key(&user_id)
    }

    /// The authenticated identity behind a socket, if any.
    pub fn authed(&self, conn_id: &str) -> Option<AuthedUser> {
        self.connections.get(conn_id).and_then(|c| c.user.clone())
    }

    /// Routes a command into a session's inbox, or reports why it can't.
    pub fn route_to_session(
        &self,
        conn_id: &str,
        game_id: &str,
        make: impl FnOnce(i64) -> SessionCommand,
    ) {
        let Some(user) = self.authed(conn_id) else {
            self.send_to_conn(
                conn_id,
                ServerMessage::Error {
                    message: "Not authenticated".into(),
                },
            );
            return;
        };
        match self.games.get(game_id) {
            Some(game) => {
                let _ = game.inbox.send(make(user.id));
            }
            None => self.send_to_conn(
                conn_id,
                ServerMessage::Error {
                    message: "Game is not active".into(),
                },
            ),
        }
    }
}
