//! Connection registry: which sockets exist, who they speak for, and when
//! they were last heard from. A background sweeper reaps silent connections.

use shared::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::game_manager::AppState;

pub type Tx = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: i64,
    pub username: String,
}

pub struct Connection {
    pub tx: Tx,
    pub user: Option<AuthedUser>,
    pub connected_at: Instant,
    pub authenticated_at: Option<Instant>,
    pub last_seen: Instant,
}

impl AppState {
    pub fn add_connection(&self, conn_id: String, tx: Tx) {
        tracing::info!(conn_id = %conn_id, "connection opened");
        let now = Instant::now();
        self.connections.insert(
            conn_id,
            Connection {
                tx,
                user: None,
                connected_at: now,
                authenticated_at: None,
                last_seen: now,
            },
        );
    }

    /// Refreshes liveness; called for every inbound frame.
    pub fn touch(&self, conn_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.last_seen = Instant::now();
        }
    }

    /// Tears down a connection: withdraws the owner's waiting game and drops
    /// the authentication index entry. Active games are left alone so the
    /// player can reconnect to them.
    pub async fn remove_connection(&self, conn_id: &str) {
        let Some((_, conn)) = self.connections.remove(conn_id) else {
            return;
        };
        tracing::info!(
            conn_id = %conn_id,
            connected_for = ?conn.connected_at.elapsed(),
            authenticated = conn.authenticated_at.is_some(),
            "connection closed"
        );

        let Some(user) = conn.user else {
            return;
        };

        // Only clean up user-level state if this socket still speaks for the
        // player; a reconnect may already have replaced it.
        let still_current = self
            .user_conns
            .get(&user.id)
            .is_some_and(|c| c.value() == conn_id);
        if !still_current {
            return;
        }
        self.user_conns.remove(&user.id);
        self.withdraw_waiting_game(user.id).await;
    }

    pub(crate) async fn withdraw_waiting_game(&self, user_id: i64) {
        let removed = {
            let mut waiting = self.waiting.lock().await;
            let game_id = waiting
                .values()
                .find(|w| w.creator_id == user_id)
                .map(|w| w.game_id.clone());
            game_id.and_then(|id| waiting.remove(&id))
        };
        if let Some(w) = removed {
            tracing::info!(game_id = %w.game_id, creator = user_id, "withdrew waiting game");
            if let Err(e) = self.store.delete_waiting(&w.game_id).await {
                tracing::warn!(game_id = %w.game_id, error = %e, "failed to delete waiting row");
            }
        }
    }

    /// Reaps connections that have been silent past the liveness threshold.
    pub fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cfg.sweep_interval);
            loop {
                interval.tick().await;
                let threshold = self.cfg.liveness_timeout;
                let now = Instant::now();
                let stale: Vec<String> = self
                    .connections
                    .iter()
                    .filter(|entry| now.duration_since(entry.value().last_seen) > threshold)
                    .map(|entry| entry.key().clone())
                    .collect();

                for conn_id in stale {
                    tracing::info!(conn_id = %conn_id, "reaping stale connection");
                    // Dropping the connection closes its writer task and with
                    // it the socket.
                    self.remove_connection(&conn_id).await;
                }
            }
        });
    }
}
