//! Registration, login, and heartbeat handling.
//!
//! Passwords are stored as `salt$digest` where the digest is SHA-256 over
//! salt and password.

use sha2::{Digest, Sha256};
use shared::ServerMessage;
use tokio::time::Instant;

use crate::game_manager::{AppState, AuthedUser};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 4;

pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl AppState {
    pub async fn handle_register(&self, conn_id: &str, username: &str, password: &str) {
        let username = username.trim();
        let reject = |reason: &str| {
            self.send_to_conn(
                conn_id,
                ServerMessage::RegistrationFailure {
                    reason: reason.into(),
                },
            );
        };

        if username.chars().count() < MIN_USERNAME_LEN {
            reject("Username must be at least 3 characters");
            return;
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            reject("Password must be at least 4 characters");
            return;
        }

        match self.store.find_user_by_name(username).await {
            Ok(Some(_)) => {
                reject("Username already taken");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "user lookup failed during registration");
                reject("Registration unavailable, try again");
                return;
            }
        }

        match self
            .store
            .insert_user(username, &hash_password(password))
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, "user registered");
                self.send_to_conn(
                    conn_id,
                    ServerMessage::RegistrationSuccess {
                        username: user.username,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "user insert failed");
                reject("Registration unavailable, try again");
            }
        }
    }

    pub async fn handle_login(&self, conn_id: &str, username: &str, password: &str) {
        let failure = ServerMessage::LoginFailure {
            reason: "Invalid username or password".into(),
        };

        let user = match self.store.find_user_by_name(username.trim()).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.send_to_conn(conn_id, failure);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "user lookup failed during login");
                self.send_to_conn(
                    conn_id,
                    ServerMessage::LoginFailure {
                        reason: "Login unavailable, try again".into(),
                    },
                );
                return;
            }
        };

        if !verify_password(password, &user.password_hash) {
            self.send_to_conn(conn_id, failure);
            return;
        }

        if let Err(e) = self.store.touch_last_login(user.id).await {
            tracing::warn!(user_id = user.id, error = %e, "failed to record last login");
        }

        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.user = Some(AuthedUser {
                id: user.id,
                username: user.username.clone(),
            });
            conn.authenticated_at = Some(Instant::now());
        }
        // Replaces any previous socket for this player; session broadcasts
        // follow the index, so this is also the reconnect path.
        self.user_conns.insert(user.id, conn_id.to_string());

        tracing::info!(user_id = user.id, username = %user.username, conn_id = %conn_id, "login");
        self.send_to_conn(
            conn_id,
            ServerMessage::LoginSuccess {
                user_id: user.id,
                username: user.username,
                elo: user.elo,
                games_played: user.games_played,
                games_won: user.games_won,
            },
        );
    }
}
