use crate::game_manager::{AppState, SessionCommand};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use shared::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward server events from the channel onto the socket.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let conn_id = uuid::Uuid::new_v4().to_string();
    state.add_connection(conn_id.clone(), tx.clone());

    let _ = tx.send(ServerMessage::ConnectionConfirmed {
        socket_id: conn_id.clone(),
        server: format!("chess-server/{}", env!("CARGO_PKG_VERSION")),
        timestamp: Utc::now().timestamp_millis(),
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            state.touch(&conn_id);
            match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_msg) => dispatch(&state, &conn_id, client_msg).await,
                Err(_) => {
                    state.send_to_conn(
                        &conn_id,
                        ServerMessage::Error {
                            message: "Malformed message".into(),
                        },
                    );
                }
            }
        }
    }

    // Client disconnected
    state.remove_connection(&conn_id).await;
}

async fn dispatch(state: &Arc<AppState>, conn_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::Register { username, password } => {
            state.handle_register(conn_id, &username, &password).await
        }
        ClientMessage::Login { username, password } => {
            state.handle_login(conn_id, &username, &password).await
        }
        // Liveness was already refreshed on receipt.
        ClientMessage::Heartbeat => {}
        ClientMessage::CreateGame { time_control } => {
            state.handle_create_game(conn_id, time_control).await
        }
        ClientMessage::SearchForGame => state.handle_search(conn_id).await,
        ClientMessage::CancelMatchmaking => state.handle_cancel(conn_id).await,
        ClientMessage::Move { game_id, mv } => {
            state.route_to_session(conn_id, &game_id, |player_id| SessionCommand::Move {
                player_id,
                input: mv,
            })
        }
        ClientMessage::Resign { game_id } => {
            state.route_to_session(conn_id, &game_id, |player_id| SessionCommand::Resign {
                player_id,
            })
        }
        ClientMessage::Chat { game_id, message } => {
            state.route_to_session(conn_id, &game_id, |player_id| SessionCommand::Chat {
                player_id,
                message,
            })
        }
        ClientMessage::ReconnectToGame { game_id }
        | ClientMessage::RequestGameSync { game_id } => {
            state.route_to_session(conn_id, &game_id, |player_id| SessionCommand::Sync {
                player_id,
            })
        }
    }
}
