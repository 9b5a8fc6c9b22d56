//! WebSocket alert feed
//!
//! Dashboard clients connect to /ws/alerts and receive every `new_alert`
//! event in broadcast order. Clients may send the literal `ping` and get
//! `pong` back.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

/// GET /ws/alerts upgrade handler.
pub async fn alerts_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (subscriber_id, mut events) = state.hub.subscribe();
    tracing::info!(%subscriber_id, "websocket.connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped the sender; nothing more will arrive.
                    None => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text == "ping"
                            && socket.send(Message::Text("pong".into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, %subscriber_id, "websocket.error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.hub.unsubscribe(subscriber_id);
    tracing::info!(%subscriber_id, "websocket.disconnected");
}
