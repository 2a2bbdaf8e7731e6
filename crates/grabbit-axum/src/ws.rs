//! The WebSocket event channel.
//!
//! On connect the observer receives every subsequent job event as a JSON
//! text frame; there is no replay, the client snapshots via the list
//! endpoint. The client side only sends heartbeats, which are drained and
//! ignored.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;

use crate::auth::AuthUser;
use crate::state::AppState;

/// `GET /api/events` - upgrade to the event channel.
pub async fn events(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    upgrade: WebSocketUpgrade,
) -> Response {
    tracing::debug!(user = %claims.username, "observer connecting");
    upgrade.on_upgrade(move |socket| serve_events(state, socket))
}

async fn serve_events(state: AppState, mut socket: WebSocket) {
    let mut events = state.events.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            tracing::warn!("event failed to serialize");
                            continue;
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // The observer resynchronizes via the list endpoint
                        tracing::debug!(skipped, "observer lagged behind the event stream");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    // Heartbeats and other client frames carry no commands
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    tracing::debug!("observer disconnected");
}
