//! WebSocket stream of the caller's subscription events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use civic_billing_core::UserId;

use crate::auth::AuthUser;
use crate::notify::SubscriptionEvent;
use crate::state::AppState;

/// Upgrade to a WebSocket that receives the caller's room events as JSON text frames.
pub async fn events(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let rx = state.notifier.subscribe(auth.user_id);
    tracing::debug!(user_id = %auth.user_id, "Realtime client joined");
    let notifier = Arc::clone(&state.notifier);
    ws.on_upgrade(move |socket| async move {
        forward_events(socket, rx, auth.user_id).await;
        notifier.leave(&auth.user_id);
    })
}

/// Forward room events until either side closes. Consumes the receiver so
/// the room can be pruned afterwards.
async fn forward_events(
    socket: WebSocket,
    mut rx: broadcast::Receiver<SubscriptionEvent>,
    user_id: UserId,
) {
    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if outgoing.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped, "Realtime client lagging; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(user_id = %user_id, "Realtime client left");
}
