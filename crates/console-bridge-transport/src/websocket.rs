//! WebSocket endpoint for browser agents.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};

use crate::connection::{ConnectionManager, Outbound};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<ConnectionManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, manager))
}

async fn handle_socket(socket: WebSocket, manager: Arc<ConnectionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut rx) = manager.register();

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let message = match out {
                Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::error!("Failed to serialize frame: {e}");
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Bytes::new()),
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    manager.open(id);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => manager.handle_text(id, text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => manager.handle_text(id, text),
                        Err(_) => tracing::debug!(connection = %id, "Dropping non-UTF-8 frame"),
                    },
                    Some(Ok(Message::Pong(_))) => manager.record_pong(id),
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::error!(connection = %id, "WebSocket error: {e}");
                        break;
                    }
                }
            }
            // Writer finished: closed by the manager or the socket is gone
            _ = &mut send_task => break,
        }
    }

    manager.unregister(id);
    send_task.abort();
}

/// Create the agent WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(manager));
/// ```
#[must_use]
pub fn create_ws_router(manager: Arc<ConnectionManager>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(manager)
}
