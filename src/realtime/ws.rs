use std::sync::Arc;

use axum::{
    extract::{
        Extension,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::realtime::Broadcaster;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(broadcaster): Extension<Arc<Broadcaster>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (session_id, mut rx) = match broadcaster.open_session() {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "could not register websocket session");
            return;
        }
    };
    info!(
        %session_id,
        sessions = broadcaster.registry().len(),
        "websocket connected"
    );

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.to_string())).await.is_err() {
                return;
            }
        }
        // The session was dropped server-side (backpressure or shutdown).
        // Anything but a normal close tells the client to reconnect.
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: "session closed".into(),
            })))
            .await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!(%session_id, len = text.len(), "ignoring client text frame");
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.close_session(session_id);
    info!(
        %session_id,
        sessions = broadcaster.registry().len(),
        "websocket disconnected"
    );
}
