//! Realtime observer socket.
//!
//! Every client gets a full state event on connect, then one event per
//! committed change. A client falling behind is resynchronised with a fresh
//! full state instead of replaying what it missed.

use super::routes::AppState;
use crate::manager::ManagerHandle;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

static NEXT_OBSERVER_ID: AtomicUsize = AtomicUsize::new(1);

/// Messages a client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    RequestFullState,
}

/// GET /api/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let observer_id = NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed);
    tracing::info!("Observer {} connected", observer_id);

    let (outgoing, incoming) = socket.split();
    serve_observer(observer_id, incoming, outgoing, state.manager, state.closing).await;

    tracing::info!("Observer {} disconnected", observer_id);
}

/// Pump state events to one client until it leaves or the server closes
pub(crate) async fn serve_observer<I, O>(
    observer_id: usize,
    mut incoming: I,
    mut outgoing: O,
    manager: ManagerHandle,
    mut closing: watch::Receiver<bool>,
) where
    I: Stream<Item = Result<Message, axum::Error>> + Unpin,
    O: Sink<Message> + Unpin,
{
    let mut observer = manager.subscribe();

    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(observer_id, &text, &manager).await
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            event = observer.next() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to encode {} event: {}", event.event_type(), e);
                        continue;
                    }
                };
                if outgoing.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = closing.changed() => break,
        }
    }
}

async fn handle_client_message(observer_id: usize, text: &str, manager: &ManagerHandle) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::RequestFullState) => {
            if let Err(e) = manager.request_full_state().await {
                tracing::warn!("Observer {} full state request failed: {}", observer_id, e);
            }
        }
        Err(e) => {
            tracing::debug!("Observer {} sent unknown message: {}", observer_id, e);
        }
    }
}
