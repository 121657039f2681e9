use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::orchestrator::{CollectionEvent, Orchestrator};

/// WebSocket endpoint streaming collection events
///
/// On connect the client receives a full snapshot as a collection_replaced
/// event, then every subsequent change as it happens. The stream is
/// one-directional; client text frames are ignored.
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(orchestrator): State<Arc<Orchestrator>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

async fn handle_socket(socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = orchestrator.events_sender().subscribe();

    // Initial snapshot so the client starts from a consistent state
    let snapshot = CollectionEvent::CollectionReplaced {
        stops: orchestrator.snapshot().await,
    };
    if let Ok(json) = serde_json::to_string(&snapshot) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    let forward_task = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                // A lagged consumer missed events; resync with a snapshot
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let snapshot = CollectionEvent::CollectionReplaced {
                        stops: orchestrator.snapshot().await,
                    };
                    if let Ok(json) = serde_json::to_string(&snapshot) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    // Drain the client side until it disconnects
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    forward_task.abort();
}
