//! WebSocket event streaming.
//!
//! One long-lived connection per session. The handler holds only a
//! broadcast receiver, never the session itself, so destroying the
//! session closes the channel and every subscriber observes it.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use crate::err::ApiError;
use crate::evt::{Envelope, EventData, Payload};
use crate::session::Registry;

pub(super) async fn events(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = registry.get(id).await?;
    let rx = session.subscribe();
    drop(session);
    Ok(ws.on_upgrade(move |socket| stream(socket, id, rx)))
}

async fn stream(mut socket: WebSocket, id: Uuid, mut rx: broadcast::Receiver<Envelope>) {
    debug!(session = %id, "event subscriber connected");
    let mut dropped: usize = 0;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        // Announce a gap before resuming the stream so the
                        // client knows to refresh its state.
                        if dropped > 0 {
                            let marker = Envelope {
                                session_id: id,
                                payload: Payload::Event(EventData {
                                    event: "dropped",
                                    address: None,
                                    message: Some(format!("dropped {dropped} events")),
                                }),
                            };
                            if send_json(&mut socket, &marker).await.is_err() {
                                break;
                            }
                            dropped = 0;
                        }
                        if send_json(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // A slow client loses old events, never the session.
                        dropped += n as usize;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(session = %id, "session closed; disconnecting subscriber");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Client pings and texts are ignored; this channel
                        // only streams events.
                    }
                    Some(Err(err)) => {
                        error!(session = %id, "websocket error: {err}");
                        break;
                    }
                }
            }
        }
    }
    debug!(session = %id, "event subscriber disconnected");
}

async fn send_json(socket: &mut WebSocket, event: &Envelope) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(err) => {
            error!("failed to serialize event: {err}");
            Ok(())
        }
    }
}
