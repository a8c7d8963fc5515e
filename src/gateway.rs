//! The connection gateway (spec §4.1): accepts the duplex text channel, authenticates
//! the first frame, and forwards classified frames into presence/match routing.
//!
//! Grounded on the teacher's `realtime::websocket` handler for the split sink/stream +
//! spawned writer task shape, simplified from DAG-CBOR framing to the plain-text
//! protocol this duel channel actually speaks.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::info;

use crate::actors::messages::{EventKind, MatchEvent};
use crate::channel::{ChannelCommand, DuelChannel};
use crate::identity::IdentityProvider;
use crate::presence::{AttachOutcome, PresenceRegistry};

#[derive(Clone)]
pub struct GatewayState {
    pub presence: Arc<PresenceRegistry>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();

    if sink.send(Message::Text("Connected".into())).await.is_err() {
        return;
    }

    let token = match stream.next().await {
        Some(Ok(Message::Text(t))) => t,
        _ => return,
    };

    let identity = match state.identity.resolve_token(&token).await {
        Ok(identity) if !identity.banned => identity,
        _ => {
            let _ = sink.send(Message::Text("invalid token".into())).await;
            return;
        }
    };

    if sink.send(Message::Text("token accepted".into())).await.is_err() {
        return;
    }

    let user_id = identity.user_id;
    let rating = identity.rating;

    let (tx, mut rx) = mpsc::channel::<ChannelCommand>(64);
    let channel = DuelChannel::new(tx);

    let writer = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ChannelCommand::Send(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                ChannelCommand::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    match state.presence.attach(user_id, rating, channel.clone()) {
        AttachOutcome::QueuedNew | AttachOutcome::ReplacedQueued => {
            let _ = channel.send("Search started").await;
        }
        AttachOutcome::Reconnected(_) => {
            info!(user_id, "reattached mid-match");
        }
        AttachOutcome::AlreadyInMatch => {
            let _ = channel.send("already in a match").await;
            channel.close().await;
            writer.abort();
            return;
        }
    }

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // Explicit withdrawal while queued: the original matchmaker's plain
                // "cancel" command, carried forward as its own frame rather than
                // falling through to answer classification.
                if text == "Cancel" {
                    state.presence.detach(user_id);
                    continue;
                }
                let kind = classify(&text);
                state.presence.dispatch_event(MatchEvent { user_id, kind });
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    state.presence.detach(user_id);
    state.presence.dispatch_event(MatchEvent {
        user_id,
        kind: EventKind::Disconnected,
    });
    writer.abort();
}

fn classify(text: &str) -> EventKind {
    if let Some(payload) = text.strip_prefix("MessageToChat ") {
        EventKind::Chat(payload.to_string())
    } else if let Some(payload) = text.strip_prefix("SendEmoji ") {
        EventKind::Emoji(payload.to_string())
    } else {
        EventKind::Answer(text.to_string())
    }
}
