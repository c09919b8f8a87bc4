use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::sse::ServerEvent,
    services::live_updates,
    state::{SharedState, Topic},
};

/// Handle the full lifecycle of one WebSocket subscription to `topic`.
///
/// Published events are forwarded as JSON text frames. Any text frame sent by
/// the client asks for a fresh snapshot of the topic.
pub async fn handle_socket(state: SharedState, socket: WebSocket, topic: Topic) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let subscription = match live_updates::subscribe(&state, topic).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(%topic, error = %err, "websocket subscription rejected");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    let handle = subscription.handle;
    info!(%topic, subscription = handle.id, "websocket subscriber connected");

    let forward_tx = outbound_tx.clone();
    let mut events = subscription.receiver;
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if send_event(&forward_tx, &event).is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%topic, payload = %text, "refresh requested by websocket client");
                live_updates::request_refresh(&state, topic);
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%topic, error = %err, "websocket error");
                break;
            }
        }
        if forwarder.is_finished() {
            break;
        }
    }

    state.broadcaster().unsubscribe(handle);
    forwarder.abort();
    info!(%topic, subscription = handle.id, "websocket subscriber disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize an event and queue it on the writer channel.
///
/// Serialization failures are logged and skipped; `Err` means the writer is gone.
fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize live event");
            return Ok(());
        }
    };
    tx.send(Message::Text(payload.into())).map_err(|_| ())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
