use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::state::{SharedState, Subscription};

/// Convert a topic subscription into an SSE response, forwarding events and
/// unsubscribing once the client disconnects.
pub fn to_sse_stream(
    state: SharedState,
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let Subscription {
        handle,
        mut receiver,
    } = subscription;
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = receiver.recv() => {
                    let Some(payload) = next else { break };
                    let mut event = Event::default().data(payload.data.to_string());
                    if let Some(name) = payload.event {
                        event = event.event(name);
                    }

                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        state.broadcaster().unsubscribe(handle);
        info!(topic = %handle.topic, "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
