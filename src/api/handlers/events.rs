//! Server-sent event stream of rotation events

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::api::server::AppState;
use crate::api::websocket::WS_BUFFER_SIZE;

/// Stream rotation events as SSE, one JSON object per event
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut events = state.rotation.subscribe();
    let (tx, rx) = mpsc::channel(WS_BUFFER_SIZE);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let sse = match Event::default().json_data(&event) {
                        Ok(sse) => sse,
                        Err(e) => {
                            warn!("Failed to serialize rotation event: {}", e);
                            continue;
                        }
                    };
                    if tx.send(sse).await.is_err() {
                        debug!("SSE client went away");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("SSE stream lagged, missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default())
}
