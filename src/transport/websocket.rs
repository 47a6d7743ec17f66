//! WebSocket connection handling
//!
//! One connection streams at a time. A new connection takes over the
//! streaming slot and the previous one is closed, so a client that vanished
//! without closing never locks out its own reconnect.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::transport::server::TransportState;

/// Current holder of the streaming slot
pub(crate) struct ActiveStream {
    generation: u64,
    conn_id: Uuid,
    evict_tx: oneshot::Sender<()>,
}

/// Streaming slot held by one connection handler, released on drop
struct StreamSlot {
    state: Arc<TransportState>,
    generation: u64,
    evict_rx: oneshot::Receiver<()>,
}

impl StreamSlot {
    /// Take the slot, evicting whichever connection holds it
    fn take_over(state: &Arc<TransportState>, conn_id: Uuid) -> Self {
        let generation = state.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (evict_tx, evict_rx) = oneshot::channel();

        let previous = state.active.lock().replace(ActiveStream {
            generation,
            conn_id,
            evict_tx,
        });
        if let Some(previous) = previous {
            tracing::info!(
                "WebSocket {} takes over from {}",
                conn_id,
                previous.conn_id
            );
            let _ = previous.evict_tx.send(());
        }

        Self {
            state: state.clone(),
            generation,
            evict_rx,
        }
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        let mut active = self.state.active.lock();
        if active.as_ref().map(|a| a.generation) == Some(self.generation) {
            *active = None;
        }
    }
}

/// Upgrade handler for the audio route
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<TransportState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(mut socket: WebSocket, peer: SocketAddr, state: Arc<TransportState>) {
    let conn_id = Uuid::new_v4();
    let mut slot = StreamSlot::take_over(&state, conn_id);
    state.connections.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("WebSocket {} opened from {}", conn_id, peer);

    loop {
        let next = tokio::select! {
            msg = socket.next() => Some(msg),
            _ = &mut slot.evict_rx => None,
        };
        let Some(msg) = next else {
            tracing::debug!("WebSocket {} replaced by a newer connection", conn_id);
            let _ = socket.send(Message::Close(None)).await;
            break;
        };

        match msg {
            Some(Ok(Message::Binary(data))) => {
                // Write failures are counted by the source; keep the connection
                if let Err(e) = state.source.write(Bytes::from(data)) {
                    tracing::debug!(
                        connection = %conn_id,
                        error = %e,
                        "Failed to write websocket data to audio stream"
                    );
                }
            }
            Some(Ok(Message::Text(text))) => {
                tracing::debug!("WebSocket {} ignoring {} byte text message", conn_id, text.len());
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!("WebSocket {} receive error: {}", conn_id, e);
                break;
            }
        }
    }

    tracing::debug!("WebSocket {} closed", conn_id);
}
