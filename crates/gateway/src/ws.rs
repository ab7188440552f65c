//! WebSocket subscription surface.
//!
//! `GET /api/orders/execute?orderId=` upgrades to a stream of one JSON
//! [`StatusMessage`] per frame. The socket task owns the receiving half of
//! the hub channel; the hub replays any backlog on attach, so a subscriber
//! arriving after the worker finished still sees the full lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::api::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub order_id: Option<String>,
}

/// GET /api/orders/execute (upgrade)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params.order_id, state))
}

async fn handle_socket(mut socket: WebSocket, order_id: Option<String>, state: Arc<AppState>) {
    let Some(order_id) = order_id.filter(|id| !id.trim().is_empty()) else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "orderId query param required".into(),
            })))
            .await;
        return;
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let ticket = state.hub.attach(&order_id, tx);

    counter!("ws_connections_total").increment(1);
    gauge!("ws_active_subscribers").set(state.hub.subscriber_count() as f64);
    info!(%order_id, "subscriber connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping = tokio::time::interval(Duration::from_secs(30));
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            status = rx.recv() => {
                // A closed channel means a newer subscriber took over.
                let Some(message) = status else { break };
                let frame = match serde_json::to_string(&message) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(%order_id, %err, "failed to serialize status message");
                        let _ = ws_tx
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::ERROR,
                                reason: "Internal server error".into(),
                            })))
                            .await;
                        break;
                    }
                };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    // Pongs and stray client frames are ignored.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%order_id, %err, "websocket error");
                        break;
                    }
                }
            }

            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.detach_ticket(&order_id, ticket);
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_active_subscribers").set(state.hub.subscriber_count() as f64);
    info!(%order_id, "subscriber disconnected");
}
