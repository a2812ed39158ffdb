//! WebSocket session lifecycle for one authenticated client, from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parley_core::Principal;
use parley_realtime::RealtimeError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::handle_frame;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_REJECTIONS_TOTAL,
};
use crate::server::AppState;

/// How long the writer gets to flush a Close frame after the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a WebSocket session for an already verified principal.
///
/// 1. Attaches a connection to the engine (which queues `connection.established`)
/// 2. Forwards queued frames to the socket and sends periodic Pings
/// 3. Applies inbound text/binary frames as commands and queues their acks
/// 4. Ends on client close, heartbeat timeout or engine close
/// 5. Closes the engine handle; subscriptions stay behind
#[instrument(skip_all, fields(identity = %principal.id))]
pub async fn run_ws_session(ws: WebSocket, principal: Principal, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.outbound_queue_capacity);
    let handle = match state.distributor.attach(principal, send_tx) {
        Ok(h) => h,
        Err(e) => {
            let reason = if matches!(e, RealtimeError::ConnectionLimit(_)) {
                "capacity"
            } else {
                "stopped"
            };
            counter!(WS_REJECTIONS_TOTAL, "reason" => reason).increment(1);
            warn!(error = %e, "engine refused connection");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let connection = Arc::clone(handle.connection());
    info!(conn_id = %handle.id(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer_conn = Arc::clone(&connection);
    let ping_every = state.config.heartbeat_interval();
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.closed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let hb_cancel = CancellationToken::new();
    let hb_conn = Arc::clone(&connection);
    let hb_token = hb_cancel.clone();
    let (interval, timeout) = (state.config.heartbeat_interval(), state.config.heartbeat_timeout());
    let heartbeat = tokio::spawn(async move {
        if run_heartbeat(Arc::clone(&hb_conn), interval, timeout, hb_token).await
            == HeartbeatResult::TimedOut
        {
            warn!(conn_id = %hb_conn.id, "client unresponsive, disconnecting");
            hb_conn.close();
        }
    });

    let mut reason = "client";
    loop {
        let next = tokio::select! {
            msg = ws_rx.next() => msg,
            () = connection.closed() => {
                reason = "server";
                break;
            }
        };
        let Some(Ok(msg)) = next else { break };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => Some(t.to_string()),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    Some(s.to_owned())
                } else {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };
        let Some(text) = text else { continue };

        let ack = handle_frame(&state.distributor, &handle, &text).await;
        if !connection.push_json(&ack) {
            debug!("ack dropped, outbound queue full or closed");
        }
    }

    let _ = state.distributor.close(&handle);
    hb_cancel.cancel();
    let _ = heartbeat.await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(conn_id = %handle.id(), reason, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
