// handlers.rs

use crate::{
    devices::DeviceInfo,
    events::{Bus, Message},
    metrics,
    models::AppState,
    utils,
};
use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsFrame, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub async fn handle_bus_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("Bus client connection attempt");
    ws.on_upgrade(|socket| handle_client(socket, state))
}

/// Emits a message on the bus and waits for its reply.
#[utoipa::path(
    post,
    path = "/api/request",
    request_body = Message,
    responses(
        (status = 200, description = "Reply to the request", body = Message),
        (status = 504, description = "No reply within the request timeout")
    )
)]
pub async fn post_request(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Message>,
) -> Result<Json<Message>, StatusCode> {
    let topic = message.msg_type.clone();
    match state
        .bus
        .wait_for_response(message, state.request_timeout)
        .await
    {
        Some(reply) => Ok(Json(reply)),
        None => {
            warn!(%topic, "No reply before timeout");
            Err(StatusCode::GATEWAY_TIMEOUT)
        }
    }
}

/// Lists registered devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    responses((status = 200, description = "Registered devices", body = [DeviceInfo]))
)]
pub async fn get_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceInfo>> {
    Json(state.registry.infos())
}

// Every text frame from the client goes onto the bus; every bus message goes
// to the client.
async fn handle_client(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = Uuid::new_v4();
    let mut rx = state.bus.tap();

    state.clients.insert(client_id, Utc::now());
    metrics::set_bus_clients(state.clients.len());
    info!(%client_id, "Bus client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let message = match rx.recv().await {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%client_id, skipped, "Bus client lagging");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode message: {}", e);
                    continue;
                }
            };

            if sender.send(WsFrame::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            while let Some(Ok(frame)) = receiver.next().await {
                match frame {
                    WsFrame::Text(text) => match serde_json::from_str::<Message>(text.as_str()) {
                        Ok(message) => {
                            debug!(%client_id, topic = %message.msg_type, "Bus message");
                            state.bus.emit(message);
                        }
                        Err(e) => warn!(%client_id, "Invalid message format: {}", e),
                    },
                    WsFrame::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::pin!(send_task, recv_task);
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    utils::cleanup_client_connection(client_id, &state);
}
