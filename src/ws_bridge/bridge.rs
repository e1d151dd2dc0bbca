use crate::error::Result;
use crate::simulator::state::ServerSnapshot;
use axum::extract::ws::Message;
use axum::{
    extract::{ws::{WebSocket, WebSocketUpgrade}, State},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub tx: broadcast::Sender<ServerSnapshot>,
}

pub fn router(tx: broadcast::Sender<ServerSnapshot>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { tx })
}

pub async fn start_ws_server(port: u16, tx: broadcast::Sender<ServerSnapshot>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("WebSocket snapshot feed listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(tx)).await?;

    Ok(())
}

/// JSON text frame sent for each snapshot.
pub fn snapshot_message(snapshot: &ServerSnapshot) -> Result<String> {
    let msg = serde_json::json!({
        "type": "snapshot",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "counter": snapshot.counter,
        "devices": snapshot.devices,
    });
    Ok(serde_json::to_string(&msg)?)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("New WebSocket connection");

    let mut rx = state.tx.subscribe();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let snapshot = match received {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagging, skipped {} snapshots", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match snapshot_message(&snapshot) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            tracing::info!("Client disconnected");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to encode snapshot: {}", e),
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(_msg)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                }
            }
        }
    }
}
