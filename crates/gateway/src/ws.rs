use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use futures::stream::SplitSink;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tracing::{debug, info, warn};

use crate::connector::{self, BackendHandle};
use crate::forwarder;
use crate::registry::SessionEntry;
use crate::state::AppState;

pub type ClientSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    pub id: Option<String>,
    pub meeting_id: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// One relay session: connect the configured backends, pick the primary,
/// then pump client frames out and primary transcript events back until
/// the client stops or disconnects.
async fn handle_socket(mut socket: WebSocket, state: AppState, params: LiveParams) {
    let session_id = params
        .id
        .unwrap_or_else(|| format!("sess_{}", Utc::now().timestamp_millis()));
    let meeting_id = params.meeting_id.unwrap_or_else(|| "0".to_string());
    info!(
        %session_id,
        %meeting_id,
        backends = %state.settings.backends,
        "new relay connection"
    );

    let connect_timeout = Duration::from_secs(state.settings.connect_timeout_secs);
    let attempts = state.endpoints.iter().map(|endpoint| {
        let http = state.http.clone();
        let session_id = session_id.clone();
        let meeting_id = meeting_id.clone();
        async move {
            match tokio::time::timeout(
                connect_timeout,
                connector::connect(&http, endpoint, &session_id, &meeting_id, connect_timeout),
            )
            .await
            {
                Ok(Ok(connected)) => Some(connected),
                Ok(Err(e)) => {
                    warn!(backend = e.backend_name(), %e, "backend excluded from session");
                    None
                }
                Err(_) => {
                    warn!(backend = %endpoint.name, "backend connect attempt timed out");
                    None
                }
            }
        }
    });
    // join_all keeps configured order, so the first success is the primary.
    let connected: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .flatten()
        .collect();

    if connected.is_empty() {
        warn!(%session_id, "no backends available, closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "No backends available".into(),
            })))
            .await;
        return;
    }

    let primary = connected[0].0.name.clone();
    let backend_names: Vec<String> = connected.iter().map(|(handle, _)| handle.name.clone()).collect();
    info!(%session_id, %primary, backends = ?backend_names, "relay session established");

    state.registry.insert(
        session_id.clone(),
        SessionEntry {
            meeting_id: meeting_id.clone(),
            backends: backend_names,
            primary: primary.clone(),
            started_at: Utc::now(),
        },
    );

    let (sender, mut receiver) = socket.split();
    let sender: ClientSender = Arc::new(Mutex::new(sender));

    {
        let init = serde_json::json!({ "type": "init", "request_id": &session_id });
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::text(init.to_string())).await;
    }

    let mut backends: Vec<BackendHandle> = Vec::with_capacity(connected.len());
    let mut forward_tasks = Vec::with_capacity(connected.len());
    for (handle, events) in connected {
        let task = tokio::spawn(forwarder::run(
            handle.name.clone(),
            events,
            sender.clone(),
            handle.name == primary,
        ));
        forward_tasks.push(task);
        backends.push(handle);
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Binary(frame)) => {
                for backend in &mut backends {
                    if let Err(e) = backend
                        .sink
                        .send(BackendMessage::Binary(frame.clone()))
                        .await
                    {
                        warn!(backend = %backend.name, %e, "failed to forward audio frame");
                    }
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(control) => {
                    if control.get("type").and_then(|t| t.as_str()) == Some("stop_recording") {
                        info!(%session_id, "stop_recording received, propagating to all backends");
                        for backend in &mut backends {
                            if let Err(e) = backend
                                .sink
                                .send(BackendMessage::Text(text.to_string().into()))
                                .await
                            {
                                warn!(backend = %backend.name, %e, "failed to propagate stop");
                            }
                        }
                        break;
                    }
                    debug!(%session_id, "unknown control message, ignoring");
                }
                Err(e) => warn!(%session_id, %e, "malformed control message, ignoring"),
            },
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                info!(%session_id, "client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%session_id, %e, "client stream error");
                break;
            }
        }
    }

    // Unconditional teardown: no backend channel or task outlives the
    // session, whichever way the loop exited.
    for backend in &mut backends {
        if let Err(e) = backend.sink.send(BackendMessage::Close(None)).await {
            debug!(backend = %backend.name, %e, "backend channel already closed");
        }
    }
    for task in forward_tasks {
        task.abort();
    }
    {
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::Close(None)).await;
    }
    state.registry.remove(&session_id);
    info!(%session_id, "relay session cleaned up");
}
