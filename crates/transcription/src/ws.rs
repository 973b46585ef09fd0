use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::session::AsrSession;
use crate::state::{AppState, SessionInfo};

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

async fn handle_socket(socket: WebSocket, state: AppState, params: LiveParams) {
    let session_id = params
        .id
        .unwrap_or_else(|| format!("sess_{}", Utc::now().timestamp_millis()));
    let meeting_id = params.meeting_id.unwrap_or_else(|| "0".to_string());
    info!(%session_id, %meeting_id, "new streaming connection");

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let mut session = match AsrSession::start(
        session_id.clone(),
        meeting_id.clone(),
        state.recognizer.as_ref(),
        state.settings.clone(),
        sender.clone(),
        state.http.clone(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(%session_id, %e, "recognizer unavailable, closing");
            let mut guard = sender.lock().await;
            let _ = guard
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "Recognizer unavailable".into(),
                })))
                .await;
            return;
        }
    };

    state.sessions.insert(
        session_id.clone(),
        SessionInfo {
            meeting_id: meeting_id.clone(),
            started_at: Utc::now(),
        },
    );

    {
        let init = serde_json::json!({ "type": "init", "request_id": &session_id });
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::text(init.to_string())).await;
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => session.process_audio_chunk(&data).await,
            Ok(Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(control) => {
                    if control.get("type").and_then(|t| t.as_str()) == Some("stop_recording") {
                        info!(%session_id, "stop_recording received");
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
                warn!(%session_id, %e, "stream error");
                break;
            }
        }
    }

    // Runs on every exit path: stop, disconnect, or stream error.
    session.finalize().await;
    {
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::Close(None)).await;
    }
    state.sessions.remove(&session_id);
    info!(%session_id, "session cleaned up");
}
