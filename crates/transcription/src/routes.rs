use axum::{Json, extract::State};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::state::AppState;

/// Gladia-compatible session provisioning: returns a fresh session id
/// and the stream address to connect to. No side effects beyond id
/// generation.
pub async fn create_session(State(state): State<AppState>) -> Json<Value> {
    let session_id = Uuid::new_v4().to_string();
    Json(json!({
        "id": &session_id,
        "url": format!("{}/v2/live?id={}", state.settings.advertised_url, session_id),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "engine": state.recognizer.name(),
        "active_sessions": state.sessions.len(),
    }))
}
