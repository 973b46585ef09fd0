use axum::{Json, extract::State};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::state::AppState;

/// Gladia-compatible session provisioning: allocates a fresh session id
/// and returns the WebSocket address the client should stream into.
pub async fn create_session(State(state): State<AppState>) -> Json<Value> {
    let session_id = Uuid::new_v4().to_string();
    Json(json!({
        "id": &session_id,
        "url": format!("{}/v2/live?id={}", state.settings.advertised_url, session_id),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let backends: Vec<&str> = state.endpoints.iter().map(|e| e.name.as_str()).collect();
    Json(json!({
        "status": "ok",
        "backends": backends,
        "active_sessions": state.registry.len(),
    }))
}
