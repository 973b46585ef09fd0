use axum::extract::ws::Message as ClientMessage;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tracing::{debug, warn};

use crate::connector::BackendEvents;
use crate::ws::ClientSender;

/// Relays one backend's event stream for the lifetime of the session.
///
/// Only the primary backend's events are decoded and re-encoded onto the
/// client socket; the other streams are drained so backend-side closure
/// is still observed. Stream closure or a read error ends the task
/// normally; the session loop aborts any survivors at teardown.
pub async fn run(name: String, mut events: BackendEvents, client: ClientSender, is_primary: bool) {
    while let Some(msg) = events.next().await {
        match msg {
            Ok(BackendMessage::Text(text)) => {
                if !is_primary {
                    continue;
                }
                let event: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(backend = %name, %e, "undecodable backend event, skipping");
                        continue;
                    }
                };
                let mut guard = client.lock().await;
                if let Err(e) = guard.send(ClientMessage::text(event.to_string())).await {
                    debug!(backend = %name, %e, "client gone, stopping forwarding");
                    break;
                }
            }
            Ok(BackendMessage::Close(_)) => {
                debug!(backend = %name, "backend stream closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(backend = %name, %e, "backend stream error");
                break;
            }
        }
    }
    debug!(backend = %name, "forwarding task exited");
}
