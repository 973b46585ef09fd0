use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{SplitSink, SplitStream};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tracing::{debug, info};

use scribe_config::BackendEndpoint;

pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type BackendSink = SplitSink<BackendSocket, Message>;
pub type BackendEvents = SplitStream<BackendSocket>;

/// Why a backend could not be brought into the session. Always advisory:
/// the gateway logs it and excludes the backend, nothing escalates.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("provisioning request to '{name}' failed: {source}")]
    Provision {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provisioning response from '{name}' was not usable: {source}")]
    BadProvisionResponse {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("opening stream to '{name}' failed: {source}")]
    Connect {
        name: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("backend '{name}' closed before acknowledging the stream")]
    HandshakeClosed { name: String },
    #[error("backend '{name}' sent no acknowledgement within {timeout_secs}s")]
    AckTimeout { name: String, timeout_secs: u64 },
}

impl ConnectorError {
    pub fn backend_name(&self) -> &str {
        match self {
            ConnectorError::Provision { name, .. }
            | ConnectorError::BadProvisionResponse { name, .. }
            | ConnectorError::Connect { name, .. }
            | ConnectorError::HandshakeClosed { name }
            | ConnectorError::AckTimeout { name, .. } => name,
        }
    }
}

/// The write half of one backend's duplex channel plus its metadata.
/// The read half is handed to that backend's forwarding task.
pub struct BackendHandle {
    pub name: String,
    pub sink: BackendSink,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ProvisionResponse {
    id: String,
    url: String,
}

/// Two-step handshake bringing up one streaming session on one backend:
/// provision over HTTP, then open the returned duplex stream (with the
/// meeting id as a correlation parameter) and wait for its first
/// acknowledgement frame. Every step is deadline-bounded.
pub async fn connect(
    http: &reqwest::Client,
    endpoint: &BackendEndpoint,
    session_id: &str,
    meeting_id: &str,
    timeout: Duration,
) -> Result<(BackendHandle, BackendEvents), ConnectorError> {
    let name = endpoint.name.clone();

    let response = http
        .post(format!("{}/v2/live", endpoint.base_url))
        .timeout(timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|source| ConnectorError::Provision {
            name: name.clone(),
            source,
        })?;
    let provision: ProvisionResponse =
        response
            .json()
            .await
            .map_err(|source| ConnectorError::BadProvisionResponse {
                name: name.clone(),
                source,
            })?;
    debug!(
        backend = %name,
        %session_id,
        backend_session = %provision.id,
        "backend session provisioned"
    );

    let stream_url = format!("{}&meeting_id={}", provision.url, meeting_id);
    let (socket, _) = connect_async(stream_url.as_str())
        .await
        .map_err(|source| ConnectorError::Connect {
            name: name.clone(),
            source,
        })?;
    let (sink, mut events) = socket.split();

    // The backend's first frame confirms the channel is ready.
    let ack = tokio::time::timeout(timeout, events.next())
        .await
        .map_err(|_| ConnectorError::AckTimeout {
            name: name.clone(),
            timeout_secs: timeout.as_secs(),
        })?;
    match ack {
        Some(Ok(frame)) => debug!(backend = %name, ?frame, "backend stream ready"),
        _ => return Err(ConnectorError::HandshakeClosed { name }),
    }

    info!(backend = %name, %session_id, %meeting_id, "backend connected");
    Ok((
        BackendHandle {
            name,
            sink,
            connected_at: Utc::now(),
        },
        events,
    ))
}
