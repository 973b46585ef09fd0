use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{RecognizedText, SpeechRecognizer, StreamConfig};

/// An incremental result frame from the engine. Frames without text
/// (session-created acks, keepalives) are skipped.
#[derive(Debug, Deserialize)]
struct EngineEvent {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

/// Streaming recognizer backed by a remote realtime STT engine speaking
/// WebSocket: one JSON start frame, then binary pcm_s16le audio out;
/// JSON text events come back as recognition is confirmed. Closing the
/// audio feed closes the socket write half, which makes the engine
/// flush its trailing results and end the stream.
pub struct RemoteRealtimeRecognizer {
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteRealtimeRecognizer {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

/// Converts f32 samples back to 16-bit little-endian bytes for the engine.
fn pcm_f32_to_s16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let s16 = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&s16.to_le_bytes());
    }
    bytes
}

#[async_trait]
impl SpeechRecognizer for RemoteRealtimeRecognizer {
    async fn start_stream(
        &self,
        config: StreamConfig,
    ) -> anyhow::Result<(mpsc::Sender<Vec<f32>>, mpsc::Receiver<RecognizedText>)> {
        let (socket, _) = connect_async(self.endpoint.as_str()).await.map_err(|e| {
            anyhow::anyhow!("failed to connect to engine at '{}': {}", self.endpoint, e)
        })?;
        let (mut engine_tx, mut engine_rx) = socket.split();

        let start_frame = serde_json::json!({
            "type": "start",
            "model": &self.model,
            "api_key": &self.api_key,
            "language": &config.language,
            "audio_format": {
                "encoding": "pcm_s16le",
                "sample_rate": config.sample_rate,
            },
        });
        engine_tx
            .send(Message::Text(start_frame.to_string().into()))
            .await
            .map_err(|e| anyhow::anyhow!("failed to start engine stream: {}", e))?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<f32>>(64);
        let (results_tx, results_rx) = mpsc::channel::<RecognizedText>(64);

        // Writer: audio channel -> engine socket. The session dropping
        // its sender ends this loop and closes the write half.
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                let frame = Message::Binary(pcm_f32_to_s16le(&chunk).into());
                if let Err(e) = engine_tx.send(frame).await {
                    warn!(%e, "engine rejected audio frame, stopping feed");
                    break;
                }
            }
            if let Err(e) = engine_tx.send(Message::Close(None)).await {
                debug!(%e, "engine socket already closed");
            }
        });

        // Reader: engine socket -> results channel. Dropping results_tx
        // when the engine stream ends is what signals the flush is done.
        tokio::spawn(async move {
            while let Some(msg) = engine_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<EngineEvent>(&text) {
                        Ok(event) if !event.text.is_empty() => {
                            let result = RecognizedText {
                                text: event.text,
                                start: event.start,
                                end: event.end,
                                language: event.language,
                            };
                            if results_tx.send(result).await.is_err() {
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => debug!(%e, "unparseable engine frame, skipping"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%e, "engine stream error");
                        break;
                    }
                }
            }
            debug!("engine stream drained");
        });

        info!(endpoint = %self.endpoint, model = %self.model, "engine stream started");
        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        "remote_realtime"
    }
}
