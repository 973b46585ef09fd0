pub mod callback;
pub mod recognizer;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use recognizer::{RecognizedText, SpeechRecognizer, StreamConfig};
pub use session::{AsrSession, SessionState};

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// One timestamped unit of recognized text streamed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptUtterance {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub language: String,
}

/// One segment of the accumulated final transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The complete transcript and its metadata, delivered once to the
/// orchestrator when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationPayload {
    pub meeting_id: i64,
    pub transcript_text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
    pub duration: f64,
    pub source: String,
}

/// Converts raw PCM signed 16-bit little-endian samples to f32 in
/// [-1.0, 1.0). A trailing odd byte is ignored; callers that stream
/// arbitrary chunk sizes must carry it over themselves.
pub fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/v2/live", post(routes::create_session).get(ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::pcm_s16le_to_f32;

    #[test]
    fn converts_pcm_s16le_to_normalized_f32() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80];
        let samples = pcm_s16le_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 32767.0 / 32768.0).abs() < 1e-6);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn trailing_odd_byte_is_not_a_sample() {
        assert_eq!(pcm_s16le_to_f32(&[0x00, 0x00, 0x12]).len(), 1);
    }
}
