#[cfg(feature = "local-whisper")]
pub mod local_whisper;

pub mod remote;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Configuration for one streaming recognition session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Language hint (ISO 639-1, e.g. "en", "fr").
    pub language: Option<String>,
    /// Sample rate of the audio feed (always 16000 for this pipeline).
    pub sample_rate: u32,
}

/// Newly confirmed text yielded by a recognizer.
#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
    /// Utterance start offset in seconds, when the engine reports one.
    pub start: Option<f64>,
    /// Utterance end offset in seconds, when the engine reports one.
    pub end: Option<f64>,
    /// Detected language, when the engine reports one.
    pub language: Option<String>,
}

/// Trait for pluggable streaming recognizers.
///
/// Audio is fed through the returned sender; dropping it signals end of
/// audio. Confirmed text arrives on the receiver, and the receiver
/// closing means the recognizer has flushed everything it will yield.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Starts a streaming recognition session.
    async fn start_stream(
        &self,
        config: StreamConfig,
    ) -> anyhow::Result<(mpsc::Sender<Vec<f32>>, mpsc::Receiver<RecognizedText>)>;

    /// Human-readable recognizer name.
    fn name(&self) -> &str;
}
