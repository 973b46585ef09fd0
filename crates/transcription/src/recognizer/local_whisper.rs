use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{RecognizedText, SpeechRecognizer, StreamConfig};

/// Samples per transcription window (5s at 16kHz).
const WINDOW_SAMPLES: usize = 5 * 16_000;
/// whisper.cpp needs roughly a second of audio; shorter tails are
/// zero-padded up to this.
const MIN_SAMPLES: usize = 16_000;

/// Local Whisper recognizer using whisper.cpp via whisper-rs.
///
/// Streams by transcribing fixed windows of buffered audio, so offsets
/// are window-exact: each result reports the cumulative position of its
/// window within the session. The tail window is flushed when the audio
/// feed closes.
pub struct LocalWhisperRecognizer {
    ctx: Arc<WhisperContext>,
    default_language: Option<String>,
}

impl LocalWhisperRecognizer {
    /// Loads a GGML Whisper model file (e.g. ggml-base.bin) from disk.
    pub fn new(model_path: &str, default_language: Option<String>) -> anyhow::Result<Self> {
        info!(model_path, "Loading Whisper model");
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model '{}': {}", model_path, e))?;
        info!("Whisper model loaded");
        Ok(Self {
            ctx: Arc::new(ctx),
            default_language,
        })
    }
}

fn transcribe_window(
    ctx: &WhisperContext,
    language: Option<&str>,
    mut audio: Vec<f32>,
) -> anyhow::Result<(String, Option<String>)> {
    if audio.len() < MIN_SAMPLES {
        audio.resize(MIN_SAMPLES, 0.0);
    }

    let mut state = ctx
        .create_state()
        .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;

    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });

    if let Some(lang) = language {
        params.set_language(Some(lang));
    } else {
        params.set_detect_language(true);
    }

    params.set_translate(false);
    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_single_segment(false);
    params.set_no_speech_thold(0.6);
    params.set_suppress_blank(true);

    state
        .full(params, &audio)
        .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

    let n_segments = state.full_n_segments();
    let mut text = String::new();
    for i in 0..n_segments {
        if let Some(segment) = state.get_segment(i)
            && let Ok(seg_text) = segment.to_str()
        {
            text.push_str(seg_text);
        }
    }

    let detected = whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(|s| s.to_string());

    Ok((text.trim().to_string(), detected))
}

/// Returns true if the text is a known Whisper hallucination/placeholder.
fn is_hallucination(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("[blank_audio]")
        || lower.contains("[silence]")
        || lower.contains("[music]")
        || lower.contains("(silence)")
        || lower.contains("(music)")
        || lower == "you"
        || lower == "thank you."
        || lower == "thanks for watching!"
}

#[async_trait]
impl SpeechRecognizer for LocalWhisperRecognizer {
    async fn start_stream(
        &self,
        config: StreamConfig,
    ) -> anyhow::Result<(mpsc::Sender<Vec<f32>>, mpsc::Receiver<RecognizedText>)> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<f32>>(64);
        let (results_tx, results_rx) = mpsc::channel::<RecognizedText>(64);

        let ctx = Arc::clone(&self.ctx);
        let language = config.language.or_else(|| self.default_language.clone());
        let sample_rate = f64::from(config.sample_rate);

        tokio::spawn(async move {
            let mut buffer: Vec<f32> = Vec::new();
            let mut consumed_secs = 0.0_f64;

            loop {
                let closed = match audio_rx.recv().await {
                    Some(chunk) => {
                        buffer.extend_from_slice(&chunk);
                        false
                    }
                    None => true,
                };

                while buffer.len() >= WINDOW_SAMPLES || (closed && !buffer.is_empty()) {
                    let take = buffer.len().min(WINDOW_SAMPLES);
                    let window: Vec<f32> = buffer.drain(..take).collect();
                    let window_start = consumed_secs;
                    consumed_secs += window.len() as f64 / sample_rate;

                    let ctx = Arc::clone(&ctx);
                    let lang_hint = language.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        transcribe_window(&ctx, lang_hint.as_deref(), window)
                    })
                    .await;

                    match outcome {
                        Ok(Ok((text, detected))) if !text.is_empty() && !is_hallucination(&text) => {
                            let result = RecognizedText {
                                text,
                                start: Some(window_start),
                                end: Some(consumed_secs),
                                language: detected.or_else(|| language.clone()),
                            };
                            if results_tx.send(result).await.is_err() {
                                return;
                            }
                        }
                        Ok(Ok(_)) => debug!("window produced no usable text"),
                        Ok(Err(e)) => warn!(%e, "whisper window failed"),
                        Err(e) => {
                            warn!(%e, "whisper task join error");
                            return;
                        }
                    }
                }

                if closed {
                    break;
                }
            }
            debug!("whisper stream flushed");
        });

        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}
