use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scribe_config::TranscriptionSettings;

use crate::callback;
use crate::recognizer::{RecognizedText, SpeechRecognizer, StreamConfig};
use crate::{FinalizationPayload, TranscriptSegment, TranscriptUtterance, pcm_s16le_to_f32};

const SAMPLE_RATE: u32 = 16_000;

pub type ClientSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Lifecycle of one recognition session. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Finalizing,
    Done,
}

/// Accumulates confirmed utterances toward the final transcript.
///
/// Timing policy: engine-reported offsets are used when present;
/// otherwise the utterance is stamped from the previous utterance's end
/// to the cumulative duration of audio processed so far. Both paths are
/// clamped so timestamps never move backwards within a session.
#[derive(Debug, Default)]
struct TranscriptAccumulator {
    segments: Vec<TranscriptSegment>,
    full_text: String,
    last_end: f64,
}

impl TranscriptAccumulator {
    fn resolve_timing(&self, start: Option<f64>, end: Option<f64>, processed_secs: f64) -> (f64, f64) {
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (s, e),
            _ => (self.last_end, processed_secs),
        };
        let start = start.max(self.last_end);
        let end = end.max(start);
        (start, end)
    }

    fn append(&mut self, text: &str, start: f64, end: f64) {
        self.segments.push(TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        });
        self.full_text.push_str(text);
        self.full_text.push(' ');
        self.last_end = end;
    }

    fn duration(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// One streaming recognition session: feeds arriving PCM to the
/// recognizer, streams partial transcripts back, and delivers the
/// accumulated transcript to the orchestrator on finalize.
pub struct AsrSession {
    session_id: String,
    meeting_id: String,
    settings: Arc<TranscriptionSettings>,
    http: reqwest::Client,
    state: SessionState,
    audio_tx: Option<mpsc::Sender<Vec<f32>>>,
    drive_task: Option<JoinHandle<()>>,
    accumulator: Arc<Mutex<TranscriptAccumulator>>,
    processed_samples: Arc<AtomicU64>,
    pcm_remainder: Option<u8>,
    feed_warned: bool,
}

impl AsrSession {
    /// Opens a recognizer stream and starts the drive loop that turns
    /// recognizer output into partial transcripts. The drive loop runs
    /// independently of chunk arrival, so a slow network burst never
    /// blocks on inference.
    pub async fn start(
        session_id: String,
        meeting_id: String,
        recognizer: &dyn SpeechRecognizer,
        settings: Arc<TranscriptionSettings>,
        client: ClientSender,
        http: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let stream_config = StreamConfig {
            language: Some(settings.language.clone()),
            sample_rate: SAMPLE_RATE,
        };
        let (audio_tx, results_rx) = recognizer.start_stream(stream_config).await?;

        let accumulator = Arc::new(Mutex::new(TranscriptAccumulator::default()));
        let processed_samples = Arc::new(AtomicU64::new(0));

        let drive_task = tokio::spawn(drive_loop(
            results_rx,
            Arc::clone(&accumulator),
            Arc::clone(&processed_samples),
            client,
            Arc::clone(&settings),
        ));

        info!(
            %session_id,
            %meeting_id,
            recognizer = recognizer.name(),
            "ASR session started"
        );

        Ok(Self {
            session_id,
            meeting_id,
            settings,
            http,
            state: SessionState::Streaming,
            audio_tx: Some(audio_tx),
            drive_task: Some(drive_task),
            accumulator,
            processed_samples,
            pcm_remainder: None,
            feed_warned: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feeds one raw PCM16LE chunk to the recognizer, preserving arrival
    /// order. A sample split across two chunks is stitched back together.
    pub async fn process_audio_chunk(&mut self, bytes: &[u8]) {
        if self.state != SessionState::Streaming {
            debug!(session_id = %self.session_id, "audio chunk after finalize, ignoring");
            return;
        }
        if bytes.is_empty() && self.pcm_remainder.is_none() {
            return;
        }

        let mut data = Vec::with_capacity(bytes.len() + 1);
        if let Some(carried) = self.pcm_remainder.take() {
            data.push(carried);
        }
        data.extend_from_slice(bytes);
        if data.len() % 2 == 1 {
            self.pcm_remainder = data.pop();
        }

        let samples = pcm_s16le_to_f32(&data);
        if samples.is_empty() {
            return;
        }
        self.processed_samples
            .fetch_add(samples.len() as u64, Ordering::Relaxed);

        if let Some(tx) = &self.audio_tx {
            if tx.send(samples).await.is_err() && !self.feed_warned {
                warn!(session_id = %self.session_id, "recognizer stopped accepting audio");
                self.feed_warned = true;
            }
        }
    }

    /// Flushes the recognizer, assembles the final transcript, and
    /// delivers it to the orchestrator. Always completes: the flush is
    /// bounded by a deadline and a failed callback is logged, not raised.
    pub async fn finalize(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }
        self.state = SessionState::Finalizing;
        info!(session_id = %self.session_id, "finalizing ASR session");

        // Closing the audio channel tells the recognizer to flush.
        self.audio_tx.take();

        if let Some(mut task) = self.drive_task.take() {
            let deadline = Duration::from_secs(self.settings.flush_timeout_secs);
            match tokio::time::timeout(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(session_id = %self.session_id, %e, "drive loop failed"),
                Err(_) => {
                    warn!(
                        session_id = %self.session_id,
                        "recognizer flush timed out, finalizing with what accumulated"
                    );
                    task.abort();
                }
            }
        }

        let payload = self.build_payload().await;
        self.state = SessionState::Done;

        info!(
            session_id = %self.session_id,
            meeting_id = payload.meeting_id,
            segments = payload.segments.len(),
            chars = payload.transcript_text.len(),
            "sending transcript callback"
        );
        callback::deliver(&self.http, &self.settings.callback_url, &payload).await;
    }

    async fn build_payload(&self) -> FinalizationPayload {
        let acc = self.accumulator.lock().await;
        let meeting_id = self.meeting_id.parse::<i64>().unwrap_or_else(|_| {
            warn!(meeting_id = %self.meeting_id, "non-numeric meeting id, reporting 0");
            0
        });
        FinalizationPayload {
            meeting_id,
            transcript_text: acc.full_text.trim().to_string(),
            segments: acc.segments.clone(),
            language: self.settings.language.clone(),
            duration: acc.duration(),
            source: self.settings.transcript_source.clone(),
        }
    }
}

/// Consumes recognizer results: accumulates each confirmed utterance and
/// immediately streams it to the client as a partial transcript. Keeps
/// accumulating even when the client is gone, so finalize still has the
/// full transcript.
async fn drive_loop(
    mut results_rx: mpsc::Receiver<RecognizedText>,
    accumulator: Arc<Mutex<TranscriptAccumulator>>,
    processed_samples: Arc<AtomicU64>,
    client: ClientSender,
    settings: Arc<TranscriptionSettings>,
) {
    while let Some(result) = results_rx.recv().await {
        let text = result.text.trim();
        if text.is_empty() {
            continue;
        }

        let processed_secs =
            processed_samples.load(Ordering::Relaxed) as f64 / f64::from(SAMPLE_RATE);
        let utterance = {
            let mut acc = accumulator.lock().await;
            let (start, end) = acc.resolve_timing(result.start, result.end, processed_secs);
            acc.append(text, start, end);
            TranscriptUtterance {
                text: text.to_string(),
                start,
                end,
                language: result
                    .language
                    .unwrap_or_else(|| settings.language.clone()),
            }
        };

        let message = serde_json::json!({
            "type": "transcript",
            "data": {
                "is_final": false,
                "source": &settings.transcript_source,
                "utterance": &utterance,
            }
        });
        let mut guard = client.lock().await;
        if let Err(e) = guard.send(Message::text(message.to_string())).await {
            debug!(%e, "client gone, accumulating without streaming");
        }
    }
    debug!("recognizer results drained");
}
