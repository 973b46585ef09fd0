use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, Router, http::StatusCode, routing::post};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use scribe_config::TranscriptionSettings;
use scribe_transcription::build_router;
use scribe_transcription::recognizer::{RecognizedText, SpeechRecognizer, StreamConfig};
use scribe_transcription::state::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Recognizer that yields one scripted utterance per received audio
/// chunk, plus a trailing utterance when the feed closes.
struct ScriptedRecognizer {
    per_chunk: Vec<RecognizedText>,
    on_flush: Option<RecognizedText>,
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start_stream(
        &self,
        _config: StreamConfig,
    ) -> anyhow::Result<(mpsc::Sender<Vec<f32>>, mpsc::Receiver<RecognizedText>)> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<f32>>(16);
        let (results_tx, results_rx) = mpsc::channel(16);
        let mut queued = self.per_chunk.clone().into_iter();
        let flush = self.on_flush.clone();
        tokio::spawn(async move {
            while audio_rx.recv().await.is_some() {
                if let Some(result) = queued.next() {
                    if results_tx.send(result).await.is_err() {
                        return;
                    }
                }
            }
            if let Some(result) = flush {
                let _ = results_tx.send(result).await;
            }
        });
        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Recognizer whose flush never completes within any reasonable time.
struct HangingRecognizer;

#[async_trait]
impl SpeechRecognizer for HangingRecognizer {
    async fn start_stream(
        &self,
        _config: StreamConfig,
    ) -> anyhow::Result<(mpsc::Sender<Vec<f32>>, mpsc::Receiver<RecognizedText>)> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<f32>>(16);
        let (results_tx, results_rx) = mpsc::channel::<RecognizedText>(16);
        tokio::spawn(async move {
            while audio_rx.recv().await.is_some() {}
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(results_tx);
        });
        Ok((audio_tx, results_rx))
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

async fn spawn_callback_server() -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/transcript",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                StatusCode::OK
            }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/transcript"), rx)
}

fn test_settings(callback_url: &str) -> TranscriptionSettings {
    TranscriptionSettings {
        language: "en".to_string(),
        transcript_source: "whisper".to_string(),
        callback_url: callback_url.to_string(),
        flush_timeout_secs: 2,
        ..Default::default()
    }
}

async fn spawn_service(
    settings: TranscriptionSettings,
    recognizer: Arc<dyn SpeechRecognizer>,
) -> (String, AppState) {
    let state = AppState::new(settings, recognizer);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}"), state)
}

async fn next_json(client: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("stream error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn stop_message() -> Message {
    Message::Text(json!({"type": "stop_recording"}).to_string().into())
}

#[tokio::test]
async fn streams_partials_and_delivers_final_callback() {
    let (callback_url, mut callback_rx) = spawn_callback_server().await;
    let recognizer = Arc::new(ScriptedRecognizer {
        per_chunk: vec![RecognizedText {
            text: "hello".to_string(),
            start: Some(0.0),
            end: Some(1.0),
            language: Some("en".to_string()),
        }],
        on_flush: Some(RecognizedText {
            text: "goodbye".to_string(),
            start: Some(1.0),
            end: Some(2.0),
            language: None,
        }),
    });
    let (ws_base, _state) = spawn_service(test_settings(&callback_url), recognizer).await;

    let (mut client, _) = connect_async(format!("{ws_base}/v2/live?id=s1&meeting_id=7"))
        .await
        .unwrap();

    let init = next_json(&mut client).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["request_id"], "s1");

    client
        .send(Message::Binary(vec![0u8; 3200].into()))
        .await
        .unwrap();

    let partial = next_json(&mut client).await;
    assert_eq!(partial["type"], "transcript");
    assert_eq!(partial["data"]["is_final"], false);
    assert_eq!(partial["data"]["source"], "whisper");
    assert_eq!(partial["data"]["utterance"]["text"], "hello");
    assert_eq!(partial["data"]["utterance"]["start"], 0.0);
    assert_eq!(partial["data"]["utterance"]["end"], 1.0);
    assert_eq!(partial["data"]["utterance"]["language"], "en");

    client.send(stop_message()).await.unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), callback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["meeting_id"], 7);
    assert_eq!(payload["transcript_text"], "hello goodbye");
    assert_eq!(payload["segments"].as_array().unwrap().len(), 2);
    assert_eq!(payload["segments"][0]["text"], "hello");
    assert_eq!(payload["segments"][1]["text"], "goodbye");
    assert_eq!(payload["duration"], 2.0);
    assert_eq!(payload["language"], "en");
    assert_eq!(payload["source"], "whisper");
}

#[tokio::test]
async fn empty_session_still_sends_exactly_one_callback() {
    let (callback_url, mut callback_rx) = spawn_callback_server().await;
    let recognizer = Arc::new(ScriptedRecognizer {
        per_chunk: vec![],
        on_flush: None,
    });
    let (ws_base, state) = spawn_service(test_settings(&callback_url), recognizer).await;

    let (mut client, _) = connect_async(format!("{ws_base}/v2/live?id=s2&meeting_id=9"))
        .await
        .unwrap();
    let init = next_json(&mut client).await;
    assert_eq!(init["type"], "init");

    client.send(stop_message()).await.unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), callback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["meeting_id"], 9);
    assert_eq!(payload["transcript_text"], "");
    assert_eq!(payload["segments"], json!([]));
    assert_eq!(payload["duration"], 0.0);

    // No second delivery and no leftover session bookkeeping.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(callback_rx.try_recv().is_err());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn abrupt_disconnect_finalizes_and_sends_callback() {
    let (callback_url, mut callback_rx) = spawn_callback_server().await;
    let recognizer = Arc::new(ScriptedRecognizer {
        per_chunk: vec![RecognizedText {
            text: "cut short".to_string(),
            start: None,
            end: None,
            language: None,
        }],
        on_flush: None,
    });
    let (ws_base, _state) = spawn_service(test_settings(&callback_url), recognizer).await;

    let (mut client, _) = connect_async(format!("{ws_base}/v2/live?id=s3&meeting_id=3"))
        .await
        .unwrap();
    let init = next_json(&mut client).await;
    assert_eq!(init["type"], "init");

    client
        .send(Message::Binary(vec![0u8; 1600].into()))
        .await
        .unwrap();
    let partial = next_json(&mut client).await;
    assert_eq!(partial["data"]["utterance"]["text"], "cut short");
    drop(client);

    let payload = tokio::time::timeout(Duration::from_secs(5), callback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["meeting_id"], 3);
    assert_eq!(payload["transcript_text"], "cut short");
    // 1600 bytes = 800 samples = 0.05s of processed audio.
    assert_eq!(payload["segments"][0]["start"], 0.0);
    assert_eq!(payload["segments"][0]["end"], 0.05);
}

#[tokio::test]
async fn hung_recognizer_flush_still_delivers_the_callback() {
    let (callback_url, mut callback_rx) = spawn_callback_server().await;
    let (ws_base, _state) =
        spawn_service(test_settings(&callback_url), Arc::new(HangingRecognizer)).await;

    let (mut client, _) = connect_async(format!("{ws_base}/v2/live?id=s4&meeting_id=4"))
        .await
        .unwrap();
    let init = next_json(&mut client).await;
    assert_eq!(init["type"], "init");

    client.send(stop_message()).await.unwrap();

    // flush_timeout_secs is 2: the callback must arrive despite the
    // recognizer never finishing its flush.
    let payload = tokio::time::timeout(Duration::from_secs(5), callback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["meeting_id"], 4);
    assert_eq!(payload["transcript_text"], "");
}

#[tokio::test]
async fn unreachable_callback_endpoint_does_not_wedge_the_service() {
    // Grab a port with nothing listening on it.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/transcript")
    };
    let recognizer = Arc::new(ScriptedRecognizer {
        per_chunk: vec![],
        on_flush: None,
    });
    let (ws_base, state) = spawn_service(test_settings(&dead), recognizer).await;

    let (mut client, _) = connect_async(format!("{ws_base}/v2/live?id=s5&meeting_id=5"))
        .await
        .unwrap();
    let init = next_json(&mut client).await;
    assert_eq!(init["type"], "init");
    client.send(stop_message()).await.unwrap();

    // The session must still be torn down cleanly.
    for _ in 0..100 {
        if state.sessions.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state.sessions.is_empty());

    // And the service keeps answering.
    let http_base = ws_base.replace("ws://", "http://");
    let health: Value = reqwest::get(format!("{http_base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["engine"], "scripted");
    assert_eq!(health["active_sessions"], 0);
}
