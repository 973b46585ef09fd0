use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scribe_config::TranscriptionSettings;
use scribe_transcription::recognizer::SpeechRecognizer;
use scribe_transcription::recognizer::remote::RemoteRealtimeRecognizer;
use scribe_transcription::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = TranscriptionSettings::load().context("loading settings")?;
    let recognizer = build_recognizer(&settings)?;

    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState::new(settings, recognizer);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "streaming transcription service listening");
    axum::serve(listener, scribe_transcription::build_router(state)).await?;
    Ok(())
}

fn build_recognizer(settings: &TranscriptionSettings) -> anyhow::Result<Arc<dyn SpeechRecognizer>> {
    match settings.engine.as_str() {
        "remote" => {
            let endpoint = settings.engine_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("TRANSCRIBE_ENGINE_URL is required for the remote engine")
            })?;
            Ok(Arc::new(RemoteRealtimeRecognizer::new(
                endpoint,
                &settings.model,
                settings.engine_api_key.clone(),
            )))
        }
        #[cfg(feature = "local-whisper")]
        "local_whisper" => Ok(Arc::new(
            scribe_transcription::recognizer::local_whisper::LocalWhisperRecognizer::new(
                &settings.model,
                Some(settings.language.clone()),
            )?,
        )),
        other => anyhow::bail!("unknown recognizer engine '{other}'"),
    }
}
