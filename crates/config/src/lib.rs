use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("unknown backend '{0}' in the active backend list")]
    UnknownBackend(String),
    #[error("the active backend list is empty")]
    NoBackends,
}

/// One configured ASR backend, resolved from the settings at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub name: String,
    pub base_url: String,
}

/// Settings for the session gateway. Read once from `GATEWAY_*`
/// environment variables at process start; immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// WebSocket base placed into provisioning responses.
    #[serde(default = "default_gateway_advertised_url")]
    pub advertised_url: String,
    /// Ordered, comma-joined list of active backend names.
    #[serde(default = "default_backends")]
    pub backends: String,
    #[serde(default = "default_whisper_url")]
    pub whisper_url: String,
    #[serde(default = "default_voxtral_url")]
    pub voxtral_url: String,
    /// Hard deadline, in seconds, for each backend connect attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl GatewaySettings {
    pub fn load() -> Result<Self, SettingsError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("GATEWAY"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Resolves the ordered backend name list into typed endpoints.
    /// An unknown name is a configuration error, not a runtime miss.
    pub fn backend_endpoints(&self) -> Result<Vec<BackendEndpoint>, SettingsError> {
        let mut endpoints = Vec::new();
        for name in self.backends.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let base_url = match name {
                "whisper" => self.whisper_url.clone(),
                "voxtral" => self.voxtral_url.clone(),
                other => return Err(SettingsError::UnknownBackend(other.to_string())),
            };
            endpoints.push(BackendEndpoint {
                name: name.to_string(),
                base_url,
            });
        }
        if endpoints.is_empty() {
            return Err(SettingsError::NoBackends);
        }
        Ok(endpoints)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            advertised_url: default_gateway_advertised_url(),
            backends: default_backends(),
            whisper_url: default_whisper_url(),
            voxtral_url: default_voxtral_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Settings for the streaming transcription service. Read once from
/// `TRANSCRIBE_*` environment variables at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_transcription_port")]
    pub port: u16,
    #[serde(default = "default_transcription_advertised_url")]
    pub advertised_url: String,
    /// Recognizer selection: "remote" or "local_whisper".
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Remote recognizer WebSocket endpoint (required for "remote").
    #[serde(default)]
    pub engine_url: Option<String>,
    /// Optional credential forwarded to the remote engine.
    #[serde(default)]
    pub engine_api_key: Option<String>,
    /// Model selection passed to the recognizer. For "local_whisper"
    /// this is the model file path.
    #[serde(default = "default_model")]
    pub model: String,
    /// Language hint and the language stamped on every utterance.
    #[serde(default = "default_language")]
    pub language: String,
    /// Source tag on emitted transcripts and the finalization payload.
    #[serde(default = "default_transcript_source")]
    pub transcript_source: String,
    /// Orchestrator endpoint for the finalization payload.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    /// Hard deadline, in seconds, for the finalize flush.
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

impl TranscriptionSettings {
    pub fn load() -> Result<Self, SettingsError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("TRANSCRIBE"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_transcription_port(),
            advertised_url: default_transcription_advertised_url(),
            engine: default_engine(),
            engine_url: None,
            engine_api_key: None,
            model: default_model(),
            language: default_language(),
            transcript_source: default_transcript_source(),
            callback_url: default_callback_url(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8084
}

fn default_gateway_advertised_url() -> String {
    "ws://audio-router:8084".to_string()
}

fn default_backends() -> String {
    "whisper,voxtral".to_string()
}

fn default_whisper_url() -> String {
    "http://whisper-streaming-proxy:8085".to_string()
}

fn default_voxtral_url() -> String {
    "http://voxtral-streaming-proxy:8086".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_transcription_port() -> u16 {
    8085
}

fn default_transcription_advertised_url() -> String {
    "ws://whisper-streaming-proxy:8085".to_string()
}

fn default_engine() -> String {
    "remote".to_string()
}

fn default_model() -> String {
    "large-v3".to_string()
}

fn default_language() -> String {
    "fr".to_string()
}

fn default_transcript_source() -> String {
    "whisper".to_string()
}

fn default_callback_url() -> String {
    "http://bot-manager:8080/bots/internal/transcript".to_string()
}

fn default_flush_timeout_secs() -> u64 {
    10
}
