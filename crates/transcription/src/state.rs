use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use scribe_config::TranscriptionSettings;

use crate::recognizer::SpeechRecognizer;

/// Bookkeeping for one live session, surfaced via /health and removed
/// by the owning connection task at cleanup.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub meeting_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<TranscriptionSettings>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub sessions: Arc<DashMap<String, SessionInfo>>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: TranscriptionSettings, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            settings: Arc::new(settings),
            recognizer,
            sessions: Arc::new(DashMap::new()),
            http: reqwest::Client::new(),
        }
    }
}
