use std::sync::Arc;

use scribe_config::{BackendEndpoint, GatewaySettings};

use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<GatewaySettings>,
    /// Active backends in configured priority order, resolved at startup.
    pub endpoints: Arc<Vec<BackendEndpoint>>,
    pub registry: Arc<SessionRegistry>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: GatewaySettings, endpoints: Vec<BackendEndpoint>) -> Self {
        Self {
            settings: Arc::new(settings),
            endpoints: Arc::new(endpoints),
            registry: Arc::new(SessionRegistry::new()),
            http: reqwest::Client::new(),
        }
    }
}
