use std::time::Duration;

use tracing::{info, warn};

use crate::FinalizationPayload;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs the single delivery attempt of the finalization payload.
///
/// Failures are logged and swallowed: the payload is not persisted or
/// retried, and finalize must complete regardless of the outcome.
pub async fn deliver(http: &reqwest::Client, url: &str, payload: &FinalizationPayload) {
    match http
        .post(url)
        .timeout(CALLBACK_TIMEOUT)
        .json(payload)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            info!(status = %response.status(), "transcript callback delivered");
        }
        Ok(response) => {
            warn!(status = %response.status(), "transcript callback rejected");
        }
        Err(e) => {
            warn!(%e, "failed to deliver transcript callback");
        }
    }
}
