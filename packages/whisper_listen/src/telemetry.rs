//! Optional diagnostic log of presence chunks.
//!
//! When enabled, every presence chunk sent or received is POSTed to the
//! logging endpoint. Requests are spawned and never awaited by the session.

use serde::{Deserialize, Serialize};
use tracing::debug;
use whisper_protocol::Direction;

use crate::config::TelemetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceLogEntry {
    pub client_id: String,
    pub sent_or_received: String,
    pub kind: String,
    pub chunk: String,
}

impl PresenceLogEntry {
    pub fn new(client_id: &str, direction: Direction, chunk: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            sent_or_received: direction.as_str().to_string(),
            kind: "TCP".to_string(),
            chunk: chunk.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct PresenceLogger {
    client: Option<reqwest::Client>,
    url: String,
    client_id: String,
}

impl PresenceLogger {
    pub fn new(config: &TelemetryConfig, client_id: &str) -> Self {
        Self {
            client: config.enabled.then(reqwest::Client::new),
            url: config.log_url(),
            client_id: client_id.to_string(),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: None,
            url: String::new(),
            client_id: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Must be called from inside a tokio runtime when enabled.
    pub fn log(&self, direction: Direction, chunk: &str) {
        let Some(client) = &self.client else {
            return;
        };
        let entry = PresenceLogEntry::new(&self.client_id, direction, chunk);
        let request = client.post(&self.url).json(&entry);
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    debug!(status = %resp.status(), "presence log rejected");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "presence log failed"),
            }
        });
    }
}
