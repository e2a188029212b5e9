//! Fire-and-forget usage events.

use crate::api::HarborApi;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Longest the CLI waits for a pending event before exiting.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// One command invocation.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    /// Unique event id.
    pub id: Uuid,
    /// When the command started.
    pub timestamp: DateTime<Utc>,
    /// CLI version.
    pub version: &'static str,
    /// Subcommand name.
    pub command: String,
    /// Operating system.
    pub os: &'static str,
    /// CPU architecture.
    pub arch: &'static str,
}

impl UsageEvent {
    /// Event for `command` stamped with the current time.
    pub fn new(command: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            command: command.to_string(),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

/// Post an event in the background; `None` when telemetry is disabled.
pub fn spawn(enabled: bool, api: &HarborApi, command: &str) -> Option<JoinHandle<()>> {
    if !enabled {
        return None;
    }
    let api = api.clone();
    let event = UsageEvent::new(command);
    Some(tokio::spawn(async move {
        if let Err(err) = api.send_telemetry(&event).await {
            log::debug!("telemetry not sent: {err}");
        }
    }))
}

/// Give a pending event a short window to finish.
pub async fn flush(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else {
        return;
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, handle).await.is_err() {
        log::debug!("telemetry still pending after {FLUSH_TIMEOUT:?}");
    }
}
