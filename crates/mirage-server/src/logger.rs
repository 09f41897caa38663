//! Event log appender.
//!
//! One JSON object per line. Each write opens the file in append-create
//! mode and issues a single `write_all`, so concurrent handlers interleave
//! at line granularity under `O_APPEND`. Failures are logged and dropped;
//! logging never fails a request.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use mirage_core::Event;

/// Appends events to the configured log path.
#[derive(Debug, Clone)]
pub struct EventLogger {
    path: PathBuf,
}

impl EventLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one event. Best effort.
    pub async fn write(&self, event: &Event) {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("error marshaling event to JSON: {e}");
                return;
            }
        };
        line.push(b'\n');

        if let Err(e) = self.append(&line).await {
            tracing::warn!("error writing to log file {:?}: {e}", self.path);
        }
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await
    }
}
