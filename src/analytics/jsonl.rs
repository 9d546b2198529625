//! Append-only analytics log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy inspection. Concurrent sessions share one file; appends are
//! serialized through a mutex.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AnalyticsEvent, EventName};

use super::EventSink;

/// File-based event log using JSONL format
pub struct JsonlEventLog {
    /// Path to the events.jsonl file
    events_path: PathBuf,

    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    /// Open (creating parent directories) a log at `events_path`
    pub async fn open(events_path: impl Into<PathBuf>) -> Result<Self> {
        let events_path = events_path.into();

        if let Some(parent) = events_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create analytics directory: {}", parent.display()))?;
        }

        Ok(Self {
            events_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the default log (`$LOOPWISE_HOME/events.jsonl`)
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::events_path()?).await
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &AnalyticsEvent) -> Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize event")?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<AnalyticsEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: AnalyticsEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Events for one session, in order
    pub async fn session_events(&self, session_id: Uuid) -> Result<Vec<AnalyticsEvent>> {
        self.find_events(|e| e.session_id == session_id).await
    }

    /// Find events matching a predicate
    pub async fn find_events<F>(&self, predicate: F) -> Result<Vec<AnalyticsEvent>>
    where
        F: Fn(&AnalyticsEvent) -> bool,
    {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(predicate).collect())
    }

    /// Get the last event of a specific name for a session
    pub async fn last_event(&self, session_id: Uuid, name: EventName) -> Result<Option<AnalyticsEvent>> {
        let events = self.session_events(session_id).await?;
        Ok(events.into_iter().rev().find(|e| e.event_name == name))
    }
}

#[async_trait]
impl EventSink for JsonlEventLog {
    async fn record(&self, event: &AnalyticsEvent) -> Result<()> {
        self.append(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let log = JsonlEventLog::open(temp.path().join("nested/events.jsonl"))
            .await
            .unwrap();
        let session = Uuid::new_v4();

        log.append(&AnalyticsEvent::new(session, EventName::SessionStarted, json!({})))
            .await
            .unwrap();
        log.append(&AnalyticsEvent::new(session, EventName::LoopBuilt, json!({"repaired": true})))
            .await
            .unwrap();

        let events = log.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_data["repaired"], true);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = JsonlEventLog::open(temp.path().join("events.jsonl")).await.unwrap();
        assert!(log.replay().await.unwrap().is_empty());
    }
}
