//! Analytics event emission.
//!
//! The orchestrator reports lifecycle events through `Analytics`, which
//! forwards them to an `EventSink`. Sink failures are logged and swallowed so
//! they never abort an analysis.

pub mod jsonl;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{AnalyticsEvent, EventName};

pub use jsonl::JsonlEventLog;

/// Destination for analytics events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &AnalyticsEvent) -> Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn record(&self, _event: &AnalyticsEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().await.clone()
    }

    /// Event names in emission order
    pub async fn names(&self) -> Vec<EventName> {
        self.events.lock().await.iter().map(|e| e.event_name).collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record(&self, event: &AnalyticsEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Fire-and-forget handle used by the pipeline
#[derive(Clone)]
pub struct Analytics {
    sink: Arc<dyn EventSink>,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new(Arc::new(NoopSink))
    }
}

impl Analytics {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Record an event. Never fails: sink errors are logged and dropped.
    pub async fn track(
        &self,
        session_id: Uuid,
        event_name: EventName,
        event_data: Value,
        user_id: Option<&str>,
        request_context: Option<Value>,
    ) {
        let event = AnalyticsEvent::new(session_id, event_name, event_data)
            .with_user(user_id.map(str::to_string))
            .with_request_context(request_context);

        match self.sink.record(&event).await {
            Ok(()) => debug!(%session_id, event = %event_name, "Analytics event recorded"),
            Err(e) => warn!(%session_id, event = %event_name, error = %e, "Failed to record analytics event"),
        }
    }
}

/// Short fingerprint of input content (first 16 hex chars of SHA-256)
pub fn fingerprint(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}
