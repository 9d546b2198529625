//! Analytics events emitted around a pipeline run.
//!
//! Events are appended to an external log keyed by session. They never carry
//! raw user input.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single analytics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The analysis session this event belongs to
    pub session_id: Uuid,

    /// Event vocabulary term
    pub event_name: EventName,

    /// Free-form event payload (NO raw input)
    #[serde(default)]
    pub event_data: Value,

    /// Authenticated user, if the caller knows one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Request metadata (client, route, ...) supplied by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<Value>,
}

impl AnalyticsEvent {
    /// Create a new event with the current timestamp
    pub fn new(session_id: Uuid, event_name: EventName, event_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            event_name,
            event_data,
            user_id: None,
            request_context: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_request_context(mut self, context: Option<Value>) -> Self {
        self.request_context = context;
        self
    }
}

/// The fixed event vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    SessionStarted,
    InputReceived,
    QuestionsAsked,
    LoopBuilt,
    SpiessBuilt,
    SummaryBuilt,
    SafeExit,
    UserDeletedData,
    MicroTestCompleted,
    Day2Return,
}

impl EventName {
    pub const ALL: [EventName; 10] = [
        EventName::SessionStarted,
        EventName::InputReceived,
        EventName::QuestionsAsked,
        EventName::LoopBuilt,
        EventName::SpiessBuilt,
        EventName::SummaryBuilt,
        EventName::SafeExit,
        EventName::UserDeletedData,
        EventName::MicroTestCompleted,
        EventName::Day2Return,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SessionStarted => "session_started",
            EventName::InputReceived => "input_received",
            EventName::QuestionsAsked => "questions_asked",
            EventName::LoopBuilt => "loop_built",
            EventName::SpiessBuilt => "spiess_built",
            EventName::SummaryBuilt => "summary_built",
            EventName::SafeExit => "safe_exit",
            EventName::UserDeletedData => "user_deleted_data",
            EventName::MicroTestCompleted => "micro_test_completed",
            EventName::Day2Return => "day2_return",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| format!("Unknown event name: {}", s))
    }
}

/// Why a run left through a safe exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Crisis,
    Validation,
    ProcessingError,
}
