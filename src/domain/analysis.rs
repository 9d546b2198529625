//! Structured analysis produced by one pipeline run.
//!
//! Every type here is built fresh from model text, passed through the schema
//! cycle in `core::schema`, and handed to the caller. Nothing is mutated after
//! the pipeline returns it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed needs vocabulary (lower-cased).
pub const NEEDS: [&str; 12] = [
    "safety",
    "connection",
    "autonomy",
    "competence",
    "respect",
    "recognition",
    "belonging",
    "security",
    "control",
    "rest",
    "understanding",
    "fairness",
];

/// The three coping protocols a tool action may name.
pub const PROTOCOLS: [&str; 3] = ["STOP", "Values First", "Bridge Belief"];

/// Trigger/fear/emotion/outcome causal structure of a narrative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeLoop {
    pub trigger: String,
    pub fear: String,
    pub emotion: String,
    pub outcome: String,
    pub why_it_feels_real: String,
    pub hidden_logic: String,
    pub breaking_actions: Vec<String>,
    pub mechanisms: Vec<String>,
}

/// Sensations, emotions, needs, confirmation bias, micro test and tool action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiessMap {
    pub sensations: Vec<String>,
    pub emotions: Vec<String>,
    pub needs: Vec<String>,
    pub confirmation_bias: String,
    pub micro_test: MicroTest,
    pub tool_action: ToolAction,
}

/// A small, time-boxed real-world experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroTest {
    pub description: String,
    pub timeframe: String,
    pub success_criteria: String,
}

/// One of the fixed coping protocols with concrete steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAction {
    pub protocol: String,
    pub steps: Vec<String>,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub content: String,
    pub mechanisms: Vec<String>,
    pub next_step: String,
}

/// Canonical pattern tags derived from the built structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Perfectionism,
    FearOfRejection,
    Catastrophizing,
    PeoplePleasing,
    ImposterSyndrome,
    Control,
    SelfWorth,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Perfectionism => "perfectionism",
            Tag::FearOfRejection => "fear_of_rejection",
            Tag::Catastrophizing => "catastrophizing",
            Tag::PeoplePleasing => "people_pleasing",
            Tag::ImposterSyndrome => "imposter_syndrome",
            Tag::Control => "control",
            Tag::SelfWorth => "self_worth",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the pipeline stopped for this response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ClarifyingQuestions,
    Completed,
}

/// Aggregate result of a completed analysis.
///
/// Ownership passes to the caller; the orchestrator keeps no copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub session_id: Uuid,
    pub stage: Stage,
    pub narrative_loop: NarrativeLoop,
    pub spiess_map: SpiessMap,
    pub summary: Summary,
    pub tags: BTreeSet<Tag>,
}

impl AnalysisResult {
    /// Tag names as plain strings, sorted.
    pub fn tag_names(&self) -> Vec<&'static str> {
        self.tags.iter().map(Tag::as_str).collect()
    }
}
