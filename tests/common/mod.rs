//! Shared fixtures: a scripted completion service keyed by stage.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use loopwise::adapters::{CompletionOutput, CompletionRequest, CompletionService};
use loopwise::analytics::{Analytics, MemorySink};
use loopwise::config::PipelineSettings;
use loopwise::core::prompts;
use loopwise::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decision,
    Questions,
    Narrative,
    Spiess,
    Summary,
    Repair,
}

impl Stage {
    fn of(request: &CompletionRequest) -> Option<Stage> {
        let system = request.system_prompt()?;
        if system.starts_with("You repair malformed data") {
            return Some(Stage::Repair);
        }
        [
            (prompts::DECISION_HEADING, Stage::Decision),
            (prompts::QUESTIONS_HEADING, Stage::Questions),
            (prompts::NARRATIVE_HEADING, Stage::Narrative),
            (prompts::SPIESS_HEADING, Stage::Spiess),
            (prompts::SUMMARY_HEADING, Stage::Summary),
        ]
        .into_iter()
        .find(|(heading, _)| system.starts_with(heading))
        .map(|(_, stage)| stage)
    }
}

/// Replies with canned text per stage; unscripted stages fail.
#[derive(Default)]
pub struct ScriptedService {
    replies: HashMap<Stage, Result<String, String>>,
    calls: Mutex<Vec<(Stage, CompletionRequest)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service answering NO to the clarity check and returning valid JSON for every stage
    pub fn happy_path() -> Self {
        Self::new()
            .reply(Stage::Decision, "NO")
            .reply(Stage::Narrative, NARRATIVE_JSON)
            .reply(Stage::Spiess, SPIESS_JSON)
            .reply(Stage::Summary, SUMMARY_JSON)
    }

    pub fn reply(mut self, stage: Stage, text: impl Into<String>) -> Self {
        self.replies.insert(stage, Ok(text.into()));
        self
    }

    pub fn fail(mut self, stage: Stage, message: impl Into<String>) -> Self {
        self.replies.insert(stage, Err(message.into()));
        self
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    pub fn requests_for(&self, stage: Stage) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutput> {
        let stage = Stage::of(&request)
            .ok_or_else(|| anyhow::anyhow!("unrecognized prompt"))?;
        self.calls.lock().unwrap().push((stage, request));

        match self.replies.get(&stage) {
            Some(Ok(text)) => Ok(CompletionOutput::new(text.clone())),
            Some(Err(message)) => anyhow::bail!("{}", message),
            None => anyhow::bail!("no scripted reply for {:?}", stage),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Orchestrator over a scripted service with an in-memory analytics sink
pub fn orchestrator(service: ScriptedService) -> (Orchestrator, Arc<ScriptedService>, Arc<MemorySink>) {
    let service = Arc::new(service);
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(
        service.clone(),
        Analytics::new(sink.clone()),
        PipelineSettings::default(),
    );
    (orchestrator, service, sink)
}

pub const WORKPLACE_STORY: &str = "My manager criticized my quarterly report in front of the whole \
team. I keep replaying it and I'm scared I'll be fired because everything I hand in has to be perfect.";

pub const NARRATIVE_JSON: &str = r#"{
  "trigger": "Manager criticized the quarterly report in front of the team",
  "fear": "Being fired for not being good enough",
  "emotion": "Shame and anxiety",
  "outcome": "Replaying the meeting and over-checking every document",
  "whyItFeelsReal": "Public criticism felt like proof of failure",
  "hiddenLogic": "If my work is perfect, nobody can reject me",
  "breakingActions": ["Ask the manager for specific feedback", "Ship one draft that is good enough"],
  "mechanisms": ["Perfectionism", "Fear of rejection"]
}"#;

pub const SPIESS_JSON: &str = r#"{
  "sensations": ["Tight chest", "Racing heart"],
  "emotions": ["Shame", "Anxiety"],
  "needs": ["security", "recognition"],
  "confirmationBias": "Only the criticism is remembered, not the praise",
  "microTest": {
    "description": "Send one report without a third review pass",
    "timeframe": "This week",
    "successCriteria": "Note whether anyone mentions a mistake"
  },
  "toolAction": {
    "protocol": "STOP",
    "steps": ["Stop", "Breathe", "Observe", "Proceed"],
    "example": "Before re-reading the report a fourth time, pause and breathe"
  }
}"#;

pub const SUMMARY_JSON: &str = r#"{
  "content": "Public criticism activated a fear of being fired, which you manage by demanding perfect work from yourself.",
  "mechanisms": ["Perfectionism", "Rejection sensitivity"],
  "nextStep": "Try the micro test this week"
}"#;
