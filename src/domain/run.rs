//! Pipeline run state.
//!
//! A `PipelineRun` tracks which state of the analysis state machine the
//! current invocation is in and refuses transitions the machine does not
//! allow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// States of the analysis state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    SafetyChecked,
    QuestionsNeeded,
    Processing,
    NarrativeBuilt,
    SpiessBuilt,
    SummaryBuilt,
    Tagged,
    Completed,

    /// Self-harm risk detected, terminal
    CrisisExit,

    /// Input rejected by the gate, terminal
    ValidationExit,

    /// Uncaught failure after the gate, terminal
    Failed,
}

impl PipelineState {
    /// Whether the machine may move from `self` to `next`
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Start, SafetyChecked | CrisisExit | ValidationExit) => true,
            (SafetyChecked, QuestionsNeeded | Processing) => true,
            (Processing, NarrativeBuilt) => true,
            (NarrativeBuilt, SpiessBuilt) => true,
            (SpiessBuilt, SummaryBuilt) => true,
            (SummaryBuilt, Tagged) => true,
            (Tagged, Completed) => true,
            (from, Failed) => !from.is_terminal() && from != Start,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::QuestionsNeeded
                | PipelineState::Completed
                | PipelineState::CrisisExit
                | PipelineState::ValidationExit
                | PipelineState::Failed
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid pipeline transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// One invocation of the analysis pipeline
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Session this run belongs to
    pub session_id: Uuid,

    /// Current state
    pub state: PipelineState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// States visited, in order (including the current one)
    pub history: Vec<PipelineState>,
}

impl PipelineRun {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            state: PipelineState::Start,
            started_at: Utc::now(),
            history: vec![PipelineState::Start],
        }
    }

    /// Move to the next state, or fail without changing anything
    pub fn advance(&mut self, next: PipelineState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(session_id = %self.session_id, from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Mark the run failed; ignored once the run is already terminal.
    pub fn fail(&mut self) {
        if self.state.can_transition_to(PipelineState::Failed) {
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = PipelineRun::new(Uuid::new_v4());

        for next in [
            PipelineState::SafetyChecked,
            PipelineState::Processing,
            PipelineState::NarrativeBuilt,
            PipelineState::SpiessBuilt,
            PipelineState::SummaryBuilt,
            PipelineState::Tagged,
            PipelineState::Completed,
        ] {
            run.advance(next).unwrap();
        }

        assert!(run.is_finished());
        assert_eq!(run.history.len(), 8);
    }

    #[test]
    fn test_exits_only_from_start() {
        assert!(PipelineState::Start.can_transition_to(PipelineState::CrisisExit));
        assert!(PipelineState::Start.can_transition_to(PipelineState::ValidationExit));
        assert!(!PipelineState::Processing.can_transition_to(PipelineState::CrisisExit));
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(PipelineState::SafetyChecked).unwrap();

        let err = run.advance(PipelineState::SpiessBuilt).unwrap_err();
        assert_eq!(err.from, PipelineState::SafetyChecked);
        assert_eq!(run.state, PipelineState::SafetyChecked);
    }

    #[test]
    fn test_fail_is_ignored_after_terminal_state() {
        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(PipelineState::ValidationExit).unwrap();
        run.fail();
        assert_eq!(run.state, PipelineState::ValidationExit);

        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(PipelineState::SafetyChecked).unwrap();
        run.advance(PipelineState::Processing).unwrap();
        run.fail();
        assert_eq!(run.state, PipelineState::Failed);
    }
}
