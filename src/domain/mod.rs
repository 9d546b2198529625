//! Domain types for the loopwise pipeline.
//!
//! This module contains the core data structures:
//! - Analysis: NarrativeLoop, SpiessMap, Summary, tags and the aggregate result
//! - Events: Analytics records emitted around a run
//! - Run: Pipeline state machine
//! - Response: Caller-facing request/response shapes

pub mod analysis;
pub mod events;
pub mod response;
pub mod run;

// Re-export commonly used types
pub use analysis::{
    AnalysisResult, MicroTest, NarrativeLoop, SpiessMap, Stage, Summary, Tag, ToolAction, NEEDS,
    PROTOCOLS,
};
pub use events::{AnalyticsEvent, EventName, ExitReason};
pub use response::{
    merge_answers, AnalysisRequest, AnalysisResponse, Answer, CrisisResource, Outcome,
};
pub use run::{InvalidTransition, PipelineRun, PipelineState};
