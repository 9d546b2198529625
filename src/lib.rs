//! loopwise - narrative loop analysis pipeline
//!
//! Turns a short personal narrative into a structured analysis: a narrative
//! loop, a SPIESS map, a plain-language summary and taxonomy tags. Every
//! language-model output passes through tolerant parsing and schema repair,
//! so callers always receive a schema-valid result or a structured exit.
//!
//! # Modules
//!
//! - `adapters`: Completion service integrations (OpenAI-compatible)
//! - `analytics`: Lifecycle event sinks (JSONL log, in-memory)
//! - `core`: Safety gate, parsing, schema repair, tagging, orchestration
//! - `domain`: Data structures (analysis, events, run state, responses)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Analyze a narrative
//! echo "My manager criticized my report and I'm scared I'll be fired" | loopwise analyze
//!
//! # Answer clarifying questions
//! loopwise analyze --session-id <id> --answer "my manager" -i story.txt
//!
//! # Inspect analytics for a session
//! loopwise events <session-id>
//! ```

pub mod adapters;
pub mod analytics;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{CompletionService, OpenAiAdapter};
pub use analytics::{Analytics, EventSink, JsonlEventLog, MemorySink};
pub use core::{Orchestrator, SafetyGate};
pub use domain::{AnalysisRequest, AnalysisResponse, AnalysisResult, Outcome, Tag};
