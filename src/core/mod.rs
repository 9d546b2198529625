//! Core pipeline logic.
//!
//! This module contains:
//! - Safety: crisis screening, injection filtering, sanitization, PII redaction
//! - Parser / Repair: tolerant JSON extraction with a single repair retry
//! - Schema: per-stage normalize -> validate -> repair
//! - Tags: keyword taxonomy detection
//! - Prompts: stage instructions sent to the completion service
//! - Orchestrator: stage sequencing and analytics

pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod repair;
pub mod safety;
pub mod schema;
pub mod tags;

// Re-export commonly used types
pub use orchestrator::Orchestrator;
pub use parser::{parse_response, ParseFailure};
pub use repair::{parse_with_repair, repair};
pub use safety::{GateRejection, GateReport, ProcessedInput, SafetyGate};
pub use schema::{conform, truncate_words, Conformed, SchemaViolation, StageSchema};
pub use tags::{detect_tags, tag_analysis};
