//! One bounded round-trip to coerce malformed completion text into JSON.
//!
//! Called at most once per extraction, only after `parse_response` failed.
//! The repaired text goes back through the parser; if that also fails the
//! caller falls back to its stage default.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::{CompletionRequest, CompletionService};

use super::parser::{parse_response, ParseFailure};

/// Repair calls are always deterministic
pub const REPAIR_TEMPERATURE: f32 = 0.0;

/// Ask the completion service to rewrite `raw_text` as a document matching `instruction`.
pub async fn repair(
    service: &dyn CompletionService,
    model: &str,
    max_tokens: u32,
    instruction: &str,
    raw_text: &str,
) -> Result<String> {
    let request = CompletionRequest::new(model, max_tokens, REPAIR_TEMPERATURE)
        .system(repair_directive(instruction))
        .user(raw_text);

    let output = service.complete(request).await?;
    Ok(output.content)
}

fn repair_directive(instruction: &str) -> String {
    format!(
        "You repair malformed data into valid JSON.\n\
         Return ONLY a single JSON document matching this shape:\n{}\n\
         Do not add prose, explanations, or markdown code fences.",
        instruction
    )
}

/// Parse, and on failure repair once and parse again.
///
/// Returns `None` when both attempts fail or the repair call itself errors.
pub async fn parse_with_repair(
    service: &dyn CompletionService,
    model: &str,
    max_tokens: u32,
    instruction: &str,
    text: &str,
) -> Option<Value> {
    let first_error: ParseFailure = match parse_response(text) {
        Ok(value) => return Some(value),
        Err(e) => e,
    };
    warn!(error = %first_error, "Completion was not valid JSON, requesting repair");

    let repaired = match repair(service, model, max_tokens, instruction, text).await {
        Ok(repaired) => repaired,
        Err(e) => {
            warn!(error = %e, "Repair request failed");
            return None;
        }
    };

    match parse_response(&repaired) {
        Ok(value) => {
            debug!("Repair produced valid JSON");
            Some(value)
        }
        Err(e) => {
            warn!(error = %e, "Repaired completion still not valid JSON");
            None
        }
    }
}
