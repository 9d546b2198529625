//! Recover a JSON value from free-form completion text.
//!
//! Strategies run in strict order and stop at the first success:
//! 1. Whole-string parse
//! 2. Fenced code block (```json or bare ```)
//! 3. Balanced-delimiter extraction starting at the first `{`

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```")
        .unwrap_or_else(|e| panic!("invalid fenced block pattern: {e}"))
});

/// All strategies failed. Carries the error from the whole-string attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to parse completion as JSON: {message}")]
pub struct ParseFailure {
    pub message: String,
}

/// Parse completion text into a JSON value.
pub fn parse_response(text: &str) -> Result<Value, ParseFailure> {
    let trimmed = text.trim();

    let original_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    if let Some(value) = parse_fenced(trimmed) {
        return Ok(value);
    }

    if let Some(value) = parse_balanced(trimmed) {
        return Ok(value);
    }

    Err(ParseFailure {
        message: original_error,
    })
}

fn parse_fenced(text: &str) -> Option<Value> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|block| serde_json::from_str(block.as_str().trim()).ok())
}

fn parse_balanced(text: &str) -> Option<Value> {
    // Objects first, then arrays.
    extract_delimited(text, '{', '}').or_else(|| extract_delimited(text, '[', ']'))
}

fn extract_delimited(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let last = text.rfind(close)?;
    if last < start {
        return None;
    }

    if let Some(end) = matching_close(text, start, open, close) {
        if let Ok(value) = serde_json::from_str(&text[start..=end]) {
            return Some(value);
        }
    }

    // Naive first-to-last slice as a last resort
    serde_json::from_str(&text[start..=last]).ok()
}

/// Byte index of the delimiter closing the one at `start`, skipping string literals.
fn matching_close(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(start + offset);
            }
        }
    }

    None
}
