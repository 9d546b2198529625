//! Safety gate run over raw input before any model call.
//!
//! Checks, in order:
//! - Crisis language (keywords + first-person patterns), short-circuits everything
//! - Prompt-injection phrasing
//! - Sanitization (markup, URLs, injection phrases, length)
//! - PII redaction (email, phone, government id, card, optionally names)
//!
//! Every function here is pure so the gate is deterministic under test.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CrisisResource;

/// Hard cap on sanitized input length, in characters
pub const MAX_INPUT_CHARS: usize = 10_000;

pub const URL_PLACEHOLDER: &str = "[URL]";
pub const FILTERED_PLACEHOLDER: &str = "[FILTERED]";

const GENERIC_INVALID_MESSAGE: &str =
    "We couldn't process that input. Please describe your situation in your own words.";
const EMPTY_INPUT_MESSAGE: &str = "Please describe what happened so we can help.";
const CRISIS_MESSAGE: &str = "It sounds like you are going through something really painful. \
You don't have to face this alone. Please reach out to one of these resources right now.";

const CRISIS_KEYWORDS: &[&str] = &[
    "suicide",
    "suicidal",
    "kill myself",
    "killing myself",
    "end my life",
    "ending my life",
    "take my own life",
    "want to die",
    "better off dead",
    "no reason to live",
    "self-harm",
    "self harm",
    "hurt myself",
    "cut myself",
];

static CRISIS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bi\s*(?:'m|’m|am)\s+(?:going|planning)\s+to\s+(?:die|end\s+it)",
        r"(?i)\bi\s+(?:want|wish|plan)\s+(?:to\s+)?(?:die|end\s+it(?:\s+all)?)\b",
        r"(?i)\bi\s+wish\s+i\s+(?:was|were)\s+(?:dead|never\s+born)",
        r"(?i)\b(?:no|nothing)\s+(?:point|reason)\s+(?:in\s+|to\s+)?(?:living|live|going\s+on)",
        r"(?i)\bi\s+(?:can't|can’t|cannot|can\s+not)\s+go\s+on\b",
        r"(?i)\beveryone\s+(?:would\s+be|is)\s+better\s+off\s+without\s+me",
    ])
});

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)ignore\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|prompts?|rules?)",
        r"(?i)disregard\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above|earlier|your)\s+(?:instructions?|prompts?|rules?)",
        r"(?i)forget\s+(?:all\s+)?(?:your|the|previous|prior)\s+(?:previous\s+)?(?:instructions?|rules?|training)",
        r"(?i)\bjailbreak",
        r"(?i)\byou\s+are\s+now\s+(?:a|an|in)\b",
        r"(?i)(?:reveal|show|print|repeat)\s+(?:me\s+)?(?:your|the)\s+system\s+prompt",
        r"(?i)\b(?:DAN|developer)\s+mode\b",
        r"(?i)\bnew\s+instructions?\s*:",
        r"<\|im_(?:start|end)\|>",
        r"\[/?INST\]",
    ])
});

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| build(r"(?is)<(script|style)\b[^>]*>.*?</(?:script|style)\s*>"));
static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| build(r"(?s)<[^>]*>"));
static URL: LazyLock<Regex> = LazyLock::new(|| build(r"(?i)\b(?:https?://|www\.)[^\s<>]+"));

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| build(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    build(r"(?:\+?\d{1,3}[\s.-])?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
});
static GOVERNMENT_ID: LazyLock<Regex> = LazyLock::new(|| build(r"\b\d{3}-\d{2}-\d{4}\b"));
static PAYMENT_CARD: LazyLock<Regex> = LazyLock::new(|| build(r"\b(?:\d[ -]?){12,18}\d\b"));
static NAME_PAIR: LazyLock<Regex> = LazyLock::new(|| build(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b"));

fn build(pattern: &str) -> Regex {
    // Patterns are literals in this file; a failure here is a programming error.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| build(p)).collect()
}

/// Input accepted by the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedInput {
    /// Sanitized, redacted text safe to send to the completion service
    pub text: String,

    /// Whether name pairs were redacted
    pub names_redacted: bool,
}

/// Reasons the gate refuses an input
#[derive(Debug, Clone, Error)]
pub enum GateRejection {
    #[error("Crisis language detected")]
    CrisisDetected {
        message: String,
        resources: Vec<CrisisResource>,
    },

    #[error("Input validation failed: {message}")]
    Validation { message: String },
}

impl GateRejection {
    fn validation(message: &str) -> Self {
        GateRejection::Validation {
            message: message.to_string(),
        }
    }

    pub fn is_crisis(&self) -> bool {
        matches!(self, GateRejection::CrisisDetected { .. })
    }
}

/// Flat report of a gate decision (as exposed to callers and the CLI)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_crisis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CrisisBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_input: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrisisBundle {
    pub message: String,
    pub resources: Vec<CrisisResource>,
}

impl From<&Result<ProcessedInput, GateRejection>> for GateReport {
    fn from(result: &Result<ProcessedInput, GateRejection>) -> Self {
        match result {
            Ok(processed) => GateReport {
                is_valid: true,
                is_crisis: None,
                response: None,
                error: None,
                processed_input: Some(processed.text.clone()),
            },
            Err(GateRejection::CrisisDetected { message, resources }) => GateReport {
                is_valid: false,
                is_crisis: Some(true),
                response: Some(CrisisBundle {
                    message: message.clone(),
                    resources: resources.clone(),
                }),
                error: None,
                processed_input: None,
            },
            Err(GateRejection::Validation { message }) => GateReport {
                is_valid: false,
                is_crisis: Some(false),
                response: None,
                error: Some(message.clone()),
                processed_input: None,
            },
        }
    }
}

/// Safety gate configuration
#[derive(Debug, Clone)]
pub struct SafetyGate {
    max_input_chars: usize,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(MAX_INPUT_CHARS)
    }
}

impl SafetyGate {
    pub fn new(max_input_chars: usize) -> Self {
        Self { max_input_chars }
    }

    /// Classify and clean raw input.
    ///
    /// Crisis detection runs first and short-circuits: crisis text is never
    /// sanitized, redacted, or forwarded.
    pub fn validate(
        &self,
        raw_input: &str,
        storage_opt_in: bool,
        redact_names: bool,
    ) -> Result<ProcessedInput, GateRejection> {
        if detect_crisis(raw_input) {
            return Err(GateRejection::CrisisDetected {
                message: CRISIS_MESSAGE.to_string(),
                resources: crisis_resources(),
            });
        }

        if detect_injection(raw_input) {
            return Err(GateRejection::validation(GENERIC_INVALID_MESSAGE));
        }

        let sanitized = sanitize(raw_input, self.max_input_chars);
        if sanitized.is_empty() {
            return Err(GateRejection::validation(EMPTY_INPUT_MESSAGE));
        }

        let names = should_redact_names(storage_opt_in, redact_names);
        Ok(ProcessedInput {
            text: redact_pii(&sanitized, names),
            names_redacted: names,
        })
    }
}

/// Case-insensitive keyword match or first-person risk pattern match
pub fn detect_crisis(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CRISIS_KEYWORDS.iter().any(|k| lowered.contains(k))
        || CRISIS_PATTERNS.iter().any(|p| p.is_match(text))
}

pub fn detect_injection(text: &str) -> bool {
    INJECTION_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Strip markup and scripts, mask URLs and injection phrases, trim and cap length.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let text = remove_invisible_and_control(text);
    let text = SCRIPT_BLOCK.replace_all(&text, " ");
    let text = MARKUP_TAG.replace_all(&text, " ");
    let text = URL.replace_all(&text, URL_PLACEHOLDER);

    let mut text = text.into_owned();
    for pattern in INJECTION_PATTERNS.iter() {
        text = pattern.replace_all(&text, FILTERED_PLACEHOLDER).into_owned();
    }

    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Name redaction is skipped only with storage consent AND an explicit opt-out.
pub fn should_redact_names(storage_opt_in: bool, redact_names: bool) -> bool {
    !(storage_opt_in && !redact_names)
}

/// Ordered PII substitution: email, phone, government id, payment card, then names.
pub fn redact_pii(text: &str, redact_names: bool) -> String {
    let text = EMAIL.replace_all(text, "[EMAIL]");
    let text = PHONE.replace_all(&text, "[PHONE]");
    let text = GOVERNMENT_ID.replace_all(&text, "[ID]");
    let text = PAYMENT_CARD.replace_all(&text, "[CARD]");

    if redact_names {
        NAME_PAIR.replace_all(&text, "[NAME]").into_owned()
    } else {
        text.into_owned()
    }
}

/// Fixed crisis support bundle
pub fn crisis_resources() -> Vec<CrisisResource> {
    let resource = |name: &str, contact: &str, description: &str| CrisisResource {
        name: name.to_string(),
        contact: contact.to_string(),
        description: description.to_string(),
    };

    vec![
        resource(
            "988 Suicide & Crisis Lifeline",
            "Call or text 988",
            "Free, confidential support 24/7 (US)",
        ),
        resource(
            "Crisis Text Line",
            "Text HOME to 741741",
            "Text with a trained crisis counselor 24/7",
        ),
        resource(
            "Samaritans",
            "Call 116 123",
            "Round-the-clock listening support (UK & Ireland)",
        ),
        resource(
            "International Association for Suicide Prevention",
            "https://www.iasp.info/resources/Crisis_Centres/",
            "Directory of crisis centres worldwide",
        ),
        resource(
            "Emergency services",
            "911 / 112 / 999",
            "If you are in immediate danger, call your local emergency number",
        ),
    ]
}

fn remove_invisible_and_control(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            )
        })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
