//! Normalize, validate and repair stage outputs.
//!
//! Each stage type declares one field table. The same table drives all three
//! phases:
//! - normalize: coerce any JSON value into a `Record` of canonical shapes (never fails)
//! - validate: check the record against strict bounds (reports, never fatal)
//! - repair: keep whatever meets the loose bound, otherwise substitute the
//!   field's placeholder or sentinel (always yields a valid record)

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::domain::{MicroTest, NarrativeLoop, SpiessMap, Summary, ToolAction, NEEDS, PROTOCOLS};

/// Canonical shape of one field after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shaped {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty string; `max_chars: None` means no character cap
    Text { max_chars: Option<usize> },

    /// Sequence of non-empty strings
    List {
        min: usize,
        max: usize,
        item_max_chars: usize,
    },

    /// Sequence drawn from a lower-case vocabulary
    EnumList {
        allowed: &'static [&'static str],
        min: usize,
        max: usize,
    },

    /// One literal out of a fixed set, matched case-insensitively
    Choice { allowed: &'static [&'static str] },
}

/// What repair substitutes when a field fails its loose bound
#[derive(Debug, Clone, Copy)]
pub enum Fallback {
    /// Clearly labeled hypothesis text
    Placeholder(&'static str),

    /// Fixed default value(s)
    Sentinel(&'static [&'static str]),
}

impl Fallback {
    fn as_text(&self) -> String {
        match self {
            Fallback::Placeholder(text) => (*text).to_string(),
            Fallback::Sentinel(values) => values.first().copied().unwrap_or_default().to_string(),
        }
    }

    fn as_list(&self) -> Vec<String> {
        match self {
            Fallback::Placeholder(text) => vec![(*text).to_string()],
            Fallback::Sentinel(values) => values.iter().map(|v| (*v).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Dotted path into the JSON document (`microTest.description`)
    pub path: &'static str,
    pub kind: FieldKind,
    pub fallback: Fallback,
}

const fn text(path: &'static str, max_chars: usize, placeholder: &'static str) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::Text {
            max_chars: Some(max_chars),
        },
        fallback: Fallback::Placeholder(placeholder),
    }
}

const fn list(
    path: &'static str,
    max: usize,
    item_max_chars: usize,
    placeholder: &'static str,
) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::List {
            min: 1,
            max,
            item_max_chars,
        },
        fallback: Fallback::Placeholder(placeholder),
    }
}

/// A normalized document: field path -> canonical shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<&'static str, Shaped>);

impl Record {
    pub fn get(&self, path: &str) -> Option<&Shaped> {
        self.0.get(path)
    }

    pub fn text(&self, path: &str) -> String {
        match self.0.get(path) {
            Some(Shaped::Text(text)) => text.clone(),
            _ => String::new(),
        }
    }

    pub fn list(&self, path: &str) -> Vec<String> {
        match self.0.get(path) {
            Some(Shaped::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn insert(&mut self, path: &'static str, shaped: Shaped) {
        self.0.insert(path, shaped);
    }
}

/// One strict-schema failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("{field}: required value missing")]
    Missing { field: &'static str },

    #[error("{field}: {actual} characters exceeds {max}")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{field}: {actual} items outside {min}..={max}")]
    Count {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("{field}: '{value}' is not an allowed value")]
    NotAllowed { field: &'static str, value: String },
}

fn lookup<'a>(value: &'a Value, path: &str) -> &'a Value {
    path.split('.').fold(value, |current, key| match current {
        Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
        _ => &Value::Null,
    })
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn coerce_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn canonical_choice(raw: String, allowed: &[&str]) -> String {
    allowed
        .iter()
        .find(|a| a.eq_ignore_ascii_case(&raw))
        .map(|a| (*a).to_string())
        .unwrap_or(raw)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    cut.trim_end().to_string()
}

/// Shape every field of `fields` out of an arbitrary JSON value.
pub fn normalize(value: &Value, fields: &[FieldSpec]) -> Record {
    let mut record = Record::default();

    for field in fields {
        let raw = lookup(value, field.path);
        let shaped = match field.kind {
            FieldKind::Text { .. } => Shaped::Text(coerce_text(raw)),
            FieldKind::Choice { allowed } => Shaped::Text(canonical_choice(coerce_text(raw), allowed)),
            FieldKind::List { .. } => Shaped::List(coerce_list(raw)),
            FieldKind::EnumList { .. } => Shaped::List(
                coerce_list(raw)
                    .into_iter()
                    .map(|s| s.to_lowercase())
                    .collect(),
            ),
        };
        record.insert(field.path, shaped);
    }

    record
}

/// Check a normalized record against the strict bounds.
pub fn validate(record: &Record, fields: &[FieldSpec]) -> Result<(), Vec<SchemaViolation>> {
    let mut violations = Vec::new();

    for field in fields {
        let name = field.path;
        match field.kind {
            FieldKind::Text { max_chars } => {
                let value = record.text(name);
                let actual = value.chars().count();
                if actual == 0 {
                    violations.push(SchemaViolation::Missing { field: name });
                } else if let Some(max) = max_chars.filter(|max| actual > *max) {
                    violations.push(SchemaViolation::TooLong {
                        field: name,
                        max,
                        actual,
                    });
                }
            }
            FieldKind::Choice { allowed } => {
                let value = record.text(name);
                if value.is_empty() {
                    violations.push(SchemaViolation::Missing { field: name });
                } else if !allowed.contains(&value.as_str()) {
                    violations.push(SchemaViolation::NotAllowed { field: name, value });
                }
            }
            FieldKind::List {
                min,
                max,
                item_max_chars,
            } => {
                let items = record.list(name);
                check_count(&mut violations, name, min, max, items.len());
                for item in &items {
                    let actual = item.chars().count();
                    if actual > item_max_chars {
                        violations.push(SchemaViolation::TooLong {
                            field: name,
                            max: item_max_chars,
                            actual,
                        });
                    }
                }
            }
            FieldKind::EnumList { allowed, min, max } => {
                let items = record.list(name);
                check_count(&mut violations, name, min, max, items.len());
                for item in items {
                    if !allowed.contains(&item.as_str()) {
                        violations.push(SchemaViolation::NotAllowed {
                            field: name,
                            value: item,
                        });
                    }
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_count(
    violations: &mut Vec<SchemaViolation>,
    field: &'static str,
    min: usize,
    max: usize,
    actual: usize,
) {
    if actual < min || actual > max {
        violations.push(SchemaViolation::Count {
            field,
            min,
            max,
            actual,
        });
    }
}

/// Deterministic repair. The result always passes `validate`.
pub fn repair(record: &Record, fields: &[FieldSpec]) -> Record {
    let mut repaired = Record::default();

    for field in fields {
        let name = field.path;
        let shaped = match field.kind {
            FieldKind::Text { max_chars } => {
                let value = record.text(name);
                if value.is_empty() {
                    Shaped::Text(field.fallback.as_text())
                } else {
                    Shaped::Text(match max_chars {
                        Some(max) => truncate_chars(&value, max),
                        None => value,
                    })
                }
            }
            FieldKind::Choice { allowed } => {
                let value = record.text(name);
                if allowed.contains(&value.as_str()) {
                    Shaped::Text(value)
                } else {
                    Shaped::Text(field.fallback.as_text())
                }
            }
            FieldKind::List {
                max,
                item_max_chars,
                ..
            } => {
                let items: Vec<String> = record
                    .list(name)
                    .iter()
                    .map(|item| truncate_chars(item, item_max_chars))
                    .filter(|item| !item.is_empty())
                    .take(max)
                    .collect();
                if items.is_empty() {
                    Shaped::List(field.fallback.as_list())
                } else {
                    Shaped::List(items)
                }
            }
            FieldKind::EnumList { allowed, max, .. } => {
                // Filter against the allow-list before truncating to max.
                let mut items: Vec<String> = Vec::new();
                for item in record.list(name) {
                    if allowed.contains(&item.as_str()) && !items.contains(&item) {
                        items.push(item);
                    }
                }
                items.truncate(max);
                if items.is_empty() {
                    Shaped::List(field.fallback.as_list())
                } else {
                    Shaped::List(items)
                }
            }
        };
        repaired.insert(name, shaped);
    }

    repaired
}

/// Cap text at `max_words` whitespace-separated words.
///
/// Text within the cap is returned unchanged.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    words[..max_words].join(" ")
}

/// A stage output type with a field table
pub trait StageSchema: Sized {
    /// Stage name used in logs
    const NAME: &'static str;

    /// The field table driving normalize/validate/repair
    const FIELDS: &'static [FieldSpec];

    /// Instruction describing the expected JSON document (used by repair prompts)
    const INSTRUCTION: &'static str;

    fn from_record(record: &Record) -> Self;

    /// Normalize any JSON value into this shape (no validation)
    fn normalize(value: &Value) -> Self {
        Self::from_record(&normalize(value, Self::FIELDS))
    }
}

/// Result of running a value through the full schema cycle
#[derive(Debug, Clone)]
pub struct Conformed<S> {
    pub value: S,

    /// Violations found before repair (empty when the value was already valid)
    pub violations: Vec<SchemaViolation>,
}

impl<S> Conformed<S> {
    pub fn was_repaired(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// normalize -> validate -> (repair on failure)
pub fn conform<S: StageSchema>(value: &Value) -> Conformed<S> {
    let record = normalize(value, S::FIELDS);

    match validate(&record, S::FIELDS) {
        Ok(()) => Conformed {
            value: S::from_record(&record),
            violations: Vec::new(),
        },
        Err(violations) => {
            tracing::warn!(
                stage = S::NAME,
                violations = violations.len(),
                "Stage output failed validation, repairing"
            );
            Conformed {
                value: S::from_record(&repair(&record, S::FIELDS)),
                violations,
            }
        }
    }
}

/// Stage default used when no JSON could be recovered at all
pub fn stage_default<S: StageSchema>() -> S {
    conform::<S>(&Value::Null).value
}

// ============================================================================
// Field tables
// ============================================================================

const NARRATIVE_FIELDS: &[FieldSpec] = &[
    text("trigger", 1000, "Hypothesis: Trigger not clearly identified"),
    text("fear", 1000, "Hypothesis: Underlying fear not clearly identified"),
    text("emotion", 1000, "Hypothesis: Emotion not clearly identified"),
    text("outcome", 1000, "Hypothesis: Outcome not clearly identified"),
    text(
        "whyItFeelsReal",
        1000,
        "Hypothesis: It feels real because it echoes earlier experiences",
    ),
    text("hiddenLogic", 1000, "Hypothesis: Hidden logic not clearly identified"),
    list(
        "breakingActions",
        5,
        500,
        "Hypothesis: Pause and name the pattern when it starts",
    ),
    list("mechanisms", 10, 200, "Hypothesis: Mechanism not clearly identified"),
];

impl StageSchema for NarrativeLoop {
    const NAME: &'static str = "narrative_loop";
    const FIELDS: &'static [FieldSpec] = NARRATIVE_FIELDS;
    const INSTRUCTION: &'static str = r#"{"trigger": string, "fear": string, "emotion": string, "outcome": string, "whyItFeelsReal": string, "hiddenLogic": string, "breakingActions": [string, 1-5 items], "mechanisms": [string, 1-10 items]}"#;

    fn from_record(record: &Record) -> Self {
        Self {
            trigger: record.text("trigger"),
            fear: record.text("fear"),
            emotion: record.text("emotion"),
            outcome: record.text("outcome"),
            why_it_feels_real: record.text("whyItFeelsReal"),
            hidden_logic: record.text("hiddenLogic"),
            breaking_actions: record.list("breakingActions"),
            mechanisms: record.list("mechanisms"),
        }
    }
}

const STOP_STEPS: &[&str] = &[
    "Stop what you are doing",
    "Take a slow breath",
    "Observe what you feel and think",
    "Proceed with one deliberate action",
];

const SPIESS_FIELDS: &[FieldSpec] = &[
    list("sensations", 5, 200, "Hypothesis: Body sensations not clearly identified"),
    list("emotions", 5, 200, "Hypothesis: Emotions not clearly identified"),
    FieldSpec {
        path: "needs",
        kind: FieldKind::EnumList {
            allowed: &NEEDS,
            min: 1,
            max: 3,
        },
        fallback: Fallback::Sentinel(&["safety"]),
    },
    text(
        "confirmationBias",
        1000,
        "Hypothesis: Confirmation bias not clearly identified",
    ),
    text(
        "microTest.description",
        500,
        "Hypothesis: Try one small action that tests the fear",
    ),
    FieldSpec {
        path: "microTest.timeframe",
        kind: FieldKind::Text {
            max_chars: Some(100),
        },
        fallback: Fallback::Sentinel(&["Within the next 48 hours"]),
    },
    text(
        "microTest.successCriteria",
        300,
        "Hypothesis: Compare what actually happened with what you feared",
    ),
    FieldSpec {
        path: "toolAction.protocol",
        kind: FieldKind::Choice {
            allowed: &PROTOCOLS,
        },
        fallback: Fallback::Sentinel(&["STOP"]),
    },
    FieldSpec {
        path: "toolAction.steps",
        kind: FieldKind::List {
            min: 1,
            max: 5,
            item_max_chars: 300,
        },
        fallback: Fallback::Sentinel(STOP_STEPS),
    },
    text("toolAction.example", 500, "Hypothesis: Example not provided"),
];

impl StageSchema for SpiessMap {
    const NAME: &'static str = "spiess_map";
    const FIELDS: &'static [FieldSpec] = SPIESS_FIELDS;
    const INSTRUCTION: &'static str = r#"{"sensations": [string, 1-5], "emotions": [string, 1-5], "needs": [1-3 of safety|connection|autonomy|competence|respect|recognition|belonging|security|control|rest|understanding|fairness], "confirmationBias": string, "microTest": {"description": string, "timeframe": string, "successCriteria": string}, "toolAction": {"protocol": "STOP" | "Values First" | "Bridge Belief", "steps": [string, 1-5], "example": string}}"#;

    fn from_record(record: &Record) -> Self {
        Self {
            sensations: record.list("sensations"),
            emotions: record.list("emotions"),
            needs: record.list("needs"),
            confirmation_bias: record.text("confirmationBias"),
            micro_test: MicroTest {
                description: record.text("microTest.description"),
                timeframe: record.text("microTest.timeframe"),
                success_criteria: record.text("microTest.successCriteria"),
            },
            tool_action: ToolAction {
                protocol: record.text("toolAction.protocol"),
                steps: record.list("toolAction.steps"),
                example: record.text("toolAction.example"),
            },
        }
    }
}

const SUMMARY_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        path: "content",
        kind: FieldKind::Text { max_chars: None },
        fallback: Fallback::Placeholder("Hypothesis: Summary not available"),
    },
    list("mechanisms", 5, 100, "Hypothesis: Mechanism not clearly identified"),
    text("nextStep", 200, "Hypothesis: Start with the suggested micro test"),
];

impl StageSchema for Summary {
    const NAME: &'static str = "summary";
    const FIELDS: &'static [FieldSpec] = SUMMARY_FIELDS;
    const INSTRUCTION: &'static str =
        r#"{"content": string (max 250 words), "mechanisms": [string, 1-5], "nextStep": string}"#;

    fn from_record(record: &Record) -> Self {
        Self {
            content: record.text("content"),
            mechanisms: record.list("mechanisms"),
            next_step: record.text("nextStep"),
        }
    }
}
