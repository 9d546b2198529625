//! Prompt templates for each pipeline stage.
//!
//! Every system prompt opens with a `# <stage>` heading. User content is
//! always the sanitized, redacted narrative wrapped in `<narrative>` tags.

use crate::core::schema::StageSchema;
use crate::domain::{NarrativeLoop, SpiessMap, Summary};

pub const DECISION_HEADING: &str = "# Clarity check";
pub const QUESTIONS_HEADING: &str = "# Clarifying questions";
pub const NARRATIVE_HEADING: &str = "# Narrative loop extraction";
pub const SPIESS_HEADING: &str = "# SPIESS map";
pub const SUMMARY_HEADING: &str = "# Summary";

/// Shape expected back from question generation (also the repair instruction)
pub const QUESTIONS_INSTRUCTION: &str = r#"["question 1", "question 2", "question 3"]"#;

pub fn wrap_narrative(input: &str) -> String {
    format!("<narrative>\n{}\n</narrative>", input)
}

pub fn decision_system() -> String {
    format!(
        "{DECISION_HEADING}\n\
         Read the narrative and decide whether the trigger, the fear, the emotion and the \
         outcome can ALL be identified from it.\n\
         Answer YES if clarifying questions are needed because at least one is missing or unclear.\n\
         Answer NO if all four are identifiable.\n\
         Reply with exactly one word: YES or NO."
    )
}

pub fn questions_system(max_questions: usize) -> String {
    format!(
        "{QUESTIONS_HEADING}\n\
         Write up to {max_questions} short, warm, open questions that would help identify what \
         triggered the situation, what the person feared, what they felt and what happened next.\n\
         Ask only about what is missing. Never give advice.\n\
         Return ONLY a JSON array of strings: {QUESTIONS_INSTRUCTION}"
    )
}

pub fn narrative_system() -> String {
    format!(
        "{NARRATIVE_HEADING}\n\
         Map the narrative onto a causal loop: the trigger, the fear it activated, the emotion, \
         the outcome, why the fear feels real, the hidden logic that keeps the loop running, \
         concrete actions that would break it, and the psychological mechanisms involved.\n\
         Stay close to the person's own words. Mark guesses with 'Hypothesis:'.\n\
         Return ONLY JSON matching: {}",
        NarrativeLoop::INSTRUCTION
    )
}

pub fn spiess_system() -> String {
    format!(
        "{SPIESS_HEADING}\n\
         Using the narrative and its loop, describe body sensations, emotions, up to three core \
         needs, the confirmation bias at work, one micro test (a small time-boxed experiment with \
         success criteria) and one tool action using exactly one protocol: STOP, Values First or \
         Bridge Belief.\n\
         Return ONLY JSON matching: {}",
        SpiessMap::INSTRUCTION
    )
}

pub fn spiess_user(input: &str, narrative: &NarrativeLoop) -> String {
    format!(
        "{}\n<loop>\n{}\n</loop>",
        wrap_narrative(input),
        serde_json::to_string_pretty(narrative).unwrap_or_default()
    )
}

pub fn summary_system(max_words: usize) -> String {
    format!(
        "{SUMMARY_HEADING}\n\
         Write a compassionate summary of at most {max_words} words that connects the loop and \
         the map, list up to five mechanisms in a few words each, and give one concrete next step.\n\
         Return ONLY JSON matching: {}",
        Summary::INSTRUCTION
    )
}

pub fn summary_user(input: &str, narrative: &NarrativeLoop, map: &SpiessMap) -> String {
    format!(
        "{}\n<loop>\n{}\n</loop>\n<map>\n{}\n</map>",
        wrap_narrative(input),
        serde_json::to_string_pretty(narrative).unwrap_or_default(),
        serde_json::to_string_pretty(map).unwrap_or_default()
    )
}
