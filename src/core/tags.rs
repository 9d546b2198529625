//! Keyword-based pattern tagging.
//!
//! Pure and synchronous: runs over the textual form of the built narrative
//! loop and SPIESS map, no model call involved.

use std::collections::BTreeSet;

use crate::domain::{NarrativeLoop, SpiessMap, Tag};

/// Keyword groups; two groups feed `FearOfRejection`.
const TAG_GROUPS: &[(Tag, &[&str])] = &[
    (
        Tag::Perfectionism,
        &["perfectionism", "perfectionist", "perfect", "flawless", "mistake", "high standards"],
    ),
    (
        Tag::FearOfRejection,
        &["rejection", "rejected", "criticism", "criticized", "criticised", "disapproval", "judged"],
    ),
    (
        Tag::FearOfRejection,
        &["fired", "abandon", "left out", "excluded", "unwanted"],
    ),
    (
        Tag::Catastrophizing,
        &["catastroph", "worst case", "worst-case", "disaster", "ruined", "spiral"],
    ),
    (
        Tag::PeoplePleasing,
        &["people pleas", "people-pleas", "please everyone", "can't say no", "seeking approval"],
    ),
    (
        Tag::ImposterSyndrome,
        &["imposter", "impostor", "fraud", "found out", "don't belong"],
    ),
    (
        Tag::Control,
        &["control", "uncertain", "uncertainty", "unpredictable"],
    ),
    (
        Tag::SelfWorth,
        &["worthless", "not good enough", "inadequate", "unlovable", "a failure"],
    ),
];

/// Tags whose keywords occur in `text` (case-insensitive substring match)
pub fn detect_tags(text: &str) -> BTreeSet<Tag> {
    let lowered = text.to_lowercase();

    TAG_GROUPS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Flatten both structures into one searchable string.
///
/// `needs` are enumeration literals, not narrative text, and stay out so the
/// `control` need does not imply the `control` tag.
pub fn textual_form(narrative: &NarrativeLoop, map: &SpiessMap) -> String {
    let mut parts: Vec<&str> = vec![
        narrative.trigger.as_str(),
        narrative.fear.as_str(),
        narrative.emotion.as_str(),
        narrative.outcome.as_str(),
        narrative.why_it_feels_real.as_str(),
        narrative.hidden_logic.as_str(),
        map.confirmation_bias.as_str(),
        map.micro_test.description.as_str(),
        map.micro_test.timeframe.as_str(),
        map.micro_test.success_criteria.as_str(),
        map.tool_action.protocol.as_str(),
        map.tool_action.example.as_str(),
    ];
    parts.extend(narrative.breaking_actions.iter().map(String::as_str));
    parts.extend(narrative.mechanisms.iter().map(String::as_str));
    parts.extend(map.sensations.iter().map(String::as_str));
    parts.extend(map.emotions.iter().map(String::as_str));
    parts.extend(map.tool_action.steps.iter().map(String::as_str));

    parts.join(" ")
}

pub fn tag_analysis(narrative: &NarrativeLoop, map: &SpiessMap) -> BTreeSet<Tag> {
    detect_tags(&textual_form(narrative, map))
}
