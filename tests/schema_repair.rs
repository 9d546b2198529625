//! Schema Repair Integration Tests
//!
//! normalize -> validate -> repair over the three stage outputs.

use loopwise::core::schema::{conform, normalize, stage_default, truncate_words, validate, StageSchema};
use loopwise::domain::{NarrativeLoop, SpiessMap, Summary, NEEDS, PROTOCOLS};
use serde_json::{json, Value};

fn assert_valid<S: StageSchema + serde::Serialize>(value: &S) {
    let json = serde_json::to_value(value).unwrap();
    let record = normalize(&json, S::FIELDS);
    assert!(
        validate(&record, S::FIELDS).is_ok(),
        "{} not valid: {:?}",
        S::NAME,
        validate(&record, S::FIELDS)
    );
}

#[test]
fn test_defaults_are_schema_valid() {
    assert_valid(&stage_default::<NarrativeLoop>());
    assert_valid(&stage_default::<SpiessMap>());
    assert_valid(&stage_default::<Summary>());
}

#[test]
fn test_non_object_inputs_conform() {
    for value in [Value::Null, json!(42), json!("text"), json!([1, 2, 3])] {
        let narrative = conform::<NarrativeLoop>(&value);
        assert!(narrative.was_repaired());
        assert_valid(&narrative.value);
    }
}

#[test]
fn test_overlong_fields_are_truncated() {
    let value = json!({
        "trigger": "t".repeat(5000),
        "fear": "f",
        "emotion": "e",
        "outcome": "o",
        "whyItFeelsReal": "w",
        "hiddenLogic": "h",
        "breakingActions": (0..9).map(|i| format!("action {i}")).collect::<Vec<_>>(),
        "mechanisms": ["m"]
    });

    let conformed = conform::<NarrativeLoop>(&value);

    assert!(conformed.was_repaired());
    assert_eq!(conformed.value.trigger.chars().count(), 1000);
    assert_eq!(conformed.value.breaking_actions.len(), 5);
    assert_eq!(conformed.value.breaking_actions[0], "action 0");
    assert_eq!(conformed.value.fear, "f");
}

#[test]
fn test_needs_are_filtered_deduplicated_and_capped() {
    let value = json!({
        "needs": ["Happiness", "SAFETY", "safety", "rest", "control", "fairness"],
        "toolAction": {"protocol": "bridge belief"}
    });

    let map = conform::<SpiessMap>(&value).value;

    assert_eq!(map.needs, vec!["safety", "rest", "control"]);
    assert!(map.needs.iter().all(|n| NEEDS.contains(&n.as_str())));
    assert_eq!(map.tool_action.protocol, "Bridge Belief");
    assert!(PROTOCOLS.contains(&map.tool_action.protocol.as_str()));
}

#[test]
fn test_unknown_protocol_falls_back_to_stop_steps() {
    let map = conform::<SpiessMap>(&json!({"toolAction": {"protocol": "Breathe"}})).value;

    assert_eq!(map.tool_action.protocol, "STOP");
    assert_eq!(map.tool_action.steps.len(), 4);
}

#[test]
fn test_single_string_becomes_one_item_list() {
    let map = SpiessMap::normalize(&json!({"sensations": "tight chest"}));
    assert_eq!(map.sensations, vec!["tight chest"]);
}

#[test]
fn test_normalize_is_idempotent() {
    let messy = json!({
        "content": "  A summary.  ",
        "mechanisms": ["  one ", "", "two"],
        "nextStep": 7
    });

    let once = Summary::normalize(&messy);
    let twice = Summary::normalize(&serde_json::to_value(&once).unwrap());
    assert_eq!(once, twice);

    let messy = json!({
        "trigger": " the review ",
        "fear": null,
        "breakingActions": "ask for feedback",
        "mechanisms": [" rumination", 3, ""]
    });
    let once = NarrativeLoop::normalize(&messy);
    let twice = NarrativeLoop::normalize(&serde_json::to_value(&once).unwrap());
    assert_eq!(once, twice);
    assert_eq!(once.breaking_actions, vec!["ask for feedback"]);
}

#[test]
fn test_valid_output_passes_untouched() {
    let value = json!({
        "content": "You are caught in a loop.",
        "mechanisms": ["Rumination"],
        "nextStep": "Walk for ten minutes"
    });

    let conformed = conform::<Summary>(&value);

    assert!(!conformed.was_repaired());
    assert_eq!(conformed.value.content, "You are caught in a loop.");
}

#[test]
fn test_word_cap_boundary() {
    let exact = vec!["w"; 250].join(" ");
    assert_eq!(truncate_words(&exact, 250), exact);

    let over = vec!["w"; 251].join(" ");
    assert_eq!(truncate_words(&over, 250).split_whitespace().count(), 250);
}
