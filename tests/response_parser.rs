//! Response Parser Integration Tests
//!
//! Tolerant JSON recovery from completion text and the single repair retry.

mod common;

use common::{ScriptedService, Stage};
use loopwise::core::{parse_response, parse_with_repair};
use serde_json::json;

#[test]
fn test_prose_wrapped_object() {
    let text = "Sure! Here's what I found: {\"trigger\": \"the email\", \"mechanisms\": [\"rumination\"]} Let me know {if} you need more.";
    let value = parse_response(text).unwrap();
    assert_eq!(value["trigger"], "the email");
}

#[test]
fn test_braces_inside_strings_do_not_confuse_extraction() {
    let text = r#"Result: {"hiddenLogic": "if {x} then } y", "fear": "a \"quoted\" fear"} trailing"#;
    let value = parse_response(text).unwrap();
    assert_eq!(value["hiddenLogic"], "if {x} then } y");
    assert_eq!(value["fear"], "a \"quoted\" fear");
}

#[test]
fn test_first_parseable_fence_wins() {
    let text = "```\nnot json\n```\nthen\n```json\n{\"ok\": true}\n```";
    assert_eq!(parse_response(text).unwrap(), json!({"ok": true}));
}

#[test]
fn test_bare_array_of_questions() {
    let text = "Questions:\n[\"What happened?\", \"Who was there?\"]";
    assert_eq!(
        parse_response(text).unwrap(),
        json!(["What happened?", "Who was there?"])
    );
}

#[test]
fn test_plain_prose_fails() {
    let err = parse_response("I'd rather not answer in JSON.").unwrap_err();
    assert!(err.to_string().contains("Failed to parse completion as JSON"));
}

#[tokio::test]
async fn test_valid_text_skips_repair() {
    let service = ScriptedService::new();

    let value = parse_with_repair(&service, "gpt-4o-mini", 100, "{}", "{\"a\": 1}").await;

    assert_eq!(value, Some(json!({"a": 1})));
    assert_eq!(service.calls_for(Stage::Repair), 0);
}

#[tokio::test]
async fn test_repair_output_goes_back_through_parser() {
    let service = ScriptedService::new().reply(Stage::Repair, "```json\n{\"fixed\": true}\n```");

    let value = parse_with_repair(&service, "gpt-4o-mini", 100, "{\"fixed\": bool}", "fixed = yes").await;

    assert_eq!(value, Some(json!({"fixed": true})));
    assert_eq!(service.calls_for(Stage::Repair), 1);
}

#[tokio::test]
async fn test_failed_repair_yields_none() {
    let service = ScriptedService::new().fail(Stage::Repair, "rate limited");

    let value = parse_with_repair(&service, "gpt-4o-mini", 100, "{}", "nope").await;

    assert!(value.is_none());
    assert_eq!(service.calls_for(Stage::Repair), 1);
}
