//! Contract tests for the worker stdout wire format.
//!
//! One JSON object per line, tagged by `kind`. The server-side reader and
//! any external consumer depend on these exact shapes.

use serde_json::json;

use session_annotator::jobs::control::to_line;
use session_annotator::models::progress::ProgressMessage;

#[test]
fn status_and_error_carry_text() {
    assert_eq!(
        serde_json::to_value(ProgressMessage::status("processing session S01")).unwrap(),
        json!({ "kind": "status", "text": "processing session S01" })
    );
    assert_eq!(
        serde_json::to_value(ProgressMessage::error("boom")).unwrap(),
        json!({ "kind": "error", "text": "boom" })
    );
}

#[test]
fn result_location_carries_path() {
    let message = ProgressMessage::ResultLocation {
        path: "/scratch/j1/result.zip".into(),
    };
    assert_eq!(
        serde_json::to_value(message).unwrap(),
        json!({ "kind": "result_location", "path": "/scratch/j1/result.zip" })
    );
}

#[test]
fn unit_variants_are_bare_tags() {
    assert_eq!(
        serde_json::to_value(ProgressMessage::Cancelled).unwrap(),
        json!({ "kind": "cancelled" })
    );
    assert_eq!(
        serde_json::to_value(ProgressMessage::Done).unwrap(),
        json!({ "kind": "done" })
    );
}

#[test]
fn each_message_is_exactly_one_line() {
    let line = to_line(&ProgressMessage::error("multi\nline detail")).unwrap();
    assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    assert_eq!(line.last(), Some(&b'\n'));

    let parsed: ProgressMessage = serde_json::from_slice(&line).unwrap();
    assert_eq!(parsed, ProgressMessage::error("multi\nline detail"));
}

#[test]
fn unknown_kind_is_rejected() {
    assert!(serde_json::from_str::<ProgressMessage>(r#"{"kind":"heartbeat"}"#).is_err());
}
