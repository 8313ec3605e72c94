//! Unit tests for action names.

use session_annotator::models::action::Action;
use session_annotator::AppError;

#[test]
fn canonical_names_parse() {
    for (raw, action) in [
        ("transcribe", Action::Transcribe),
        ("translate", Action::Translate),
        ("gloss", Action::Gloss),
        ("transliterate", Action::Transliterate),
        ("reorder_columns", Action::ReorderColumns),
    ] {
        assert_eq!(raw.parse::<Action>().ok(), Some(action), "{raw}");
    }
}

#[test]
fn unknown_action_is_rejected_with_its_name() {
    let err = "dance".parse::<Action>().expect_err("must fail");
    assert!(matches!(err, AppError::InvalidAction(_)));
    assert_eq!(err.to_string(), "invalid action: unknown action 'dance'");
}

#[test]
fn only_reorder_runs_without_a_model() {
    let modelless: Vec<Action> = Action::ALL
        .into_iter()
        .filter(|action| !action.uses_model())
        .collect();
    assert_eq!(modelless, vec![Action::ReorderColumns]);
}
