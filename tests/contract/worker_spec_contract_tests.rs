//! Contract tests for the start-up spec handed to worker processes.

use serde_json::json;

use session_annotator::config::GlobalConfig;
use session_annotator::jobs::registry::JobSummary;
use session_annotator::models::action::Action;
use session_annotator::models::job::{Credential, JobRequest, JobSource, WorkerSpec};

fn config(dir: &tempfile::TempDir) -> GlobalConfig {
    let raw = format!("scratch_root = {:?}\n", dir.path().join("scratch"));
    GlobalConfig::from_toml_str(&raw).unwrap()
}

#[test]
fn remote_spec_round_trips_with_its_credential() {
    let dir = tempfile::tempdir().unwrap();
    let spec = WorkerSpec {
        job_id: "j1".into(),
        request: JobRequest {
            action: Action::ReorderColumns,
            language: "German".into(),
            instruction: Some("keep it short".into()),
            model: None,
        },
        source: JobSource::Remote {
            folder: "fieldwork".into(),
            credential: Credential::new("token-123"),
        },
        workspace: dir.path().join("scratch/j1"),
        config: config(&dir),
    };

    let value = serde_json::to_value(&spec).unwrap();
    assert_eq!(value["request"]["action"], "reorder_columns");
    assert_eq!(
        value["source"],
        json!({ "kind": "remote", "folder": "fieldwork", "credential": "token-123" })
    );

    let back: WorkerSpec = serde_json::from_value(value).unwrap();
    assert_eq!(back.request, spec.request);
    assert_eq!(back.source, spec.source);
    assert_eq!(back.config, spec.config);
}

#[test]
fn archive_source_shape() {
    let source = JobSource::Archive {
        archive: "/scratch/j1/upload.zip".into(),
    };
    assert_eq!(
        serde_json::to_value(&source).unwrap(),
        json!({ "kind": "archive", "archive": "/scratch/j1/upload.zip" })
    );
    assert!(source.credential().is_none());
}

#[test]
fn request_optional_fields_default_to_none() {
    let request: JobRequest =
        serde_json::from_str(r#"{"action":"gloss","language":"de"}"#).unwrap();
    assert_eq!(request.action, Action::Gloss);
    assert_eq!(request.instruction, None);
    assert_eq!(request.model, None);
}

#[test]
fn job_summary_field_names() {
    let summary = JobSummary {
        job_id: "j1".into(),
        action: Some(Action::Transcribe),
        created_at: chrono::Utc::now(),
        running: true,
        cancelled: false,
        has_result: false,
    };
    let value = serde_json::to_value(&summary).unwrap();
    for key in ["job_id", "action", "created_at", "running", "cancelled", "has_result"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["action"], "transcribe");
}
