//! Unit tests for configuration parsing and validation.

use session_annotator::config::{GlobalConfig, Script};
use session_annotator::AppError;

fn with_scratch(dir: &tempfile::TempDir, body: &str) -> String {
    format!("scratch_root = {:?}\n{body}", dir.path().join("scratch"))
}

#[test]
fn minimal_config_gets_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&with_scratch(&dir, "")).expect("valid config");

    assert_eq!(config.http_port, 8000);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.max_concurrent_jobs, 4);
    assert_eq!(config.ledger_pattern, "*.csv");
    assert!(config.artifact_extensions.iter().any(|ext| ext == "wav"));
    assert_eq!(
        config.obligatory_columns,
        ["Block_Nr", "Task_Nr", "Trial_Nr", "transcription"]
    );
    assert!(config.remote.is_none());
    assert!(config.backends.transcribe.is_none());
    assert!(config.scratch_root.is_absolute());
    assert!(config.scratch_root.is_dir());
}

#[test]
fn languages_and_backends_can_be_configured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = with_scratch(
        &dir,
        r#"
http_port = 9100
max_concurrent_jobs = 2

[[languages]]
name = "Georgian"
code = "ka"
script = "native"

[backends.transcribe]
program = "whisper-cli"
args = ["--lang", "{language_code}", "{input}"]
default_model = "large-v3"

[remote]
base_url = "https://files.example.org/api"
"#,
    );

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");
    assert_eq!(config.http_port, 9100);
    assert_eq!(config.languages.len(), 1);

    let backend = config.backends.transcribe.as_ref().expect("backend");
    assert_eq!(backend.program, "whisper-cli");
    assert_eq!(backend.timeout_seconds, 600);
    assert_eq!(
        config.remote.as_ref().map(|r| r.timeout_seconds),
        Some(300)
    );
}

#[test]
fn languages_are_found_by_name_or_code_ignoring_case() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&with_scratch(&dir, "")).expect("valid config");

    assert_eq!(
        config.find_language("georgian").map(|l| l.script),
        Some(Script::Native)
    );
    assert_eq!(
        config.find_language(" DE ").map(|l| l.name.as_str()),
        Some("German")
    );
    assert!(config.find_language("Klingon").is_none());
}

#[test]
fn job_workspace_is_below_scratch_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&with_scratch(&dir, "")).expect("valid config");
    assert_eq!(config.job_workspace("abc"), config.scratch_root.join("abc"));
}

// ── validation ───────────────────────────────────────────────

fn rejects(body: &str) {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::from_toml_str(&with_scratch(&dir, body)).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)), "unexpected error: {err}");
}

#[test]
fn zero_concurrent_jobs_is_rejected() {
    rejects("max_concurrent_jobs = 0");
}

#[test]
fn zero_upload_limit_is_rejected() {
    rejects("max_upload_bytes = 0");
}

#[test]
fn empty_or_duplicate_languages_are_rejected() {
    rejects("languages = []");
    rejects(
        r#"
[[languages]]
name = "German"
code = "de"
script = "latin"

[[languages]]
name = "german"
code = "de2"
script = "latin"
"#,
    );
}

#[test]
fn obligatory_columns_must_keep_the_row_key() {
    rejects(r#"obligatory_columns = ["Block_Nr", "Task_Nr", "transcription"]"#);
}

#[test]
fn invalid_ledger_glob_is_rejected() {
    rejects(r#"ledger_pattern = "[""#);
}

#[test]
fn blank_remote_url_is_rejected() {
    rejects("[remote]\nbase_url = \" \"");
}

#[test]
fn malformed_toml_is_a_config_error() {
    rejects("http_port = \"not a number\"");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml")).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}
