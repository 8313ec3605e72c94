//! Integration tests for archive jobs run in-process through the orchestrator.
//!
//! Model backends are replaced with [`FakeModel`], so every test runs the
//! real unpack, dispatch, ledger and repack code without external programs.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use session_annotator::models::action::Action;
use session_annotator::models::progress::{self, ProgressHandle, ProgressMessage};
use session_annotator::worker::archive::RESULT_ARCHIVE;
use session_annotator::worker::entry::build_orchestrator_with;
use session_annotator::worker::orchestrator::RunOutcome;

use super::test_helpers::{
    archive_spec, done_count, drain, fake_backends, has_error, has_status, session_bundle,
    test_config, write_zip, FakeModel, LEDGER_CSV,
};

/// Run an archive job over `archive` and return its outcome and messages.
async fn run_archive_job(
    root: &Path,
    archive: &Path,
    action: Action,
    language: &str,
    cancel: CancellationToken,
) -> (RunOutcome, Vec<ProgressMessage>) {
    let config = test_config(root);
    let workspace = root.join("workspace");
    fs::create_dir_all(&workspace).expect("workspace");

    let mut spec = archive_spec(&config, &workspace, archive.to_path_buf(), action);
    spec.request.language = language.into();

    let (tx, mut rx) = progress::channel();
    let model = Arc::new(FakeModel::default());
    let orchestrator = build_orchestrator_with(
        spec,
        ProgressHandle::new(tx),
        cancel,
        |_| fake_backends(&model),
        None,
    )
    .expect("orchestrator");

    let outcome = orchestrator.run().await;
    (outcome, drain(&mut rx))
}

fn read_entry(zip_path: &Path, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(zip_path).expect("open result")).expect("zip");
    let mut text = String::new();
    archive
        .by_name(name)
        .expect("entry present")
        .read_to_string(&mut text)
        .expect("read entry");
    text
}

// ── happy path ───────────────────────────────────────────────

#[tokio::test]
async fn transcription_job_packs_annotated_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    fs::write(&upload, session_bundle(dir.path())).expect("write upload");

    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::Transcribe,
        "German",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, RunOutcome::Completed { succeeded: 1, failed: 0 });
    assert_eq!(messages.first(), Some(&ProgressMessage::status("unpacking upload.zip")));
    assert!(has_status(&messages, "processing session S01"));
    assert!(has_status(&messages, "finished session S01"));

    let result = dir.path().join("workspace").join(RESULT_ARCHIVE);
    let tail = &messages[messages.len() - 2..];
    assert_eq!(
        tail,
        [
            ProgressMessage::ResultLocation {
                path: result.clone()
            },
            ProgressMessage::Done,
        ]
    );
    assert_eq!(done_count(&messages), 1);

    let ledger = read_entry(&result, "S01/ledger.csv");
    assert!(ledger.contains("2: text-of-S01_direct "), "{ledger}");
    assert!(
        ledger.contains("1: text-of-S01_blockNr_1_taskNr_1_trialNr_2 - "),
        "{ledger}"
    );
    assert!(ledger.contains("missing_filename_1"), "{ledger}");

    let log = read_entry(&result, "S01/annotation.log");
    assert!(log.contains("[transcribe] INFO"), "{log}");
}

#[tokio::test]
async fn failed_session_is_reported_and_the_job_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    write_zip(
        &upload,
        &[
            ("S00/ledger.csv", &b"Block_Nr\n\xff\xfe\n"[..]),
            ("S01/ledger.csv", LEDGER_CSV.as_bytes()),
        ],
    );

    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::ReorderColumns,
        "German",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, RunOutcome::Completed { succeeded: 1, failed: 1 });
    assert!(has_error(&messages, "session S00 failed"));
    assert!(!has_status(&messages, "finished session S00"));
    assert!(has_status(&messages, "finished session S01"));
    assert!(messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::ResultLocation { .. })));
    assert_eq!(messages.last(), Some(&ProgressMessage::Done));
}

// ── edge cases ───────────────────────────────────────────────

#[tokio::test]
async fn archive_without_sessions_finishes_without_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    write_zip(&upload, &[("readme.txt", &b"nothing here"[..])]);

    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::ReorderColumns,
        "German",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, RunOutcome::Completed { succeeded: 0, failed: 0 });
    assert!(has_error(&messages, "no session folders"));
    assert!(!messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::ResultLocation { .. })));
    assert_eq!(messages.last(), Some(&ProgressMessage::Done));
    assert_eq!(done_count(&messages), 1);
}

#[tokio::test]
async fn corrupt_archive_aborts_the_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    fs::write(&upload, "not a zip").expect("write upload");

    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::ReorderColumns,
        "German",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, RunOutcome::Failed);
    assert!(has_error(&messages, "job aborted: archive:"));
    assert_eq!(messages.last(), Some(&ProgressMessage::Done));
    assert_eq!(done_count(&messages), 1);
}

#[tokio::test]
async fn unsupported_language_aborts_at_the_first_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    fs::write(&upload, session_bundle(dir.path())).expect("write upload");

    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::Gloss,
        "Klingon",
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, RunOutcome::Failed);
    assert!(has_error(
        &messages,
        "job aborted: config: unsupported language 'Klingon'"
    ));
    assert_eq!(done_count(&messages), 1);
}

#[tokio::test]
async fn cancellation_before_start_processes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload = dir.path().join("upload.zip");
    fs::write(&upload, session_bundle(dir.path())).expect("write upload");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (outcome, messages) = run_archive_job(
        dir.path(),
        &upload,
        Action::Transcribe,
        "German",
        cancel,
    )
    .await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(!has_status(&messages, "processing session"));
    assert_eq!(
        &messages[messages.len() - 2..],
        [ProgressMessage::Cancelled, ProgressMessage::Done]
    );
}
