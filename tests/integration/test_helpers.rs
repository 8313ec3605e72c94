//! Shared fixtures for integration tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use session_annotator::config::GlobalConfig;
use session_annotator::models::action::Action;
use session_annotator::models::job::{JobRequest, JobSource, WorkerSpec};
use session_annotator::models::progress::{ProgressMessage, ProgressReceiver};
use session_annotator::processing::backend::{Backends, ModelInput, ModelRequest, TextModel};
use session_annotator::Result;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Ledger with one pre-registered filename and one row reachable only by key.
pub const LEDGER_CSV: &str = "\
Block_Nr,Task_Nr,Trial_Nr,audio,transcription
1,1,1,S01_direct.wav,
1,1,2,,
";

/// Build a validated config whose scratch root lives in `root`.
pub fn test_config(root: &Path) -> GlobalConfig {
    let raw = format!("scratch_root = {:?}\n", root.join("scratch"));
    GlobalConfig::from_toml_str(&raw).expect("test config")
}

/// Worker executable built for this test run.
pub fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_session-annotator"))
}

/// Write a zip archive with the given `(entry name, contents)` pairs.
pub fn write_zip(dest: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(dest).expect("create zip"));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        zip.write_all(data).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

/// Zip bytes of a one-session bundle with two aligned artifacts.
pub fn session_bundle(dir: &Path) -> Vec<u8> {
    let path = dir.join("bundle.zip");
    write_zip(
        &path,
        &[
            ("S01/ledger.csv", LEDGER_CSV.as_bytes()),
            ("S01/S01_direct.wav", &b"RIFF"[..]),
            ("S01/S01_blockNr_1_taskNr_1_trialNr_2.wav", &b"RIFF"[..]),
        ],
    );
    std::fs::read(&path).expect("read zip")
}

/// Spec for an archive job in `workspace`.
pub fn archive_spec(
    config: &GlobalConfig,
    workspace: &Path,
    archive: PathBuf,
    action: Action,
) -> WorkerSpec {
    WorkerSpec {
        job_id: "job-test".into(),
        request: JobRequest {
            action,
            language: "German".into(),
            instruction: None,
            model: None,
        },
        source: JobSource::Archive { archive },
        workspace: workspace.to_path_buf(),
        config: config.clone(),
    }
}

/// Model that answers `text-of-<stem>` for files and `<text>` for cells.
#[derive(Default)]
pub struct FakeModel {
    pub calls: AtomicUsize,
}

impl TextModel for FakeModel {
    fn run(&self, request: &ModelRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match request.input {
            ModelInput::File(path) => format!(
                "text-of-{}",
                path.file_stem().unwrap_or_default().to_string_lossy()
            ),
            ModelInput::Text(text) => format!("<{text}>"),
        })
    }
}

/// Backends resolving every model action to `model`.
pub fn fake_backends(model: &Arc<FakeModel>) -> Backends {
    let mut backends = Backends::default();
    for action in Action::ALL.into_iter().filter(|a| a.uses_model()) {
        backends = backends.with_model(action, Arc::clone(model) as Arc<dyn TextModel>);
    }
    backends
}

/// Everything currently buffered in `rx`.
pub fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Receive until `[DONE ALL]`, failing the test after `limit`.
pub async fn collect_until_done(rx: &mut ProgressReceiver, limit: Duration) -> Vec<ProgressMessage> {
    let mut messages = Vec::new();
    tokio::time::timeout(limit, async {
        while let Some(message) = rx.recv().await {
            let done = matches!(message, ProgressMessage::Done);
            messages.push(message);
            if done {
                break;
            }
        }
    })
    .await
    .expect("job did not finish in time");
    messages
}

/// Number of terminal sentinels in `messages`.
pub fn done_count(messages: &[ProgressMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::Done))
        .count()
}

/// Whether any status line contains `needle`.
pub fn has_status(messages: &[ProgressMessage], needle: &str) -> bool {
    messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::Status { text } if text.contains(needle)))
}

/// Whether any error line contains `needle`.
pub fn has_error(messages: &[ProgressMessage], needle: &str) -> bool {
    messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::Error { text } if text.contains(needle)))
}
