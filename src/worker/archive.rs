//! Strategy for jobs submitted as an uploaded zip bundle.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::info;

use super::packaging::{extract_archive, pack_directory};
use super::WorkerStrategy;
use crate::ledger::discover_sessions;
use crate::models::progress::{ProgressHandle, ProgressMessage};
use crate::{AppError, Result};

/// Directory inside the job workspace the upload is unpacked into.
pub const SESSIONS_DIR: &str = "sessions";

/// File name of the packaged result inside the job workspace.
pub const RESULT_ARCHIVE: &str = "result.zip";

/// Processes every session found in an uploaded archive.
///
/// The archive is unpacked on the first `next_folder` call. After the last
/// session has been processed the whole tree is packed into
/// [`RESULT_ARCHIVE`] and its location is posted.
pub struct ArchiveWorker {
    archive: PathBuf,
    workspace: PathBuf,
    ledger_pattern: String,
    progress: ProgressHandle,
    pending: Option<VecDeque<PathBuf>>,
}

impl ArchiveWorker {
    /// Create a strategy for `archive`, unpacking below `workspace`.
    #[must_use]
    pub fn new(
        archive: PathBuf,
        workspace: PathBuf,
        ledger_pattern: String,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            archive,
            workspace,
            ledger_pattern,
            progress,
            pending: None,
        }
    }

    fn sessions_root(&self) -> PathBuf {
        self.workspace.join(SESSIONS_DIR)
    }

    async fn unpack(&self) -> Result<VecDeque<PathBuf>> {
        let archive = self.archive.clone();
        let root = self.sessions_root();
        let pattern = self.ledger_pattern.clone();
        let sessions = tokio::task::spawn_blocking(move || {
            extract_archive(&archive, &root)?;
            discover_sessions(&root, &pattern)
        })
        .await
        .map_err(|err| AppError::Archive(format!("unpack task failed: {err}")))??;

        info!(count = sessions.len(), "sessions discovered in archive");
        if sessions.is_empty() {
            self.progress.error(format!(
                "no session folders containing '{}' found in the archive",
                self.ledger_pattern
            ));
        } else {
            self.progress
                .status(format!("found {} session(s)", sessions.len()));
        }
        Ok(sessions.into())
    }
}

impl WorkerStrategy for ArchiveWorker {
    fn initial_message(&self) -> String {
        let name = self
            .archive
            .file_name()
            .map_or_else(|| "archive".into(), |name| name.to_string_lossy());
        format!("unpacking {name}")
    }

    fn next_folder(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + '_>> {
        Box::pin(async move {
            if self.pending.is_none() {
                self.pending = Some(self.unpack().await?);
            }
            Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
        })
    }

    fn after_process<'a>(
        &'a mut self,
        _folder: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.pending.as_ref().is_some_and(|queue| !queue.is_empty()) {
                return Ok(());
            }

            let root = self.sessions_root();
            let dest = self.workspace.join(RESULT_ARCHIVE);
            let target = dest.clone();
            let packed = tokio::task::spawn_blocking(move || pack_directory(&root, &target))
                .await
                .map_err(|err| AppError::Archive(format!("pack task failed: {err}")))??;

            info!(files = packed, path = %dest.display(), "result archive written");
            self.progress
                .post(ProgressMessage::ResultLocation { path: dest });
            Ok(())
        })
    }
}
