//! Strategy for jobs over a remote storage folder.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{info, warn};

use super::storage::{RemoteMetadata, RemoteSession, RemoteStorage};
use super::WorkerStrategy;
use crate::ledger::{discover_sessions, locate_ledger};
use crate::models::job::Credential;
use crate::models::progress::ProgressHandle;
use crate::processing::session_log::SESSION_LOG_FILE;
use crate::Result;

/// A session currently checked out into scratch storage.
struct CheckedOut {
    /// Removed from disk when dropped.
    _scratch: TempDir,
    metadata: RemoteMetadata,
}

/// Downloads, processes and re-uploads remote sessions one at a time.
pub struct RemoteWorker {
    storage: Arc<dyn RemoteStorage>,
    folder: String,
    credential: Credential,
    workspace: PathBuf,
    ledger_pattern: String,
    progress: ProgressHandle,
    queue: Option<VecDeque<RemoteSession>>,
    current: Option<CheckedOut>,
}

impl RemoteWorker {
    /// Create a strategy over `folder`, using `workspace` for scratch space.
    #[must_use]
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        folder: String,
        credential: Credential,
        workspace: PathBuf,
        ledger_pattern: String,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            storage,
            folder,
            credential,
            workspace,
            ledger_pattern,
            progress,
            queue: None,
            current: None,
        }
    }

    async fn list(&self) -> Result<VecDeque<RemoteSession>> {
        let sessions = self
            .storage
            .list_sessions(&self.folder, &self.credential)
            .await?;
        info!(folder = %self.folder, count = sessions.len(), "remote folder listed");
        self.progress
            .status(format!("found {} session(s) in {}", sessions.len(), self.folder));
        Ok(sessions.into())
    }

    /// Session root inside a download, which may be nested one level deeper.
    fn session_root(&self, downloaded: PathBuf) -> PathBuf {
        match discover_sessions(&downloaded, &self.ledger_pattern) {
            Ok(found) => found.into_iter().next().unwrap_or(downloaded),
            Err(err) => {
                warn!(error = %err, "session discovery failed, using download root");
                downloaded
            }
        }
    }

    async fn upload_file(&self, file: &Path, metadata: &RemoteMetadata) {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.storage.upload(file, &self.credential, metadata).await {
            Ok(()) => self
                .progress
                .status(format!("{}: uploaded {name}", metadata.session_name)),
            Err(err) => {
                warn!(session = %metadata.session_name, file = %name, error = %err, "upload failed");
                self.progress.error(format!(
                    "{}: upload of {name} failed: {err}",
                    metadata.session_name
                ));
            }
        }
    }
}

impl WorkerStrategy for RemoteWorker {
    fn initial_message(&self) -> String {
        format!("fetching sessions from remote folder {}", self.folder)
    }

    fn next_folder(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + '_>> {
        Box::pin(async move {
            // Scratch of a session whose after-hook never ran.
            self.current = None;

            if self.queue.is_none() {
                self.queue = Some(self.list().await?);
            }

            while let Some(session) = self.queue.as_mut().and_then(VecDeque::pop_front) {
                let scratch = tempfile::Builder::new()
                    .prefix("session-")
                    .tempdir_in(&self.workspace)?;

                self.progress.status(format!("downloading {}", session.name));
                match self
                    .storage
                    .download(&session, &self.credential, scratch.path())
                    .await
                {
                    Ok((downloaded, metadata)) => {
                        let root = self.session_root(downloaded);
                        self.current = Some(CheckedOut {
                            _scratch: scratch,
                            metadata,
                        });
                        return Ok(Some(root));
                    }
                    Err(err) => {
                        warn!(session = %session.name, error = %err, "download failed, skipping");
                        self.progress
                            .error(format!("download of {} failed: {err}", session.name));
                    }
                }
            }
            Ok(None)
        })
    }

    fn after_process<'a>(
        &'a mut self,
        folder: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(checked_out) = self.current.take() else {
                return Ok(());
            };
            let metadata = &checked_out.metadata;

            match locate_ledger(folder, &self.ledger_pattern) {
                Ok(ledger) => self.upload_file(&ledger, metadata).await,
                Err(err) => self
                    .progress
                    .error(format!("{}: nothing uploaded: {err}", metadata.session_name)),
            }

            let log = folder.join(SESSION_LOG_FILE);
            if log.is_file() {
                self.upload_file(&log, metadata).await;
            }

            info!(session = %metadata.session_name, "remote session released");
            Ok(())
        })
    }
}
