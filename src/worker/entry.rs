//! Worker process main loop.
//!
//! Reads the [`WorkerSpec`] from the first stdin line, builds the pass and
//! the session strategy, runs the [`Orchestrator`], and streams every
//! progress message to stdout as one JSON line. Later stdin lines are
//! [`ControlCommand`]s.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::archive::ArchiveWorker;
use super::orchestrator::{Orchestrator, RunOutcome, TerminalGuard};
use super::remote::RemoteWorker;
use super::storage::{HttpRemoteStorage, RemoteStorage};
use super::WorkerStrategy;
use crate::config::{BackendsConfig, GlobalConfig};
use crate::jobs::codec::LineCodec;
use crate::jobs::control::{to_line, ControlCommand};
use crate::ledger::csv_store::CsvLedgerStore;
use crate::models::job::{JobSource, WorkerSpec};
use crate::models::progress::{self, ProgressHandle, ProgressMessage, ProgressReceiver};
use crate::processing::backend::Backends;
use crate::processing::dispatcher::ProcessorDispatcher;
use crate::{AppError, Result};

/// Run one job as a worker process over the given stdio.
///
/// # Errors
///
/// Returns `AppError::Worker` if no spec arrives or progress cannot be
/// written. Job failures are reported on the progress stream instead.
pub async fn run_worker<R, W>(stdin: R, stdout: W) -> Result<RunOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(stdin, LineCodec::new());
    let spec: WorkerSpec = match lines.next().await {
        Some(Ok(line)) => serde_json::from_str(&line)?,
        Some(Err(e)) => return Err(AppError::Worker(format!("failed to read job spec: {e}"))),
        None => return Err(AppError::Worker("stdin closed before job spec".into())),
    };
    info!(job_id = %spec.job_id, action = %spec.request.action, "worker started");

    let cancel = CancellationToken::new();
    let control = tokio::spawn(run_control_reader(
        spec.job_id.clone(),
        lines,
        cancel.clone(),
    ));

    let (tx, rx) = progress::channel();
    let writer = tokio::spawn(run_progress_writer(stdout, rx));
    let progress = ProgressHandle::new(tx);

    let outcome = match build_orchestrator(spec, progress.clone(), cancel) {
        Ok(orchestrator) => orchestrator.run().await,
        Err(err) => {
            warn!(error = %err, "job could not be started");
            let _guard = TerminalGuard::new(progress.clone());
            progress.error(err.to_string());
            RunOutcome::Failed
        }
    };
    drop(progress);

    control.abort();
    finish_writer(writer).await?;
    info!(?outcome, "worker finished");
    Ok(outcome)
}

/// Assemble the orchestrator described by `spec`.
///
/// # Errors
///
/// Returns `AppError::Config` if a remote job arrives without a remote
/// storage configuration, or `AppError::Storage` if its client cannot be built.
pub fn build_orchestrator(
    spec: WorkerSpec,
    progress: ProgressHandle,
    cancel: CancellationToken,
) -> Result<Orchestrator> {
    let storage: Option<Arc<dyn RemoteStorage>> = match spec.config.remote {
        Some(ref remote) if matches!(spec.source, JobSource::Remote { .. }) => {
            Some(Arc::new(HttpRemoteStorage::new(remote)?))
        }
        _ => None,
    };
    build_orchestrator_with(spec, progress, cancel, Backends::from_config, storage)
}

/// Like [`build_orchestrator`], with injectable model backends and storage.
///
/// # Errors
///
/// Returns `AppError::Config` if a remote job has no storage.
pub fn build_orchestrator_with(
    spec: WorkerSpec,
    progress: ProgressHandle,
    cancel: CancellationToken,
    backends: impl FnOnce(&BackendsConfig) -> Backends,
    storage: Option<Arc<dyn RemoteStorage>>,
) -> Result<Orchestrator> {
    let WorkerSpec {
        job_id,
        request,
        source,
        workspace,
        config,
    } = spec;
    let config: Arc<GlobalConfig> = Arc::new(config);

    let strategy: Box<dyn WorkerStrategy> = match source {
        JobSource::Archive { archive } => Box::new(ArchiveWorker::new(
            archive,
            workspace,
            config.ledger_pattern.clone(),
            progress.clone(),
        )),
        JobSource::Remote { folder, credential } => {
            let storage = storage.ok_or_else(|| {
                AppError::Config("remote storage is not configured on this server".into())
            })?;
            Box::new(RemoteWorker::new(
                storage,
                folder,
                credential,
                workspace,
                config.ledger_pattern.clone(),
                progress.clone(),
            ))
        }
    };

    let store = Arc::new(CsvLedgerStore::new(config.obligatory_columns.clone()));
    let dispatcher = ProcessorDispatcher::new(
        Arc::clone(&config),
        backends(&config.backends),
        store,
        progress.clone(),
    );

    Ok(Orchestrator::new(
        job_id, request, dispatcher, strategy, progress, cancel,
    ))
}

/// Cancel `cancel` when a cancel command arrives on stdin.
async fn run_control_reader<R>(
    job_id: String,
    mut lines: FramedRead<R, LineCodec>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    while let Some(item) = lines.next().await {
        match item.and_then(|line| serde_json::from_str::<ControlCommand>(&line).map_err(AppError::from)) {
            Ok(ControlCommand::Cancel) => {
                info!(job_id, "cancel requested");
                cancel.cancel();
            }
            Err(e) => warn!(job_id, error = %e, "ignoring malformed control line"),
        }
    }
    debug!(job_id, "control input closed");
}

/// Write progress messages to `stdout` until `Done` or the channel closes.
async fn run_progress_writer<W>(mut stdout: W, mut rx: ProgressReceiver) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let line = to_line(&message)?;
        stdout
            .write_all(&line)
            .await
            .map_err(|e| AppError::Worker(format!("progress write failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| AppError::Worker(format!("progress write failed: {e}")))?;
        if matches!(message, ProgressMessage::Done) {
            break;
        }
    }
    Ok(())
}

async fn finish_writer(writer: JoinHandle<Result<()>>) -> Result<()> {
    writer
        .await
        .map_err(|e| AppError::Worker(format!("progress writer task failed: {e}")))?
}
