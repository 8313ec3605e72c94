//! Job run loop.
//!
//! ```text
//! INIT -> (PROCESSING -> AFTER_HOOK)* -> DONE
//!              |  \
//!              |   `-> ERROR ------> DONE
//!              `-> CANCELLED ------> DONE
//! ```
//!
//! Sessions are processed strictly one after another. Cancellation is
//! observed between sessions only; a session that has started runs to the
//! end of its after-hook. The terminal sentinel is posted exactly once on
//! every exit path, including panics, by [`TerminalGuard`].

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::WorkerStrategy;
use crate::models::job::JobRequest;
use crate::models::progress::{ProgressHandle, ProgressMessage};
use crate::processing::dispatcher::ProcessorDispatcher;
use crate::processing::session_name;
use crate::{AppError, Result};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every session was visited.
    Completed {
        /// Sessions whose pass ran without a session-level error.
        succeeded: usize,
        /// Sessions whose pass failed as a whole.
        failed: usize,
    },
    /// Stopped before the next session because of a cancel request.
    Cancelled,
    /// Aborted by an orchestrator-fatal error.
    Failed,
}

/// Posts [`ProgressMessage::Done`] when dropped.
pub struct TerminalGuard {
    progress: ProgressHandle,
}

impl TerminalGuard {
    /// Arm the guard for `progress`.
    #[must_use]
    pub fn new(progress: ProgressHandle) -> Self {
        Self { progress }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.progress.post(ProgressMessage::Done);
    }
}

/// Drives one job from start notice to terminal sentinel.
pub struct Orchestrator {
    job_id: String,
    request: JobRequest,
    dispatcher: ProcessorDispatcher,
    strategy: Box<dyn WorkerStrategy>,
    progress: ProgressHandle,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Assemble an orchestrator.
    #[must_use]
    pub fn new(
        job_id: String,
        request: JobRequest,
        dispatcher: ProcessorDispatcher,
        strategy: Box<dyn WorkerStrategy>,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            request,
            dispatcher,
            strategy,
            progress,
            cancel,
        }
    }

    /// Run every session, then post the terminal sentinel.
    pub async fn run(mut self) -> RunOutcome {
        let _guard = TerminalGuard::new(self.progress.clone());
        let span = info_span!("job", job_id = %self.job_id, action = %self.request.action);

        async {
            self.progress.status(self.strategy.initial_message());
            match self.run_sessions().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(error = %err, "job aborted");
                    self.progress.error(format!("job aborted: {err}"));
                    RunOutcome::Failed
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_sessions(&mut self) -> Result<RunOutcome> {
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                info!("cancellation observed between sessions");
                self.progress.post(ProgressMessage::Cancelled);
                return Ok(RunOutcome::Cancelled);
            }

            let Some(folder) = self.strategy.next_folder().await? else {
                break;
            };
            let name = session_name(&folder);
            self.progress.status(format!("processing session {name}"));

            if self.process_session(folder.clone()).await? {
                succeeded += 1;
                self.progress.status(format!("finished session {name}"));
            } else {
                failed += 1;
            }

            self.strategy.after_process(&folder).await?;
        }

        info!(succeeded, failed, "all sessions visited");
        Ok(RunOutcome::Completed { succeeded, failed })
    }

    /// Run the pass over one folder; `Ok(false)` when only this session failed.
    async fn process_session(&self, folder: PathBuf) -> Result<bool> {
        let mut processor = self.dispatcher.build(&self.request)?;
        let name = session_name(&folder);
        let span = info_span!("session", session = %name);

        let outcome = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            processor.process(&folder)
        })
        .await
        .map_err(|err| AppError::Worker(format!("session {name} panicked: {err}")))?;

        match outcome {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(session = %name, error = %err, "session failed");
                self.progress.error(format!("session {name} failed: {err}"));
                Ok(false)
            }
        }
    }
}
