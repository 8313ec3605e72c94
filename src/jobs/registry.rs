//! In-memory job table.
//!
//! A [`Job`] owns the consumer end of its progress channel and the handles
//! of its worker process. Each mutable field has a single writer role:
//!
//! | Field             | Written by                                   |
//! |-------------------|----------------------------------------------|
//! | progress channel  | reader task (worker output), cancel, `fail`  |
//! | `finished`        | whichever of the above posts the sentinel    |
//! | `cancelled`       | cancel                                       |
//! | `result_location` | the stream consumer                          |
//! | `delivered`       | the stream consumer                          |
//! | worker handles    | launch, then cancel                          |

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::control::{run_control_writer, ControlCommand, ControlSender};
use super::reader::run_progress_reader;
use super::spawner::{monitor_exit, spawn_worker, worker_program};
use crate::config::GlobalConfig;
use crate::models::action::Action;
use crate::models::job::{JobRequest, JobSource, WorkerSpec};
use crate::models::progress::{self, ProgressHandle, ProgressMessage, ProgressReceiver};
use crate::{AppError, Result};

/// Tasks and signals tied to a running worker process.
struct WorkerHandles {
    control: ControlSender,
    reader: JoinHandle<()>,
    kill: CancellationToken,
}

/// One submitted job.
pub struct Job {
    /// Unique identifier.
    pub id: String,
    /// Requested pass; `None` when the submitted action name was invalid.
    pub action: Option<Action>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Scratch directory owned by this job.
    pub workspace: PathBuf,
    progress: ProgressHandle,
    receiver: Arc<Mutex<ProgressReceiver>>,
    cancelled: AtomicBool,
    finished: Arc<AtomicBool>,
    delivered: AtomicBool,
    worker: Mutex<Option<WorkerHandles>>,
    result_location: Mutex<Option<PathBuf>>,
}

/// Snapshot of a job for listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobSummary {
    /// Unique identifier.
    pub job_id: String,
    /// Requested pass, if valid.
    pub action: Option<Action>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// A worker is attached and the sentinel has not been posted yet.
    pub running: bool,
    /// Cancellation was requested.
    pub cancelled: bool,
    /// A result archive is available for download.
    pub has_result: bool,
}

impl Job {
    fn new(id: String, action: Option<Action>, workspace: PathBuf) -> Self {
        let (tx, rx) = progress::channel();
        Self {
            id,
            action,
            created_at: Utc::now(),
            workspace,
            progress: ProgressHandle::new(tx),
            receiver: Arc::new(Mutex::new(rx)),
            cancelled: AtomicBool::new(false),
            finished: Arc::new(AtomicBool::new(false)),
            delivered: AtomicBool::new(false),
            worker: Mutex::new(None),
            result_location: Mutex::new(None),
        }
    }

    /// Posting handle for this job's channel.
    #[must_use]
    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Shared consumer end of the progress channel.
    ///
    /// Stream connections take the lock for as long as they are attached, so
    /// at most one connection drains the channel at a time.
    #[must_use]
    pub fn receiver(&self) -> Arc<Mutex<ProgressReceiver>> {
        Arc::clone(&self.receiver)
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the terminal sentinel has been posted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether a stream connection has already consumed the sentinel.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Note that the sentinel reached a stream connection.
    pub fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::SeqCst);
    }

    /// Record where the packaged result lives on this host.
    pub async fn set_result_location(&self, path: PathBuf) {
        *self.result_location.lock().await = Some(path);
    }

    /// Packaged result location, if one was announced.
    pub async fn result_location(&self) -> Option<PathBuf> {
        self.result_location.lock().await.clone()
    }

    /// Post `[ERROR] detail` and the sentinel, unless the job already finished.
    ///
    /// Returns `false` when the sentinel had already been posted.
    pub fn fail(&self, detail: impl Into<String>) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.progress.error(detail);
        self.progress.post(ProgressMessage::Done);
        true
    }

    /// Stop the job.
    ///
    /// Asks the worker to stop, stops forwarding its output, force-kills the
    /// process and, unless the job had already finished, posts `[CANCELLED]`
    /// and `[DONE ALL]` once the reader has exited. Returns whether those
    /// were posted.
    pub async fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);

        let handles = self.worker.lock().await.take();
        if let Some(handles) = handles {
            if handles.control.send(ControlCommand::Cancel).is_err() {
                debug!(job_id = %self.id, "worker control channel already closed");
            }
            handles.reader.abort();
            handles.kill.cancel();
            // Wait out a reader poll in flight so nothing lands after the sentinel.
            if let Err(err) = handles.reader.await {
                if !err.is_cancelled() {
                    warn!(job_id = %self.id, %err, "progress reader panicked");
                }
            }
        }

        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.progress.post(ProgressMessage::Cancelled);
        self.progress.post(ProgressMessage::Done);
        info!(job_id = %self.id, "job cancelled");
        true
    }

    async fn has_worker(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    async fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            action: self.action,
            created_at: self.created_at,
            running: !self.is_finished() && self.has_worker().await,
            cancelled: self.is_cancelled(),
            has_result: self.result_location().await.is_some(),
        }
    }
}

/// Concurrency-safe map of live jobs.
#[derive(Clone)]
pub struct JobRegistry {
    config: Arc<GlobalConfig>,
    jobs: Arc<Mutex<HashMap<String, Arc<Job>>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configuration the registry launches workers with.
    #[must_use]
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    /// Allocate a job with a fresh id, channel and workspace directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the workspace cannot be created.
    pub async fn create(&self, action: Option<Action>) -> Result<Arc<Job>> {
        let id = uuid::Uuid::new_v4().to_string();
        let workspace = self.config.job_workspace(&id);
        tokio::fs::create_dir_all(&workspace).await?;

        let job = Arc::new(Job::new(id.clone(), action, workspace));
        self.jobs.lock().await.insert(id.clone(), Arc::clone(&job));
        debug!(job_id = %id, "job created");
        Ok(job)
    }

    /// Look up a live job.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the id is unknown or was evicted.
    pub async fn get(&self, id: &str) -> Result<Arc<Job>> {
        self.jobs
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("job {id}")))
    }

    /// Evict a job; unknown ids are ignored.
    pub async fn remove(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.lock().await.remove(id)
    }

    /// Evict a job and delete its workspace.
    pub async fn evict_and_clean(&self, id: &str) {
        let Some(job) = self.remove(id).await else {
            return;
        };
        match tokio::fs::remove_dir_all(&job.workspace).await {
            Ok(()) => debug!(job_id = %id, "job workspace removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(job_id = %id, %err, "failed to remove job workspace"),
        }
    }

    /// Snapshot of every live job, oldest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        let jobs: Vec<Arc<Job>> = self.jobs.lock().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(jobs.len());
        for job in jobs {
            summaries.push(job.summary().await);
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Number of jobs whose worker is still running.
    pub async fn running_count(&self) -> usize {
        let jobs: Vec<Arc<Job>> = self.jobs.lock().await.values().cloned().collect();
        let mut running = 0;
        for job in jobs {
            if !job.is_finished() && job.has_worker().await {
                running += 1;
            }
        }
        running
    }

    /// Start the worker process for `job` and wire its output into the
    /// job's progress channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` if the process cannot be started.
    pub async fn launch(&self, job: &Arc<Job>, request: JobRequest, source: JobSource) -> Result<()> {
        let spec = WorkerSpec {
            job_id: job.id.clone(),
            request,
            source,
            workspace: job.workspace.clone(),
            config: (*self.config).clone(),
        };
        let program = worker_program(self.config.worker_program.as_deref())?;
        let process = spawn_worker(&program, &spec).await?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let writer_id = job.id.clone();
        tokio::spawn(async move {
            if let Err(err) = run_control_writer(writer_id.clone(), process.stdin, control_rx).await {
                debug!(job_id = %writer_id, %err, "control writer stopped");
            }
        });

        let reader = tokio::spawn(run_progress_reader(
            job.id.clone(),
            process.stdout,
            job.progress.clone(),
            Arc::clone(&job.finished),
        ));

        let kill = CancellationToken::new();
        let _monitor = monitor_exit(job.id.clone(), process.child, kill.clone());

        *job.worker.lock().await = Some(WorkerHandles {
            control: control_tx,
            reader,
            kill,
        });
        if job.is_cancelled() {
            job.cancel().await;
        }
        info!(job_id = %job.id, "job launched");
        Ok(())
    }
}
