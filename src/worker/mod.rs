//! Worker-process side of a job.
//!
//! A worker runs exactly one job. The [`orchestrator`] drives a
//! [`WorkerStrategy`] that decides where sessions come from and what happens
//! to them once their pass has run:
//!
//! - [`archive::ArchiveWorker`]: sessions unpacked from an uploaded zip,
//!   repacked into a downloadable result archive.
//! - [`remote::RemoteWorker`]: sessions downloaded one by one from remote
//!   storage and uploaded back after processing.

pub mod archive;
pub mod entry;
pub mod orchestrator;
pub mod packaging;
pub mod remote;
pub mod storage;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::Result;

/// Lifecycle hooks the orchestrator calls while running a job.
pub trait WorkerStrategy: Send + Sync {
    /// Human-readable notice posted before the first session.
    fn initial_message(&self) -> String;

    /// Next session folder to process, or `None` once all are done.
    ///
    /// Sessions are produced lazily; a strategy may fetch each one only
    /// when asked. Failures that only affect a single session should be
    /// reported by the strategy itself and skipped; an `Err` aborts the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the session source as a whole is unusable.
    fn next_folder(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + '_>>;

    /// Called once per folder after its pass ran, even when the pass failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the results cannot be packaged or stored; the
    /// job is aborted.
    fn after_process<'a>(
        &'a mut self,
        folder: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
