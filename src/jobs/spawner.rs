//! Worker process spawner.
//!
//! Each job runs in its own OS process so a hung or crashing model backend
//! can be killed without touching the server. The worker is started with:
//! - `kill_on_drop(true)` so dropping the handle reaps the process.
//! - `env_clear()` plus an allowlist, so remote credentials and other server
//!   secrets only reach the worker through its spec.
//! - The job workspace as working directory.
//! - On Unix, a process group of its own, so a forced kill also takes down
//!   any model backend the worker has started.
//!
//! The spec is written to stdin before the handle is returned.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::control::write_spec;
use crate::models::job::WorkerSpec;
use crate::{AppError, Result};

/// Environment variables inherited by worker processes.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "TMPDIR",
    "LANG",
    "LC_ALL",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
];

/// Subcommand that turns the binary into a worker.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// A started worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    /// Process handle, kept so `kill_on_drop` applies.
    pub child: Child,
    /// Worker stdin, positioned after the spec line.
    pub stdin: ChildStdin,
    /// Worker stdout carrying progress NDJSON.
    pub stdout: ChildStdout,
}

/// Executable used for workers: the configured override or the running binary.
///
/// # Errors
///
/// Returns `AppError::Worker` if the current executable cannot be resolved.
pub fn worker_program(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_exe()
            .map_err(|e| AppError::Worker(format!("cannot resolve worker executable: {e}"))),
    }
}

/// Start a worker for `spec`.
///
/// Worker stderr is inherited so its logs join the server's.
///
/// # Errors
///
/// - `AppError::Worker("failed to spawn worker: …")` on OS spawn failure.
/// - `AppError::Worker("failed to send job spec: …")` if the worker exits
///   before reading its spec.
pub async fn spawn_worker(program: &Path, spec: &WorkerSpec) -> Result<WorkerProcess> {
    let mut cmd = Command::new(program);
    cmd.arg(WORKER_SUBCOMMAND);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&spec.workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Worker(format!("failed to spawn worker: {err}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Worker("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Worker("failed to capture worker stdout".into()))?;

    write_spec(&mut stdin, spec).await?;

    info!(
        job_id = %spec.job_id,
        pid = child.id(),
        program = %program.display(),
        "worker spawned"
    );

    Ok(WorkerProcess {
        child,
        stdin,
        stdout,
    })
}

/// Own the worker process until it exits or `kill` fires.
///
/// On `kill` the whole process group is sent `SIGKILL` (Unix), then the
/// child itself is killed and reaped.
#[must_use]
pub fn monitor_exit(job_id: String, mut child: Child, kill: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let killed = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => info!(job_id, %status, "worker exited"),
                    Err(err) => warn!(job_id, %err, "error waiting for worker process"),
                }
                false
            }
            () = kill.cancelled() => true,
        };

        if killed {
            kill_process_group(&job_id, child.id());
            if let Err(err) = child.kill().await {
                warn!(job_id, %err, "failed to kill worker process");
            }
            info!(job_id, "worker killed");
        }
    })
}

#[cfg(unix)]
fn kill_process_group(job_id: &str, pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!(job_id, pid, %err, "failed to kill worker process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_job_id: &str, _pid: Option<u32>) {}
