//! Control channel from the server to a worker's stdin.
//!
//! The first stdin line is the job's [`WorkerSpec`]; the spawner writes it
//! before handing stdin to [`run_control_writer`]. Every later line is one
//! [`ControlCommand`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::job::WorkerSpec;
use crate::{AppError, Result};

/// Command sent to a running worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Stop before the next session.
    Cancel,
}

/// Sender half held by the job registry.
pub type ControlSender = mpsc::UnboundedSender<ControlCommand>;

/// Serialize `value` as one NDJSON line.
///
/// # Errors
///
/// Returns `AppError::Protocol` if serialization fails.
pub fn to_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write the start-up spec line.
///
/// # Errors
///
/// Returns `AppError::Worker` if the worker's stdin is already closed.
pub async fn write_spec<W>(stdin: &mut W, spec: &WorkerSpec) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = to_line(spec)?;
    stdin
        .write_all(&line)
        .await
        .map_err(|e| AppError::Worker(format!("failed to send job spec: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| AppError::Worker(format!("failed to send job spec: {e}")))
}

/// Forward control commands to the worker until the channel closes.
///
/// Dropping every [`ControlSender`] closes the worker's stdin, which the
/// worker treats as end of control input.
///
/// # Errors
///
/// Returns `AppError::Worker` if a write fails because the worker exited.
pub async fn run_control_writer<W>(
    job_id: String,
    mut stdin: W,
    mut cmd_rx: mpsc::UnboundedReceiver<ControlCommand>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = cmd_rx.recv().await {
        let line = to_line(&command)?;
        if let Err(e) = stdin.write_all(&line).await.and(stdin.flush().await) {
            warn!(job_id, error = %e, "control writer: write to worker stdin failed");
            return Err(AppError::Worker(format!("control write failed: {e}")));
        }
        debug!(job_id, ?command, "control command sent");
    }
    debug!(job_id, "control writer: channel closed, stopping");
    Ok(())
}
