//! Progress reader task.
//!
//! Reads NDJSON [`ProgressMessage`]s from a worker's stdout and forwards
//! them, in order, into the job's progress channel.
//!
//! | Worker output                  | Effect                                  |
//! |--------------------------------|-----------------------------------------|
//! | valid message line             | forwarded                               |
//! | `Done`                         | forwarded once, reader stops            |
//! | malformed or over-long line    | logged at `WARN`, skipped               |
//! | EOF / read error before `Done` | `[ERROR] worker exited ...`, `[DONE ALL]` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use super::codec::LineCodec;
use crate::models::progress::{ProgressHandle, ProgressMessage};
use crate::{AppError, Result};

/// Parse one worker stdout line.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the line is not a progress message.
pub fn parse_progress_line(line: &str) -> Result<Option<ProgressMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Forward worker progress until `Done` or end of stream.
///
/// `finished` is shared with the cancel path: whichever side flips it first
/// is the only one allowed to post the terminal sentinel.
pub async fn run_progress_reader<R>(
    job_id: String,
    stdout: R,
    progress: ProgressHandle,
    finished: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    // A decode error pauses the framed stream for exactly one poll.
    let mut paused = false;
    let reason = loop {
        match framed.next().await {
            None if paused => paused = false,
            None => break "worker exited unexpectedly".to_owned(),

            Some(Err(AppError::Protocol(ref msg))) => {
                warn!(job_id, error = msg.as_str(), "progress reader: framing error, skipping");
                paused = true;
            }

            Some(Err(e)) => {
                warn!(job_id, error = %e, "progress reader: stream error, stopping");
                break format!("lost contact with worker: {e}");
            }

            Some(Ok(line)) => match parse_progress_line(&line) {
                Ok(Some(ProgressMessage::Done)) => {
                    if !finished.swap(true, Ordering::SeqCst) {
                        progress.post(ProgressMessage::Done);
                    }
                    debug!(job_id, "progress reader: terminal sentinel forwarded");
                    return;
                }
                Ok(Some(message)) => progress.post(message),
                Ok(None) => {}
                Err(e) => {
                    warn!(job_id, error = %e, raw_line = %line, "progress reader: parse error, skipping line");
                }
            },
        }
    };

    if !finished.swap(true, Ordering::SeqCst) {
        progress.error(reason);
        progress.post(ProgressMessage::Done);
    }
}
