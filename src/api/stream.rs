//! Server-sent event stream of a job's progress.
//!
//! Each progress message becomes one SSE `data` event carrying its display
//! form. Two messages are rewritten on the way out:
//! - a result location is recorded on the job and shown as
//!   `[ZIP PATH] /jobs/{id}/download`, never as a server path;
//! - `[DONE ALL]` ends the stream. A job without a result is evicted at
//!   that point; one with a result lives until it is downloaded.
//!
//! Messages consumed by a connection are gone: a client that reconnects
//! only sees what was posted after the previous connection stopped reading.
//! Reconnecting after `[DONE ALL]` yields just `[DONE ALL]` again.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};

use super::AppState;
use crate::jobs::registry::Job;
use crate::models::progress::{ProgressMessage, ProgressReceiver, RESULT_PREFIX};
use crate::Result;

/// Next message: buffered ones first without waiting, then live ones.
///
/// Once the sentinel has been delivered nothing more is posted, so a drained
/// channel just repeats it.
async fn next_message(rx: &mut ProgressReceiver, job: &Job) -> Option<ProgressMessage> {
    match rx.try_recv() {
        Ok(message) => Some(message),
        Err(TryRecvError::Empty) if job.is_delivered() => Some(ProgressMessage::Done),
        Err(TryRecvError::Empty) => rx.recv().await,
        Err(TryRecvError::Disconnected) => None,
    }
}

fn event(text: &str) -> Event {
    Event::default().data(text.replace('\r', ""))
}

/// Public download path of a job's result.
#[must_use]
pub fn download_path(job_id: &str) -> String {
    format!("/jobs/{job_id}/download")
}

/// `GET /jobs/{id}/stream`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the job does not exist.
pub async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let job = state.registry.get(&id).await?;
    let registry = state.registry.clone();
    info!(job_id = %id, "stream client connected");

    let stream = async_stream::stream! {
        let mut rx = job.receiver().lock_owned().await;

        while let Some(message) = next_message(&mut rx, &job).await {
            match message {
                ProgressMessage::ResultLocation { path } => {
                    debug!(job_id = %id, path = %path.display(), "result location recorded");
                    job.set_result_location(path).await;
                    yield Ok(event(&format!("{RESULT_PREFIX} {}", download_path(&id))));
                }
                ProgressMessage::Done => {
                    job.mark_delivered();
                    if job.result_location().await.is_none() {
                        registry.evict_and_clean(&id).await;
                    }
                    info!(job_id = %id, "stream finished");
                    yield Ok(event(&ProgressMessage::Done.to_string()));
                    break;
                }
                other => yield Ok(event(&other.to_string())),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
