//! Request handlers for job submission, control and results.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use super::AppState;
use crate::jobs::registry::JobSummary;
use crate::models::action::Action;
use crate::models::job::{Credential, JobRequest, JobSource};
use crate::{AppError, Result};

/// File name of an uploaded bundle inside the job workspace.
pub const UPLOAD_ARCHIVE: &str = "upload.zip";

/// Body of a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Identifier to stream, cancel or download with.
    pub job_id: String,
}

/// Body of a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Cancelled job.
    pub job_id: String,
    /// `false` when the job had already finished.
    pub cancelled: bool,
}

/// Raw multipart fields of a submission.
#[derive(Debug, Default)]
struct Submission {
    action: Option<String>,
    language: Option<String>,
    instruction: Option<String>,
    model: Option<String>,
    remote_folder: Option<String>,
    credential: Option<String>,
    archive: Option<Bytes>,
}

impl Submission {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut submission = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Config(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_owned();
            if name == "archive" {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Config(format!("failed to read archive: {e}")))?;
                submission.archive = Some(data);
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::Config(format!("failed to read field '{name}': {e}")))?;
            let value = Some(value.trim().to_owned()).filter(|v| !v.is_empty());
            match name.as_str() {
                "action" => submission.action = value,
                "language" => submission.language = value,
                "instruction" => submission.instruction = value,
                "model" => submission.model = value,
                "remote_folder" => submission.remote_folder = value,
                "credential" => submission.credential = value,
                other => warn!(field = other, "ignoring unknown submission field"),
            }
        }
        Ok(submission)
    }
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /jobs`
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSummary>> {
    Json(state.registry.list().await)
}

/// `POST /jobs`
///
/// A job is created as soon as the request is well-formed. Problems with
/// its parameters (unknown action, unsupported language, missing remote
/// storage) are reported on the job's stream as `[ERROR] ...` followed by
/// `[DONE ALL]`, and no worker is started.
///
/// # Errors
///
/// - `AppError::Config` (400) if neither an archive nor a remote folder
///   with credential was supplied.
/// - `AppError::Worker` (503) if the running-job limit is reached.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>> {
    let submission = Submission::read(multipart).await?;

    if submission.archive.is_none()
        && (submission.remote_folder.is_none() || submission.credential.is_none())
    {
        return Err(AppError::Config(
            "submit either an 'archive' file or 'remote_folder' with 'credential'".into(),
        ));
    }

    let limit = state.config.max_concurrent_jobs as usize;
    if state.registry.running_count().await >= limit {
        return Err(AppError::Worker(format!(
            "{limit} job(s) already running, try again later"
        )));
    }

    let action = submission
        .action
        .as_deref()
        .ok_or_else(|| AppError::InvalidAction("no action given".into()))
        .and_then(str::parse::<Action>);
    let job = state.registry.create(action.as_ref().ok().copied()).await?;
    let response = Json(SubmitResponse {
        job_id: job.id.clone(),
    });

    let action = match action {
        Ok(action) => action,
        Err(err) => {
            info!(job_id = %job.id, error = %err, "job rejected");
            job.fail(err.to_string());
            return Ok(response);
        }
    };

    let language = submission.language.unwrap_or_default();
    if state.config.find_language(&language).is_none() {
        let detail = if language.is_empty() {
            "no language given".to_owned()
        } else {
            format!("unsupported language '{language}'")
        };
        info!(job_id = %job.id, %detail, "job rejected");
        job.fail(detail);
        return Ok(response);
    }

    let source = if let Some(archive) = submission.archive {
        let path = job.workspace.join(UPLOAD_ARCHIVE);
        tokio::fs::write(&path, &archive).await?;
        JobSource::Archive { archive: path }
    } else if state.config.remote.is_none() {
        job.fail("remote storage is not configured on this server");
        return Ok(response);
    } else {
        JobSource::Remote {
            folder: submission.remote_folder.unwrap_or_default(),
            credential: Credential::new(submission.credential.unwrap_or_default()),
        }
    };

    let request = JobRequest {
        action,
        language,
        instruction: submission.instruction,
        model: submission.model,
    };
    if let Err(err) = state.registry.launch(&job, request, source).await {
        warn!(job_id = %job.id, error = %err, "worker launch failed");
        job.fail(err.to_string());
    }
    Ok(response)
}

/// `POST /jobs/{id}/cancel`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the job does not exist.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>> {
    let job = state.registry.get(&id).await?;
    let cancelled = job.cancel().await;

    let registry = state.registry.clone();
    let job_id = id.clone();
    tokio::spawn(async move { registry.evict_and_clean(&job_id).await });

    Ok(Json(CancelResponse {
        job_id: id,
        cancelled,
    }))
}

/// `GET /jobs/{id}/download`
///
/// Returns the packaged result and schedules the job's cleanup.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the job does not exist or has not
/// announced a result yet.
pub async fn download_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let job = state.registry.get(&id).await?;
    let location = job
        .result_location()
        .await
        .ok_or_else(|| AppError::NotFound(format!("result of job {id}")))?;
    let body = tokio::fs::read(&location).await.map_err(|e| {
        AppError::NotFound(format!("result archive {}: {e}", location.display()))
    })?;

    let registry = state.registry.clone();
    let job_id = id.clone();
    tokio::spawn(async move { registry.evict_and_clean(&job_id).await });

    info!(job_id = %id, bytes = body.len(), "result downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{id}.zip\""),
            ),
        ],
        body,
    ))
}
