//! HTTP job API.
//!
//! | Method | Path                  | Handler                         |
//! |--------|-----------------------|---------------------------------|
//! | `POST` | `/jobs`               | [`handlers::submit_job`]        |
//! | `GET`  | `/jobs`               | [`handlers::list_jobs`]         |
//! | `GET`  | `/jobs/{id}/stream`   | [`stream::stream_job`]          |
//! | `POST` | `/jobs/{id}/cancel`   | [`handlers::cancel_job`]        |
//! | `GET`  | `/jobs/{id}/download` | [`handlers::download_result`]   |
//! | `GET`  | `/health`             | [`handlers::health`]            |

pub mod handlers;
pub mod stream;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::jobs::registry::JobRegistry;
use crate::{AppError, Result};

/// State shared by every handler.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Live jobs.
    pub registry: JobRegistry,
}

impl AppState {
    /// Build state with an empty registry.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            registry: JobRegistry::new(Arc::clone(&config)),
            config,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidAction(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Worker(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Io(_)
            | Self::Ledger(_)
            | Self::Model(_)
            | Self::Storage(_)
            | Self::Archive(_)
            | Self::Protocol(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Router with every job endpoint mounted.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", post(handlers::submit_job).get(handlers::list_jobs))
        .route("/jobs/{id}/stream", get(stream::stream_job))
        .route("/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/jobs/{id}/download", get(handlers::download_result))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the job API on `bind_address:http_port` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot be bound.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = format!("{}:{}", state.config.bind_address, state.config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;

    info!(%bind, "job API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("job API shut down");
    Ok(())
}
