//! Remote session storage.
//!
//! [`RemoteStorage`] is the seam the remote strategy talks to;
//! [`HttpRemoteStorage`] implements it against a plain HTTP file API:
//!
//! | Operation       | Request                                        |
//! |-----------------|------------------------------------------------|
//! | `list_sessions` | `GET {base}/folders/{folder}/sessions`         |
//! | `download`      | `GET {base}/sessions/{id}/archive` (zip body)  |
//! | `upload`        | `PUT {base}/sessions/{id}/files/{name}`        |
//!
//! Every request carries `Authorization: Bearer <credential>`; uploads also
//! carry the body's SHA-256 in `x-content-sha256`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::packaging::extract_archive;
use crate::config::RemoteConfig;
use crate::models::job::Credential;
use crate::{AppError, Result};

/// Header carrying the hex SHA-256 of an upload body.
pub const CONTENT_SHA256_HEADER: &str = "x-content-sha256";

/// One session listed in a remote folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteSession {
    /// Remote identifier.
    pub id: String,
    /// Display name, also used as the local folder name.
    pub name: String,
}

/// Bookkeeping recorded at download time and needed for the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Remote identifier of the session the files belong to.
    pub session_id: String,
    /// Display name of the session.
    pub session_name: String,
    /// Size of the downloaded archive in bytes.
    pub archive_bytes: usize,
}

/// Remote file store holding session folders.
pub trait RemoteStorage: Send + Sync {
    /// Sessions contained in `folder`, in processing order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the folder cannot be listed.
    fn list_sessions<'a>(
        &'a self,
        folder: &'a str,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteSession>>> + Send + 'a>>;

    /// Fetch `session` into `dest` and return its local root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` or `AppError::Archive` if the session
    /// cannot be fetched or unpacked.
    fn download<'a>(
        &'a self,
        session: &'a RemoteSession,
        credential: &'a Credential,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(PathBuf, RemoteMetadata)>> + Send + 'a>>;

    /// Store `local_file` in the remote session described by `metadata`,
    /// replacing any file of the same name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the upload is rejected.
    fn upload<'a>(
        &'a self,
        local_file: &'a Path,
        credential: &'a Credential,
        metadata: &'a RemoteMetadata,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// [`RemoteStorage`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteStorage {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStorage {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch(&self, url: &str, credential: &Credential) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .bearer_auth(credential.expose())
            .send()
            .await?;
        ensure_success(url, response)
    }
}

fn ensure_success(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::Storage(format!("{url} returned {status}")))
    }
}

/// Folder name for a downloaded session that cannot escape its parent.
fn local_dir_name(session: &RemoteSession) -> String {
    let cleaned: String = session
        .name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("session-{}", session.id)
    } else {
        cleaned.to_owned()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl RemoteStorage for HttpRemoteStorage {
    fn list_sessions<'a>(
        &'a self,
        folder: &'a str,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteSession>>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/folders/{folder}/sessions", self.base_url);
            let sessions: Vec<RemoteSession> = self.fetch(&url, credential).await?.json().await?;
            debug!(folder, count = sessions.len(), "remote sessions listed");
            Ok(sessions)
        })
    }

    fn download<'a>(
        &'a self,
        session: &'a RemoteSession,
        credential: &'a Credential,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(PathBuf, RemoteMetadata)>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/sessions/{}/archive", self.base_url, session.id);
            let body = self.fetch(&url, credential).await?.bytes().await?;

            let archive = dest.join(format!("{}.zip", local_dir_name(session)));
            tokio::fs::write(&archive, &body).await?;

            let root = dest.join(local_dir_name(session));
            let (zip_path, extract_to) = (archive.clone(), root.clone());
            tokio::task::spawn_blocking(move || extract_archive(&zip_path, &extract_to))
                .await
                .map_err(|err| AppError::Archive(format!("unpack task failed: {err}")))??;
            tokio::fs::remove_file(&archive).await?;

            info!(session = %session.name, bytes = body.len(), "remote session downloaded");
            Ok((
                root,
                RemoteMetadata {
                    session_id: session.id.clone(),
                    session_name: session.name.clone(),
                    archive_bytes: body.len(),
                },
            ))
        })
    }

    fn upload<'a>(
        &'a self,
        local_file: &'a Path,
        credential: &'a Credential,
        metadata: &'a RemoteMetadata,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let name = local_file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    AppError::Storage(format!("{} has no file name", local_file.display()))
                })?;
            let body = tokio::fs::read(local_file).await?;
            let digest = sha256_hex(&body);

            let url = format!(
                "{}/sessions/{}/files/{name}",
                self.base_url, metadata.session_id
            );
            let response = self
                .client
                .put(&url)
                .bearer_auth(credential.expose())
                .header(CONTENT_SHA256_HEADER, &digest)
                .body(body)
                .send()
                .await?;
            ensure_success(&url, response)?;
            debug!(session = %metadata.session_name, file = %name, "uploaded");
            Ok(())
        })
    }
}
