//! Job submission payloads shared by the API layer and the worker process.

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::action::Action;
use crate::config::GlobalConfig;

/// Access credential for remote storage.
///
/// `Debug` never prints the secret so job structs can be logged freely.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw credential string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw secret, for building request headers only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// What to run over every session of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JobRequest {
    /// Annotation pass.
    pub action: Action,
    /// Language name or code, resolved against the configured languages.
    pub language: String,
    /// Free-text instruction forwarded to the model backend.
    #[serde(default)]
    pub instruction: Option<String>,
    /// Model name overriding the backend's default.
    #[serde(default)]
    pub model: Option<String>,
}

/// Where a job's sessions come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSource {
    /// An uploaded zip bundle stored in the job workspace.
    Archive {
        /// Path of the uploaded archive.
        archive: PathBuf,
    },
    /// A folder in remote storage whose sessions are fetched one by one.
    Remote {
        /// Remote folder reference.
        folder: String,
        /// Credential used for every download and upload.
        credential: Credential,
    },
}

impl JobSource {
    /// Credential carried by a remote source.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Archive { .. } => None,
            Self::Remote { credential, .. } => Some(credential),
        }
    }
}

/// Start-up instructions handed to a worker process as its first stdin line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerSpec {
    /// Job identifier, used for log correlation and result URLs.
    pub job_id: String,
    /// Pass to run.
    pub request: JobRequest,
    /// Where the sessions come from.
    pub source: JobSource,
    /// Scratch directory owned by this job.
    pub workspace: PathBuf,
    /// Validated server configuration.
    pub config: GlobalConfig,
}
