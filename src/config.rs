//! Global configuration parsing and validation.
//!
//! The configuration is loaded once by the server, validated, and then handed
//! explicitly to every component that needs it. Worker processes receive a
//! serialized copy as part of their start-up spec, so every type here is both
//! `Deserialize` and `Serialize`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ledger::{BLOCK_COLUMN, TASK_COLUMN, TRIAL_COLUMN};
use crate::{AppError, Result};

/// Writing system a language's ledgers are kept in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    /// Latin alphabet (possibly with diacritics).
    Latin,
    /// Any non-Latin native writing system.
    Native,
}

/// One supported elicitation language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Language {
    /// Display name, e.g. `German`.
    pub name: String,
    /// Short code handed to model backends, e.g. `de`.
    pub code: String,
    /// Script used in this language's ledgers.
    pub script: Script,
}

/// External command backing one annotation model.
///
/// `args` may contain the placeholders `{input}`, `{language}`,
/// `{language_code}`, `{model}` and `{instruction}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Program to execute.
    pub program: String,
    /// Argument template.
    #[serde(default)]
    pub args: Vec<String>,
    /// Model name used when the job does not override it.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Upper bound for a single invocation.
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

fn default_backend_timeout() -> u64 {
    600
}

/// Model backends keyed by the pass that uses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendsConfig {
    /// Speech-to-text backend used by the transcription pass.
    #[serde(default)]
    pub transcribe: Option<BackendConfig>,
    /// Text translation backend.
    #[serde(default)]
    pub translate: Option<BackendConfig>,
    /// Interlinear glossing backend.
    #[serde(default)]
    pub gloss: Option<BackendConfig>,
    /// Native-script to Latin transliteration backend.
    #[serde(default)]
    pub transliterate: Option<BackendConfig>,
}

/// Remote storage endpoint used by remote-folder jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RemoteConfig {
    /// Base URL of the file API, without trailing slash.
    pub base_url: String,
    /// Request timeout for a single API call.
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,
}

fn default_remote_timeout() -> u64 {
    300
}

fn default_http_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("session-annotator")
}

fn default_max_concurrent_jobs() -> u32 {
    4
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}

fn default_ledger_pattern() -> String {
    "*.csv".into()
}

fn default_artifact_extensions() -> Vec<String> {
    ["wav", "mp3", "m4a", "ogg", "flac"]
        .iter()
        .map(|ext| (*ext).to_owned())
        .collect()
}

fn default_obligatory_columns() -> Vec<String> {
    [BLOCK_COLUMN, TASK_COLUMN, TRIAL_COLUMN, "transcription"]
        .iter()
        .map(|col| (*col).to_owned())
        .collect()
}

fn default_languages() -> Vec<Language> {
    [
        ("German", "de", Script::Latin),
        ("English", "en", Script::Latin),
        ("French", "fr", Script::Latin),
        ("Russian", "ru", Script::Native),
        ("Greek", "el", Script::Native),
        ("Georgian", "ka", Script::Native),
    ]
    .into_iter()
    .map(|(name, code, script)| Language {
        name: name.to_owned(),
        code: code.to_owned(),
        script,
    })
    .collect()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the job API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Interface the job API binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Directory under which every job gets its own scratch workspace.
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,
    /// Worker executable; defaults to the running binary.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
    /// Maximum number of concurrently running worker processes.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    /// Largest accepted job submission body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Glob (relative to a session folder) that identifies its ledger file.
    #[serde(default = "default_ledger_pattern")]
    pub ledger_pattern: String,
    /// File extensions treated as per-trial artifacts by the transcription pass.
    #[serde(default = "default_artifact_extensions")]
    pub artifact_extensions: Vec<String>,
    /// Columns every saved ledger must carry, in canonical order.
    #[serde(default = "default_obligatory_columns")]
    pub obligatory_columns: Vec<String>,
    /// Supported languages.
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,
    /// Model backends per annotation pass.
    #[serde(default)]
    pub backends: BackendsConfig,
    /// Remote storage endpoint; remote-folder jobs are rejected without it.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a language by display name or code, ignoring case.
    #[must_use]
    pub fn find_language(&self, name_or_code: &str) -> Option<&Language> {
        let wanted = name_or_code.trim();
        self.languages.iter().find(|lang| {
            lang.name.eq_ignore_ascii_case(wanted) || lang.code.eq_ignore_ascii_case(wanted)
        })
    }

    /// Scratch workspace for a single job.
    #[must_use]
    pub fn job_workspace(&self, job_id: &str) -> PathBuf {
        self.scratch_root.join(job_id)
    }

    fn validate(&mut self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(AppError::Config(
                "max_concurrent_jobs must be greater than zero".into(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "max_upload_bytes must be greater than zero".into(),
            ));
        }

        if self.languages.is_empty() {
            return Err(AppError::Config("languages must not be empty".into()));
        }

        for (idx, lang) in self.languages.iter().enumerate() {
            let duplicate = self.languages[..idx]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&lang.name));
            if duplicate {
                return Err(AppError::Config(format!(
                    "language '{}' is listed more than once",
                    lang.name
                )));
            }
        }

        for key in [BLOCK_COLUMN, TASK_COLUMN, TRIAL_COLUMN] {
            if !self.obligatory_columns.iter().any(|col| col == key) {
                return Err(AppError::Config(format!(
                    "obligatory_columns must include key column '{key}'"
                )));
            }
        }

        glob::Pattern::new(&self.ledger_pattern).map_err(|err| {
            AppError::Config(format!(
                "ledger_pattern '{}' is not a valid glob: {err}",
                self.ledger_pattern
            ))
        })?;

        if let Some(ref remote) = self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(AppError::Config("remote.base_url must not be empty".into()));
            }
        }

        fs::create_dir_all(&self.scratch_root)
            .map_err(|err| AppError::Config(format!("scratch_root not creatable: {err}")))?;
        self.scratch_root = self
            .scratch_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("scratch_root invalid: {err}")))?;

        Ok(())
    }
}
