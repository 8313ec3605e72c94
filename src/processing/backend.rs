//! Model backends behind the annotation passes.
//!
//! Passes see models only through [`TextModel`]: give it an artifact file or a
//! piece of text, get text back. [`CommandModel`] is the shipped
//! implementation; it runs an external program per invocation.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::{BackendConfig, BackendsConfig, Language};
use crate::models::action::Action;
use crate::{AppError, Result};

/// What a model is asked to annotate.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    /// A per-trial artifact on disk (e.g. an audio recording).
    File(&'a Path),
    /// Text taken from a ledger cell.
    Text(&'a str),
}

/// One model invocation.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// Input to annotate.
    pub input: ModelInput<'a>,
    /// Language of the session.
    pub language: &'a Language,
    /// Model name override.
    pub model: Option<&'a str>,
    /// Free-text instruction.
    pub instruction: Option<&'a str>,
}

/// Opaque annotation model.
pub trait TextModel: Send + Sync {
    /// Produce text for `request`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Model` if the model cannot produce a result.
    fn run(&self, request: &ModelRequest<'_>) -> Result<String>;
}

/// Model backed by an external command.
///
/// Must be called from a blocking context inside a tokio runtime (such as
/// `spawn_blocking`); the child process itself is driven by tokio so the
/// configured timeout can kill it.
#[derive(Debug, Clone)]
pub struct CommandModel {
    name: String,
    config: BackendConfig,
}

impl CommandModel {
    /// Wrap a backend config; `name` is used in diagnostics.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BackendConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Expand the argument template for `request`.
    #[must_use]
    pub fn render_args(&self, request: &ModelRequest<'_>) -> Vec<String> {
        let input = match request.input {
            ModelInput::File(path) => path.to_string_lossy().into_owned(),
            ModelInput::Text(_) => "-".to_owned(),
        };
        let model = request
            .model
            .or(self.config.default_model.as_deref())
            .unwrap_or_default();
        let instruction = request.instruction.unwrap_or_default();

        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{language_code}", &request.language.code)
                    .replace("{language}", &request.language.name)
                    .replace("{model}", model)
                    .replace("{instruction}", instruction)
            })
            .collect()
    }

    async fn run_async(&self, args: Vec<String>, stdin_text: Option<String>) -> Result<String> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .stdin(if stdin_text.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Model(format!(
                "{}: failed to spawn '{}': {err}",
                self.name, self.config.program
            ))
        })?;

        if let Some(text) = stdin_text {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes()).await.map_err(|err| {
                    AppError::Model(format!("{}: failed to write input: {err}", self.name))
                })?;
            }
        }

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Model(format!("{}: timed out after {timeout:?}", self.name))
            })?
            .map_err(|err| AppError::Model(format!("{}: {err}", self.name)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Model(format!(
                "{}: exited with {}: {}",
                self.name,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

impl TextModel for CommandModel {
    fn run(&self, request: &ModelRequest<'_>) -> Result<String> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| AppError::Model(format!("{}: no async runtime: {err}", self.name)))?;
        let args = self.render_args(request);
        let stdin_text = match request.input {
            ModelInput::Text(text) => Some(text.to_owned()),
            ModelInput::File(_) => None,
        };
        debug!(backend = %self.name, program = %self.config.program, ?args, "running model command");
        handle.block_on(self.run_async(args, stdin_text))
    }
}

/// Model backends available to the dispatcher, keyed by action.
#[derive(Clone, Default)]
pub struct Backends {
    models: HashMap<Action, Arc<dyn TextModel>>,
}

impl Backends {
    /// Build command backends for every configured action.
    #[must_use]
    pub fn from_config(config: &BackendsConfig) -> Self {
        let mut backends = Self::default();
        let entries = [
            (Action::Transcribe, &config.transcribe),
            (Action::Translate, &config.translate),
            (Action::Gloss, &config.gloss),
            (Action::Transliterate, &config.transliterate),
        ];
        for (action, entry) in entries {
            if let Some(backend) = entry {
                backends = backends.with_model(
                    action,
                    Arc::new(CommandModel::new(action.as_str(), backend.clone())),
                );
            }
        }
        backends
    }

    /// Register (or replace) the model used by `action`.
    #[must_use]
    pub fn with_model(mut self, action: Action, model: Arc<dyn TextModel>) -> Self {
        self.models.insert(action, model);
        self
    }

    /// Model for `action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no backend is configured for it.
    pub fn get(&self, action: Action) -> Result<Arc<dyn TextModel>> {
        self.models
            .get(&action)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("no model backend configured for {action}")))
    }
}
