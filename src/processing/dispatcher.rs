//! Maps a job request to the processor that runs it.

use std::sync::Arc;

use super::backend::Backends;
use super::reorder::ReorderPass;
use super::row_pass::{RowTask, RowTextPass};
use super::transcribe::TranscribePass;
use super::{PassSettings, SessionProcessor};
use crate::config::GlobalConfig;
use crate::ledger::LedgerStore;
use crate::models::action::Action;
use crate::models::job::JobRequest;
use crate::models::progress::ProgressHandle;
use crate::{AppError, Result};

/// Builds one [`SessionProcessor`] per job.
pub struct ProcessorDispatcher {
    config: Arc<GlobalConfig>,
    backends: Backends,
    store: Arc<dyn LedgerStore>,
    progress: ProgressHandle,
}

impl ProcessorDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        backends: Backends,
        store: Arc<dyn LedgerStore>,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            config,
            backends,
            store,
            progress,
        }
    }

    /// Resolve `request` into a ready processor.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the language is not supported or the
    /// action has no model backend configured.
    pub fn build(&self, request: &JobRequest) -> Result<Box<dyn SessionProcessor>> {
        let language = self
            .config
            .find_language(&request.language)
            .cloned()
            .ok_or_else(|| {
                AppError::Config(format!("unsupported language '{}'", request.language))
            })?;

        let settings = PassSettings {
            action: request.action,
            language,
            ledger_pattern: self.config.ledger_pattern.clone(),
            store: Arc::clone(&self.store),
            progress: self.progress.clone(),
        };
        let model_name = request.model.clone();
        let instruction = request.instruction.clone();

        let processor: Box<dyn SessionProcessor> = match request.action {
            Action::Transcribe => Box::new(TranscribePass::new(
                settings,
                self.backends.get(Action::Transcribe)?,
                model_name,
                instruction,
                self.config.artifact_extensions.clone(),
            )?),
            Action::Translate => Box::new(RowTextPass::new(
                settings,
                RowTask::Translate,
                self.backends.get(Action::Translate)?,
                model_name,
                instruction,
            )),
            Action::Gloss => Box::new(RowTextPass::new(
                settings,
                RowTask::Gloss,
                self.backends.get(Action::Gloss)?,
                model_name,
                instruction,
            )),
            Action::Transliterate => Box::new(RowTextPass::new(
                settings,
                RowTask::Transliterate,
                self.backends.get(Action::Transliterate)?,
                model_name,
                instruction,
            )),
            Action::ReorderColumns => Box::new(ReorderPass::new(
                settings,
                self.config.obligatory_columns.clone(),
            )),
        };
        Ok(processor)
    }
}
