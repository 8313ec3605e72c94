//! Row-wise text passes: translation, glossing and transliteration.
//!
//! Each pass reads one source cell per ledger row, hands it to the model and
//! appends the result (`"{text} "`) to a target column. Rows with nothing to
//! read are left alone.

use std::path::Path;
use std::sync::Arc;

use super::backend::{ModelInput, ModelRequest, TextModel};
use super::{PassReporter, PassSettings, SessionProcessor};
use crate::config::Script;
use crate::ledger::{
    locate_ledger, Ledger, AUTO_TRANSCRIPTION_COLUMN, GLOSS_COLUMN, LATIN_TRANSCRIPTION_COLUMN,
    NATIVE_TRANSCRIPTION_COLUMN, TRANSCRIPTION_COLUMN, TRANSLATION_COLUMN,
};
use crate::Result;

/// Target language used by translation when the job names none.
pub const DEFAULT_TRANSLATION_TARGET: &str = "English";

/// Which row-wise pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTask {
    /// Translate the transcription.
    Translate,
    /// Gloss the transcription interlinearly.
    Gloss,
    /// Render a native-script transcription in Latin script.
    Transliterate,
}

impl RowTask {
    /// Columns tried in order for the source text.
    #[must_use]
    pub fn source_columns(self) -> [&'static str; 2] {
        match self {
            Self::Translate | Self::Gloss => [TRANSCRIPTION_COLUMN, AUTO_TRANSCRIPTION_COLUMN],
            Self::Transliterate => [NATIVE_TRANSCRIPTION_COLUMN, TRANSCRIPTION_COLUMN],
        }
    }

    /// Column receiving the model output.
    #[must_use]
    pub fn target_column(self) -> &'static str {
        match self {
            Self::Translate => TRANSLATION_COLUMN,
            Self::Gloss => GLOSS_COLUMN,
            Self::Transliterate => LATIN_TRANSCRIPTION_COLUMN,
        }
    }

    /// First non-blank source cell of `row`.
    #[must_use]
    pub fn source_text(self, ledger: &Ledger, row: usize) -> Option<String> {
        self.source_columns()
            .iter()
            .filter_map(|column| ledger.cell(row, column))
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_owned)
    }
}

/// Runs one [`RowTask`] over every row of a session's ledger.
pub struct RowTextPass {
    settings: PassSettings,
    task: RowTask,
    model: Arc<dyn TextModel>,
    model_name: Option<String>,
    instruction: Option<String>,
}

impl RowTextPass {
    /// Build the pass.
    ///
    /// Translation always carries an instruction naming the target language,
    /// falling back to [`DEFAULT_TRANSLATION_TARGET`].
    #[must_use]
    pub fn new(
        settings: PassSettings,
        task: RowTask,
        model: Arc<dyn TextModel>,
        model_name: Option<String>,
        instruction: Option<String>,
    ) -> Self {
        let instruction = match task {
            RowTask::Translate => Some(
                instruction
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TRANSLATION_TARGET.to_owned()),
            ),
            RowTask::Gloss | RowTask::Transliterate => instruction,
        };
        Self {
            settings,
            task,
            model,
            model_name,
            instruction,
        }
    }
}

impl SessionProcessor for RowTextPass {
    fn process(&mut self, session: &Path) -> Result<()> {
        let mut reporter = PassReporter::open(session, &self.settings)?;

        if self.task == RowTask::Transliterate && self.settings.language.script == Script::Latin {
            reporter.info(&format!(
                "{} is written in Latin script, nothing to transliterate",
                self.settings.language.name
            ));
            return Ok(());
        }

        let ledger_path = locate_ledger(session, &self.settings.ledger_pattern)?;
        let mut ledger = self.settings.store.load(&ledger_path)?;
        let target = self.task.target_column();

        let mut done = 0usize;
        let mut empty = 0usize;
        for row in 0..ledger.row_count() {
            let Some(source) = self.task.source_text(&ledger, row) else {
                empty += 1;
                continue;
            };

            let request = ModelRequest {
                input: ModelInput::Text(&source),
                language: &self.settings.language,
                model: self.model_name.as_deref(),
                instruction: self.instruction.as_deref(),
            };
            let text = match self.model.run(&request) {
                Ok(text) => text,
                Err(err) => {
                    reporter.error(&format!("row {}", row + 1), &err.to_string());
                    continue;
                }
            };

            ledger.append_to_cell(row, target, &format!("{text} "))?;
            self.settings.store.save(&ledger, &ledger_path)?;
            done += 1;
        }

        reporter.info(&format!(
            "{} {done} of {} row(s) into {target} ({empty} without source text)",
            self.settings.action,
            ledger.row_count()
        ));
        Ok(())
    }
}
