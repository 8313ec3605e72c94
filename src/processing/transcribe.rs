//! Transcription pass: one model call per audio artifact, aligned to ledger rows.

use std::path::Path;
use std::sync::Arc;

use super::backend::{ModelInput, ModelRequest, TextModel};
use super::{has_extension, walk_files, PassReporter, PassSettings, SessionProcessor};
use crate::ledger::aligner::{AlignOutcome, SessionRowAligner};
use crate::ledger::{holds_ledger, locate_ledger};
use crate::Result;

/// Transcribes every artifact in a session and appends the text to its row(s).
pub struct TranscribePass {
    settings: PassSettings,
    model: Arc<dyn TextModel>,
    model_name: Option<String>,
    instruction: Option<String>,
    aligner: SessionRowAligner,
    artifact_extensions: Vec<String>,
}

impl TranscribePass {
    /// Build the pass.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the row aligner cannot be built.
    pub fn new(
        settings: PassSettings,
        model: Arc<dyn TextModel>,
        model_name: Option<String>,
        instruction: Option<String>,
        artifact_extensions: Vec<String>,
    ) -> Result<Self> {
        let aligner = SessionRowAligner::new(settings.language.script)?;
        Ok(Self {
            settings,
            model,
            model_name,
            instruction,
            aligner,
            artifact_extensions,
        })
    }
}

impl SessionProcessor for TranscribePass {
    fn process(&mut self, session: &Path) -> Result<()> {
        let mut reporter = PassReporter::open(session, &self.settings)?;
        let ledger_path = locate_ledger(session, &self.settings.ledger_pattern)?;
        let mut ledger = self.settings.store.load(&ledger_path)?;
        // Nested folders with their own ledger are separate sessions.
        let artifacts = walk_files(
            session,
            |path| has_extension(path, &self.artifact_extensions),
            |dir| holds_ledger(dir, &self.settings.ledger_pattern),
        )?;

        reporter.info(&format!("found {} artifact(s)", artifacts.len()));

        let mut counter = 0usize;
        for artifact in &artifacts {
            let filename = artifact
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let request = ModelRequest {
                input: ModelInput::File(artifact),
                language: &self.settings.language,
                model: self.model_name.as_deref(),
                instruction: self.instruction.as_deref(),
            };
            let text = match self.model.run(&request) {
                Ok(text) => text,
                Err(err) => {
                    reporter.error(&filename, &err.to_string());
                    continue;
                }
            };

            counter += 1;
            match self.aligner.align(&mut ledger, &filename, counter, &text)? {
                AlignOutcome::Direct { rows } => {
                    reporter.info(&format!("{filename} -> {} row(s)", rows.len()));
                }
                AlignOutcome::Derived { row, slot } => {
                    let slot = slot.map_or_else(|| "no free slot".to_owned(), |n| format!("slot {n}"));
                    reporter.info(&format!(
                        "{filename} -> row {} by block/task/trial ({slot})",
                        row + 1
                    ));
                }
                AlignOutcome::Skipped(reason) => {
                    reporter.skip(&filename, &reason.to_string());
                    continue;
                }
            }
            self.settings.store.save(&ledger, &ledger_path)?;
        }

        reporter.info(&format!(
            "transcribed {counter} of {} artifact(s)",
            artifacts.len()
        ));
        Ok(())
    }
}
