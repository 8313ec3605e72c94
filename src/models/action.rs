//! Annotation actions a job can run over its sessions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Closed set of annotation passes.
///
/// Adding a variant forces every `match` in the dispatcher to handle it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Speech-to-text over each per-trial audio artifact.
    Transcribe,
    /// Row-wise translation of the transcription.
    Translate,
    /// Row-wise interlinear glossing of the transcription.
    Gloss,
    /// Row-wise native-script to Latin transliteration.
    Transliterate,
    /// Move the obligatory ledger columns to the front.
    ReorderColumns,
}

impl Action {
    /// Every action, in the order they are usually run.
    pub const ALL: [Self; 5] = [
        Self::Transcribe,
        Self::Translate,
        Self::Gloss,
        Self::Transliterate,
        Self::ReorderColumns,
    ];

    /// Canonical wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
            Self::Gloss => "gloss",
            Self::Transliterate => "transliterate",
            Self::ReorderColumns => "reorder_columns",
        }
    }

    /// Whether the pass calls an external model backend.
    #[must_use]
    pub fn uses_model(self) -> bool {
        !matches!(self, Self::ReorderColumns)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "transcribe" | "transcription" => Ok(Self::Transcribe),
            "translate" | "translation" => Ok(Self::Translate),
            "gloss" | "glossing" => Ok(Self::Gloss),
            "transliterate" | "transliteration" => Ok(Self::Transliterate),
            "reorder_columns" | "reorder" => Ok(Self::ReorderColumns),
            _ => Err(AppError::InvalidAction(format!("unknown action '{}'", raw.trim()))),
        }
    }
}
