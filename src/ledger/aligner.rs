//! Artifact-to-row alignment.
//!
//! Given an artifact filename and the text a model produced for it, find the
//! ledger row(s) the artifact belongs to and append the text there:
//!
//! 1. Rows containing a cell exactly equal to the filename (pre-registered
//!    filenames) all receive `"{n}: {text} "`.
//! 2. Otherwise the filename is parsed for `blockNr_<b>_taskNr_<t>_trialNr_<r>`.
//!    The unique row with that key records the filename in its first free
//!    `missing_filename_N` slot and receives `"{n}: {text} - "`.
//! 3. Anything else is skipped and reported, never dropped silently.
//!
//! Text is only ever appended, so repeated runs accumulate.

use regex::Regex;
use tracing::{debug, warn};

use super::{
    missing_filename_column, Ledger, RowKey, AUTO_TRANSCRIPTION_COLUMN,
    LATIN_TRANSCRIPTION_COLUMN, MISSING_FILENAME_SLOTS, NATIVE_TRANSCRIPTION_COLUMN,
};
use crate::config::Script;
use crate::{AppError, Result};

const FILENAME_PATTERN: &str = r"(?i)blockNr_(\d+)_taskNr_(\d+)_trialNr_(\d+)";

/// Why an artifact could not be aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Filename is neither in the ledger nor in structural form.
    UnparseableName,
    /// Structural key parsed but no row carries it.
    NoMatchingRow(RowKey),
    /// Structural key parsed but several rows carry it.
    AmbiguousKey(RowKey, usize),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnparseableName => {
                f.write_str("filename not in ledger and has no block/task/trial pattern")
            }
            Self::NoMatchingRow(key) => write!(
                f,
                "no ledger row for block {} task {} trial {}",
                key.block, key.task, key.trial
            ),
            Self::AmbiguousKey(key, count) => write!(
                f,
                "{count} ledger rows share block {} task {} trial {}",
                key.block, key.task, key.trial
            ),
        }
    }
}

/// Result of aligning one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignOutcome {
    /// Filename found verbatim; every listed row was updated.
    Direct {
        /// Updated row indices.
        rows: Vec<usize>,
    },
    /// Row derived from the structural filename pattern.
    Derived {
        /// Updated row index.
        row: usize,
        /// 1-based audit slot the filename was written to; `None` if all were full.
        slot: Option<usize>,
    },
    /// No mutation happened.
    Skipped(SkipReason),
}

/// Matches artifacts to ledger rows for one session.
#[derive(Debug, Clone)]
pub struct SessionRowAligner {
    pattern: Regex,
    companion_column: &'static str,
}

impl SessionRowAligner {
    /// Build an aligner for a language written in `script`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the filename pattern fails to compile.
    pub fn new(script: Script) -> Result<Self> {
        let pattern = Regex::new(FILENAME_PATTERN)
            .map_err(|err| AppError::Config(format!("invalid filename pattern: {err}")))?;
        Ok(Self {
            pattern,
            companion_column: companion_column(script),
        })
    }

    /// Column mirroring the running transcript for this language.
    #[must_use]
    pub fn companion_column(&self) -> &'static str {
        self.companion_column
    }

    /// Extract the block/task/trial key encoded in a filename.
    #[must_use]
    pub fn parse_filename(&self, filename: &str) -> Option<RowKey> {
        let caps = self.pattern.captures(filename)?;
        Some(RowKey::new(
            caps.get(1)?.as_str().parse().ok()?,
            caps.get(2)?.as_str().parse().ok()?,
            caps.get(3)?.as_str().parse().ok()?,
        ))
    }

    /// Append `text` for artifact `filename` as entry number `counter`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if a cell update fails.
    pub fn align(
        &self,
        ledger: &mut Ledger,
        filename: &str,
        counter: usize,
        text: &str,
    ) -> Result<AlignOutcome> {
        let direct = ledger.rows_with_value(filename);
        if !direct.is_empty() {
            let entry = format!("{counter}: {text} ");
            for &row in &direct {
                self.append_entry(ledger, row, &entry)?;
            }
            debug!(filename, rows = direct.len(), "artifact matched verbatim");
            return Ok(AlignOutcome::Direct { rows: direct });
        }

        let Some(key) = self.parse_filename(filename) else {
            return Ok(AlignOutcome::Skipped(SkipReason::UnparseableName));
        };

        let rows = ledger.rows_with_key(key);
        let row = match rows.as_slice() {
            [] => return Ok(AlignOutcome::Skipped(SkipReason::NoMatchingRow(key))),
            [row] => *row,
            many => {
                return Ok(AlignOutcome::Skipped(SkipReason::AmbiguousKey(
                    key,
                    many.len(),
                )))
            }
        };

        let slot = record_missing_filename(ledger, row, filename)?;
        if slot.is_none() {
            warn!(
                filename,
                row, "all missing_filename slots are taken, filename not recorded"
            );
        }

        let entry = format!("{counter}: {text} - ");
        self.append_entry(ledger, row, &entry)?;
        debug!(filename, row, ?slot, "artifact matched by structural key");
        Ok(AlignOutcome::Derived { row, slot })
    }

    fn append_entry(&self, ledger: &mut Ledger, row: usize, entry: &str) -> Result<()> {
        ledger.append_to_cell(row, AUTO_TRANSCRIPTION_COLUMN, entry)?;
        ledger.append_to_cell(row, self.companion_column, entry)
    }
}

/// Companion transcript column for a script.
#[must_use]
pub fn companion_column(script: Script) -> &'static str {
    match script {
        Script::Latin => LATIN_TRANSCRIPTION_COLUMN,
        Script::Native => NATIVE_TRANSCRIPTION_COLUMN,
    }
}

/// Write `filename` into the first empty or absent audit slot of `row`.
fn record_missing_filename(ledger: &mut Ledger, row: usize, filename: &str) -> Result<Option<usize>> {
    for n in 1..=MISSING_FILENAME_SLOTS {
        let column = missing_filename_column(n);
        let free = ledger
            .cell(row, &column)
            .is_none_or(|value| value.trim().is_empty());
        if free {
            ledger.set_cell(row, &column, filename)?;
            return Ok(Some(n));
        }
    }
    Ok(None)
}
