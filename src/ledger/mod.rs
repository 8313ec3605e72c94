//! Session ledgers: the per-session table of trials and their annotations.
//!
//! A ledger is a rectangular table of string cells with a header row. Rows
//! are keyed by `(Block_Nr, Task_Nr, Trial_Nr)`. Annotation passes only ever
//! append to cells so a session can be processed any number of times.

pub mod aligner;
pub mod csv_store;

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{AppError, Result};

/// Block number key column.
pub const BLOCK_COLUMN: &str = "Block_Nr";
/// Task number key column.
pub const TASK_COLUMN: &str = "Task_Nr";
/// Trial number key column.
pub const TRIAL_COLUMN: &str = "Trial_Nr";

/// Human transcription, filled in by annotators.
pub const TRANSCRIPTION_COLUMN: &str = "transcription";
/// Running machine transcript, one `"{n}: {text}"` entry per processed artifact.
pub const AUTO_TRANSCRIPTION_COLUMN: &str = "automatic_transcription";
/// Companion transcript for Latin-script languages; also the transliteration target.
pub const LATIN_TRANSCRIPTION_COLUMN: &str = "latin_transcription";
/// Companion transcript for native-script languages.
pub const NATIVE_TRANSCRIPTION_COLUMN: &str = "original_script_transcription";
/// Machine translation.
pub const TRANSLATION_COLUMN: &str = "automatic_translation";
/// Machine interlinear gloss.
pub const GLOSS_COLUMN: &str = "automatic_glossing";

/// Number of `missing_filename_N` audit slots per row.
pub const MISSING_FILENAME_SLOTS: usize = 9;

/// Name of the `n`-th (1-based) missing-filename audit column.
#[must_use]
pub fn missing_filename_column(n: usize) -> String {
    format!("missing_filename_{n}")
}

/// Block/task/trial triple identifying one ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKey {
    /// Block number.
    pub block: u32,
    /// Task number within the block.
    pub task: u32,
    /// Trial number within the task.
    pub trial: u32,
}

impl RowKey {
    /// Construct a key.
    #[must_use]
    pub fn new(block: u32, task: u32, trial: u32) -> Self {
        Self { block, task, trial }
    }
}

/// In-memory ledger table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Ledger {
    /// Empty ledger with the given header.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a ledger from a header and raw rows.
    ///
    /// Short rows are padded. Empty cells past the header (trailing commas)
    /// are dropped; non-empty ones get an `unnamed_N` header column.
    #[must_use]
    pub fn from_parts(mut columns: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let used_width = rows
            .iter()
            .filter_map(|row| row.iter().rposition(|cell| !cell.is_empty()))
            .map(|last| last + 1)
            .max()
            .unwrap_or(0);
        for n in columns.len()..used_width {
            columns.push(format!("unnamed_{}", n + 1));
        }
        for row in &mut rows {
            row.resize(columns.len(), String::new());
        }
        Self { columns, rows }
    }

    /// Header names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    /// Position of a column, appending an empty one when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_owned());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }

    /// Append a row given as `(column, value)` pairs; unknown columns are added.
    pub fn push_row(&mut self, cells: &[(&str, &str)]) -> usize {
        let mut row = vec![String::new(); self.columns.len()];
        for (column, value) in cells {
            let idx = self.ensure_column(column);
            if row.len() <= idx {
                row.resize(idx + 1, String::new());
            }
            row[idx] = (*value).to_owned();
        }
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Cell value by row index and column name.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// Overwrite a cell, adding the column when needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if `row` is out of range.
    pub fn set_cell(&mut self, row: usize, column: &str, value: &str) -> Result<()> {
        let idx = self.ensure_column(column);
        let cells = self
            .rows
            .get_mut(row)
            .ok_or_else(|| AppError::Ledger(format!("row {row} out of range")))?;
        value.clone_into(&mut cells[idx]);
        Ok(())
    }

    /// Append `text` to a cell, adding the column when needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if `row` is out of range.
    pub fn append_to_cell(&mut self, row: usize, column: &str, text: &str) -> Result<()> {
        let idx = self.ensure_column(column);
        let cells = self
            .rows
            .get_mut(row)
            .ok_or_else(|| AppError::Ledger(format!("row {row} out of range")))?;
        cells[idx].push_str(text);
        Ok(())
    }

    /// Rows having at least one cell exactly equal to `value`.
    #[must_use]
    pub fn rows_with_value(&self, value: &str) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|cell| cell == value))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Parsed key of a row, if all three key cells hold whole numbers.
    #[must_use]
    pub fn row_key(&self, row: usize) -> Option<RowKey> {
        Some(RowKey {
            block: parse_key_cell(self.cell(row, BLOCK_COLUMN)?)?,
            task: parse_key_cell(self.cell(row, TASK_COLUMN)?)?,
            trial: parse_key_cell(self.cell(row, TRIAL_COLUMN)?)?,
        })
    }

    /// Rows whose key equals `key`.
    #[must_use]
    pub fn rows_with_key(&self, key: RowKey) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&row| self.row_key(row) == Some(key))
            .collect()
    }

    /// Add any of `columns` that are missing, in the given order.
    pub fn ensure_columns(&mut self, columns: &[String]) {
        for column in columns {
            self.ensure_column(column);
        }
    }

    /// Move `front` to the start of the header, keeping the relative order of
    /// everything else. Missing `front` columns are created empty.
    pub fn reorder_columns(&mut self, front: &[String]) {
        self.ensure_columns(front);

        let mut order: Vec<usize> = front
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        for idx in 0..self.columns.len() {
            if !order.contains(&idx) {
                order.push(idx);
            }
        }

        self.columns = order.iter().map(|&idx| self.columns[idx].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&idx| row[idx].clone()).collect();
        }
    }
}

/// Parse a key cell such as `3`, ` 03 ` or `3.0` (spreadsheet exports).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_key_cell(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u32>() {
        return Some(value);
    }
    let float = trimmed.parse::<f64>().ok()?;
    if float.fract() == 0.0 && float >= 0.0 && float <= f64::from(u32::MAX) {
        Some(float as u32)
    } else {
        None
    }
}

/// Persistence seam for ledgers.
///
/// Implementations must keep the configured obligatory columns present on
/// every save.
pub trait LedgerStore: Send + Sync {
    /// Read a ledger from `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the file cannot be read or parsed.
    fn load(&self, path: &Path) -> Result<Ledger>;

    /// Write `ledger` to `path`, replacing the previous contents atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the file cannot be written.
    fn save(&self, ledger: &Ledger, path: &Path) -> Result<()>;
}

/// Find the ledger file of a session folder.
///
/// # Errors
///
/// Returns `AppError::Ledger` if no file matches `pattern` or the pattern is invalid.
pub fn locate_ledger(session: &Path, pattern: &str) -> Result<PathBuf> {
    let mut matches = glob_files(session, pattern)?;
    matches.sort();
    let mut iter = matches.into_iter();
    let first = iter.next().ok_or_else(|| {
        AppError::Ledger(format!(
            "no ledger matching '{pattern}' in {}",
            session.display()
        ))
    })?;
    if let Some(extra) = iter.next() {
        warn!(
            session = %session.display(),
            chosen = %first.display(),
            ignored = %extra.display(),
            "session has more than one ledger candidate"
        );
    }
    Ok(first)
}

/// Every directory below `root` (inclusive) that holds a ledger, sorted.
///
/// # Errors
///
/// Returns `AppError::Ledger` if the pattern is invalid.
pub fn discover_sessions(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut folders: Vec<PathBuf> = glob_files(root, &format!("**/{pattern}"))?
        .into_iter()
        .filter_map(|file| file.parent().map(Path::to_path_buf))
        .collect();
    folders.sort();
    folders.dedup();
    Ok(folders)
}

/// Whether `dir` itself holds a ledger matching `pattern`.
#[must_use]
pub fn holds_ledger(dir: &Path, pattern: &str) -> bool {
    glob_files(dir, pattern).is_ok_and(|matches| !matches.is_empty())
}

fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    let paths = glob::glob(&full)
        .map_err(|err| AppError::Ledger(format!("invalid ledger pattern '{pattern}': {err}")))?;
    Ok(paths
        .filter_map(std::result::Result::ok)
        .filter(|path| path.symlink_metadata().is_ok_and(|meta| meta.is_file()))
        .collect())
}
