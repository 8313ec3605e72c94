//! CSV-backed [`LedgerStore`].
//!
//! Saves write to a temporary file in the ledger's directory and then
//! atomically rename it over the original, so an interrupted job never
//! leaves a half-written ledger behind.

use std::path::Path;

use tempfile::NamedTempFile;

use super::{Ledger, LedgerStore};
use crate::{AppError, Result};

const UTF8_BOM: char = '\u{feff}';

/// Ledger store reading and writing comma-separated files with a header row.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    obligatory_columns: Vec<String>,
}

impl CsvLedgerStore {
    /// Create a store that keeps `obligatory_columns` on every save.
    #[must_use]
    pub fn new(obligatory_columns: Vec<String>) -> Self {
        Self { obligatory_columns }
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self, path: &Path) -> Result<Ledger> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|err| {
                AppError::Ledger(format!("failed to open {}: {err}", path.display()))
            })?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if idx == 0 {
                    name.trim_start_matches(UTF8_BOM).to_owned()
                } else {
                    name.to_owned()
                }
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| {
                AppError::Ledger(format!("malformed row in {}: {err}", path.display()))
            })?;
            rows.push(record.iter().map(str::to_owned).collect());
        }

        Ok(Ledger::from_parts(columns, rows))
    }

    fn save(&self, ledger: &Ledger, path: &Path) -> Result<()> {
        let mut ledger = ledger.clone();
        ledger.ensure_columns(&self.obligatory_columns);

        let parent = path
            .parent()
            .ok_or_else(|| AppError::Ledger("ledger path has no parent directory".into()))?;
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Ledger(format!("failed to create temporary file: {err}")))?;

        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            writer.write_record(ledger.columns())?;
            for row in ledger.rows() {
                writer.write_record(row)?;
            }
            writer
                .flush()
                .map_err(|err| AppError::Ledger(format!("failed to flush ledger: {err}")))?;
        }

        tmp.persist(path).map_err(|err| {
            AppError::Ledger(format!(
                "failed to persist ledger to {}: {err}",
                path.display()
            ))
        })?;
        Ok(())
    }
}
