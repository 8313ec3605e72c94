//! Column reorder pass.

use std::path::Path;

use super::{PassReporter, PassSettings, SessionProcessor};
use crate::ledger::locate_ledger;
use crate::Result;

/// Moves the obligatory columns to the front of a session's ledger.
///
/// Cell values are never touched; columns not in `front` keep their
/// relative order after the obligatory block.
pub struct ReorderPass {
    settings: PassSettings,
    front: Vec<String>,
}

impl ReorderPass {
    /// Build the pass for the configured column order.
    #[must_use]
    pub fn new(settings: PassSettings, front: Vec<String>) -> Self {
        Self { settings, front }
    }
}

impl SessionProcessor for ReorderPass {
    fn process(&mut self, session: &Path) -> Result<()> {
        let mut reporter = PassReporter::open(session, &self.settings)?;
        let ledger_path = locate_ledger(session, &self.settings.ledger_pattern)?;
        let mut ledger = self.settings.store.load(&ledger_path)?;

        ledger.reorder_columns(&self.front);
        self.settings.store.save(&ledger, &ledger_path)?;

        reporter.info(&format!(
            "reordered {} column(s), {} leading",
            ledger.columns().len(),
            self.front.len()
        ));
        Ok(())
    }
}
