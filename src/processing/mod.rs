//! Annotation passes over a single session folder.
//!
//! The [`dispatcher`] turns a job request into one boxed
//! [`SessionProcessor`]. A processor's only side effects are mutating the
//! session's ledger and appending to its [`session_log`].

pub mod backend;
pub mod dispatcher;
pub mod reorder;
pub mod row_pass;
pub mod session_log;
pub mod transcribe;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Language;
use crate::ledger::LedgerStore;
use crate::models::action::Action;
use crate::models::progress::ProgressHandle;
use crate::{AppError, Result};

use self::session_log::{LogLevel, SessionLog};

/// One ledger-mutation pass over a session folder.
pub trait SessionProcessor: Send {
    /// Run the pass over `session`.
    ///
    /// Per-artifact failures are reported and skipped; an `Err` means the
    /// pass as a whole could not run (e.g. the ledger is unreadable).
    ///
    /// # Errors
    ///
    /// Returns an error if the session's ledger cannot be located, loaded,
    /// or saved.
    fn process(&mut self, session: &Path) -> Result<()>;
}

/// Settings shared by every pass.
#[derive(Clone)]
pub struct PassSettings {
    /// Action being run.
    pub action: Action,
    /// Resolved session language.
    pub language: Language,
    /// Glob identifying the ledger inside a session.
    pub ledger_pattern: String,
    /// Ledger persistence.
    pub store: Arc<dyn LedgerStore>,
    /// Job progress channel.
    pub progress: ProgressHandle,
}

/// Reports pass events to both the session log and the progress channel.
pub struct PassReporter {
    log: SessionLog,
    progress: ProgressHandle,
    session: String,
}

impl PassReporter {
    /// Open the session log of `session` for `settings.action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the session log cannot be opened.
    pub fn open(session: &Path, settings: &PassSettings) -> Result<Self> {
        Ok(Self {
            log: SessionLog::open(session, settings.action)?,
            progress: settings.progress.clone(),
            session: session_name(session),
        })
    }

    /// Normal progress.
    pub fn info(&mut self, message: &str) {
        info!(session = %self.session, "{message}");
        self.log.write(LogLevel::Info, message);
        self.progress.status(format!("{}: {message}", self.session));
    }

    /// An item was skipped without mutation.
    pub fn skip(&mut self, item: &str, reason: &str) {
        warn!(session = %self.session, item, reason, "skipped");
        let message = format!("skipped {item}: {reason}");
        self.log.write(LogLevel::Skip, &message);
        self.progress.status(format!("{}: {message}", self.session));
    }

    /// An item failed; the pass continues with the next one.
    pub fn error(&mut self, item: &str, detail: &str) {
        warn!(session = %self.session, item, detail, "item failed");
        let message = format!("{item}: {detail}");
        self.log.write(LogLevel::Error, &message);
        self.progress.error(format!("{}: {message}", self.session));
    }
}

/// Display name of a session folder.
#[must_use]
pub fn session_name(session: &Path) -> String {
    session.file_name().map_or_else(
        || session.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Whether `path` ends in one of `extensions`, ignoring case.
#[must_use]
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Regular files below `root` accepted by `keep`, sorted by path.
///
/// Symlinks are never followed. A directory below `root` for which `prune`
/// returns true is not entered.
///
/// # Errors
///
/// Returns `AppError::Io` if the tree cannot be walked.
pub fn walk_files(
    root: &Path,
    keep: impl Fn(&Path) -> bool,
    prune: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || !prune(entry.path())
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry
            .map_err(|err| AppError::Io(format!("failed to walk {}: {err}", root.display())))?;
        if entry.file_type().is_file() && keep(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}
