//! Persistent per-session log.
//!
//! Every pass appends timestamped lines to `<session>/annotation.log`. The
//! file is never truncated, so it accumulates the history of every run over
//! that session.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::models::action::Action;
use crate::{AppError, Result};

/// File name of the session log inside a session folder.
pub const SESSION_LOG_FILE: &str = "annotation.log";

/// Severity of a session log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Artifact or row skipped.
    Skip,
    /// Artifact, row, or pass failure.
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Skip => "SKIP",
            Self::Error => "ERROR",
        }
    }
}

/// Append-only writer for one session's log file.
pub struct SessionLog {
    path: PathBuf,
    action: Action,
    writer: BufWriter<File>,
}

impl SessionLog {
    /// Open (or create) the log of `session` for a pass of `action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened for appending.
    pub fn open(session: &Path, action: Action) -> Result<Self> {
        let path = session.join(SESSION_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AppError::Io(format!("failed to open session log {}: {e}", path.display()))
            })?;
        Ok(Self {
            path,
            action,
            writer: BufWriter::new(file),
        })
    }

    /// Append one line. Write failures are logged, never propagated.
    pub fn write(&mut self, level: LogLevel, message: &str) {
        let line = format!(
            "{} [{}] {} {}",
            Utc::now().to_rfc3339(),
            self.action,
            level.label(),
            message.replace('\n', " | ")
        );
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            warn!(path = %self.path.display(), "failed to write session log: {e}");
        }
    }
}
