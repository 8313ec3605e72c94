//! Progress messages and the ordered channel that carries them.
//!
//! Every message has a plain-text display form, which is what clients see on
//! the event stream, and a tagged JSON form used on the worker's stdout.
//!
//! | Display form            | Variant                              |
//! |-------------------------|--------------------------------------|
//! | `[DONE ALL]`            | [`ProgressMessage::Done`]            |
//! | `[CANCELLED]`           | [`ProgressMessage::Cancelled`]       |
//! | `[ZIP PATH] <path>`     | [`ProgressMessage::ResultLocation`]  |
//! | `[ERROR] <detail>`      | [`ProgressMessage::Error`]           |
//! | *(anything else)*       | [`ProgressMessage::Status`]          |

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Terminal sentinel closing every progress stream.
pub const DONE_SENTINEL: &str = "[DONE ALL]";

/// Marker posted when a job stops because it was cancelled.
pub const CANCELLED_MARKER: &str = "[CANCELLED]";

/// Prefix of error messages.
pub const ERROR_PREFIX: &str = "[ERROR]";

/// Prefix of the result-location announcement.
pub const RESULT_PREFIX: &str = "[ZIP PATH]";

/// One element of a job's ordered progress sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// Human-readable status line.
    Status {
        /// Message text.
        text: String,
    },
    /// A failure somewhere in the job; the job may or may not continue.
    Error {
        /// Diagnostic detail.
        text: String,
    },
    /// Location of the packaged result on the worker host.
    ResultLocation {
        /// Absolute path of the result archive.
        path: PathBuf,
    },
    /// The job observed a cancellation request.
    Cancelled,
    /// End of stream.
    Done,
}

impl ProgressMessage {
    /// Build a status message.
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status { text: text.into() }
    }

    /// Build an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }
}

impl Display for ProgressMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { text } => f.write_str(text),
            Self::Error { text } => write!(f, "{ERROR_PREFIX} {text}"),
            Self::ResultLocation { path } => write!(f, "{RESULT_PREFIX} {}", path.display()),
            Self::Cancelled => f.write_str(CANCELLED_MARKER),
            Self::Done => f.write_str(DONE_SENTINEL),
        }
    }
}

/// Producer end of a progress channel.
pub type ProgressSender = mpsc::UnboundedSender<ProgressMessage>;

/// Consumer end of a progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressMessage>;

/// Create a fresh, unbounded, order-preserving progress channel.
#[must_use]
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Cloneable posting handle used by everything that reports progress.
///
/// Posting never fails: once the consumer is gone there is nobody left to
/// inform, so the message is dropped and logged at `DEBUG`.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    tx: ProgressSender,
}

impl ProgressHandle {
    /// Wrap a channel sender.
    #[must_use]
    pub fn new(tx: ProgressSender) -> Self {
        Self { tx }
    }

    /// Post any message.
    pub fn post(&self, message: ProgressMessage) {
        if let Err(err) = self.tx.send(message) {
            debug!(message = %err.0, "progress consumer gone, dropping message");
        }
    }

    /// Post a status line.
    pub fn status(&self, text: impl Into<String>) {
        self.post(ProgressMessage::status(text));
    }

    /// Post an error line.
    pub fn error(&self, text: impl Into<String>) {
        self.post(ProgressMessage::error(text));
    }
}
