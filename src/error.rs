// Error taxonomy shared by the channel client, snapshot writer, merge engine and report builder.

use std::path::PathBuf;

use thiserror::Error;

use crate::merge::MergeConflict;

#[derive(Debug, Error)]
pub enum StatError {
    /// Stat socket missing, refused, or the connect timed out.
    #[error("connection error ({path}): {reason}")]
    Connection { path: PathBuf, reason: String },

    /// Framing violation: bad size header, short read, rejected ack, or a stalled exchange.
    #[error("protocol error ({command}): {reason}")]
    Protocol { command: String, reason: String },

    #[error("storage error ({path}): {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error ({path}): {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflict),
}

impl StatError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(command: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = StatError> = std::result::Result<T, E>;
