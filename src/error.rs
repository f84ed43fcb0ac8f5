//! Error taxonomy for the watch core.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The target's parent directory could not be registered with the OS.
    #[error("cannot watch {}: {reason}", path.display())]
    PathNotWatchable { path: PathBuf, reason: String },

    /// The wait was cancelled by a restart or stop.
    #[error("watch cycle interrupted")]
    Interrupted,

    /// Any other backend failure. The cycle counts as "no change".
    #[error("unexpected watch failure: {0}")]
    UnexpectedIo(String),

    #[error("failed to spawn watch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl WatchError {
    pub fn not_watchable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        WatchError::PathNotWatchable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(err: notify::Error) -> Self {
        WatchError::UnexpectedIo(err.to_string())
    }
}
