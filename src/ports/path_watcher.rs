//! Path watcher port (trait).
//! One blocking check for a modification to a single file.

use crate::cancel::CancelToken;
use crate::error::WatchError;
use std::path::Path;

/// Port for watching one file through its parent directory.
pub trait PathWatcher: Send + Sync {
    /// Block until a modification batch arrives in `target`'s parent
    /// directory, then report whether the batch touched `target` itself.
    ///
    /// Must return `Err(WatchError::Interrupted)` promptly once `cancel`
    /// fires, and must release any OS registration on every exit path.
    fn watch_once(&self, target: &Path, cancel: &CancelToken) -> Result<bool, WatchError>;
}
