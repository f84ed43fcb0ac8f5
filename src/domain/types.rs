//! Pure data types for the watch domain.
//! No I/O here; loading and watching live in adapters and the app.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// The file currently being watched.
///
/// The control thread swaps in a whole new `Arc<PathBuf>`; readers clone the
/// `Arc` they find. A reader therefore sees either the old path or the new
/// one, never a mix.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    current: Arc<RwLock<Arc<PathBuf>>>,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(path.into()))),
        }
    }

    /// Immutable view of the path as of now.
    pub fn snapshot(&self) -> Arc<PathBuf> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, path: impl Into<PathBuf>) {
        let next = Arc::new(path.into());
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
    }
}

/// Lifecycle of a watch handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// A loaded stylesheet as handed to the presentation side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    pub path: PathBuf,
    pub contents: String,
    pub loaded_at: DateTime<Local>,
}

impl Stylesheet {
    pub fn new(path: impl Into<PathBuf>, contents: String, loaded_at: DateTime<Local>) -> Self {
        Self {
            path: path.into(),
            contents,
            loaded_at,
        }
    }

    /// `file:///` URL for the sheet, with Windows separators normalised.
    pub fn url(&self) -> String {
        stylesheet_url(&self.path)
    }

    /// Number of rule blocks, counted by opening braces.
    pub fn rule_count(&self) -> usize {
        self.contents.matches('{').count()
    }
}

pub fn stylesheet_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    format!("file:///{}", normalized.trim_start_matches('/'))
}
