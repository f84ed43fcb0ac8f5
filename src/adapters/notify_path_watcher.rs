//! Notify implementation of the PathWatcher port.

use crate::cancel::CancelToken;
use crate::domain::batch_touches_target;
use crate::error::WatchError;
use crate::ports::PathWatcher;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

type EventResult = Result<Event, notify::Error>;

pub struct NotifyPathWatcher {
    /// Longest stretch the wait blocks before re-checking cancellation.
    poll_interval: Duration,
}

impl NotifyPathWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Block until the first modify event arrives or the token is cancelled.
    fn next_modify(&self, rx: &Receiver<EventResult>, cancel: &CancelToken) -> Result<Event, WatchError> {
        loop {
            if cancel.is_cancelled() {
                return Err(WatchError::Interrupted);
            }
            match rx.recv_timeout(self.poll_interval) {
                Ok(Ok(event)) if event.kind.is_modify() => return Ok(event),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatchError::UnexpectedIo("event channel closed".to_string()))
                }
            }
        }
    }
}

impl Default for NotifyPathWatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl PathWatcher for NotifyPathWatcher {
    fn watch_once(&self, target: &Path, cancel: &CancelToken) -> Result<bool, WatchError> {
        let file_name = target
            .file_name()
            .ok_or_else(|| WatchError::not_watchable(target, "path has no file name"))?;
        let parent = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => return Err(WatchError::not_watchable(target, "path has no parent directory")),
        };

        info!(
            file = %file_name.to_string_lossy(),
            dir = %parent.display(),
            "watching"
        );

        let (event_tx, event_rx) = mpsc::channel::<EventResult>();

        // Dropping `watcher` on any return below releases the OS registration.
        let mut watcher = RecommendedWatcher::new(
            move |res: EventResult| {
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;

        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(|err| WatchError::not_watchable(parent, err))?;

        let first = self.next_modify(&event_rx, cancel)?;

        // Whatever is already queued belongs to the same batch.
        let mut batch = vec![first];
        while let Ok(res) = event_rx.try_recv() {
            match res {
                Ok(event) if event.kind.is_modify() => batch.push(event),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "watch backend reported an error mid-batch"),
            }
        }

        let changed = batch_touches_target(
            file_name,
            batch
                .iter()
                .flat_map(|event| event.paths.iter().map(PathBuf::as_path)),
        );

        debug!(
            events = batch.len(),
            changed,
            "event batch for {}",
            target.display()
        );

        Ok(changed)
    }
}
