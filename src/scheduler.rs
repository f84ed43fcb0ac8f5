//! Polling scheduler: drives a `PathWatcher` cycle after cycle on a worker
//! thread and hands every result back to the control thread.
//!
//! The worker never calls user callbacks. It posts notices on a channel
//! and the control thread drains them with `dispatch_pending` or
//! `dispatch_blocking`. Notices from a run that has since been restarted or
//! stopped are dropped on the floor, so a cancelled cycle never reaches a
//! callback.

use crate::cancel::{CancelSource, CancelToken};
use crate::domain::{SchedulerState, WatchTarget};
use crate::error::WatchError;
use crate::ports::PathWatcher;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Reported once when the target's directory cannot be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
enum Notice {
    Cycle {
        generation: u64,
        cycle: u64,
        changed: bool,
    },
    Unwatchable {
        generation: u64,
        warning: WatchWarning,
    },
}

type ResultCallback = Box<dyn FnMut(bool)>;
type WarningCallback = Box<dyn FnMut(&WatchWarning)>;

pub struct WatchHandle {
    watcher: Arc<dyn PathWatcher>,
    target: WatchTarget,
    delay: Duration,
    state: SchedulerState,
    cancel: CancelSource,
    busy: Arc<AtomicBool>,
    notice_tx: Sender<Notice>,
    notice_rx: Receiver<Notice>,
    worker: Option<JoinHandle<()>>,
    on_result: Option<ResultCallback>,
    on_warning: Option<WarningCallback>,
}

impl WatchHandle {
    pub fn new(watcher: Arc<dyn PathWatcher>, path: impl Into<PathBuf>) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel();
        Self {
            watcher,
            target: WatchTarget::new(path),
            delay: DEFAULT_DELAY,
            state: SchedulerState::Idle,
            cancel: CancelSource::new(),
            busy: Arc::new(AtomicBool::new(false)),
            notice_tx,
            notice_rx,
            worker: None,
            on_result: None,
            on_warning: None,
        }
    }

    /// Set the target and the gap between cycles.
    /// Takes effect on the next `start` or `restart`.
    pub fn configure(&mut self, path: impl Into<PathBuf>, delay: Duration) {
        self.target.replace(path);
        self.delay = delay;
    }

    pub fn on_result(&mut self, callback: impl FnMut(bool) + 'static) {
        self.on_result = Some(Box::new(callback));
    }

    pub fn on_warning(&mut self, callback: impl FnMut(&WatchWarning) + 'static) {
        self.on_warning = Some(Box::new(callback));
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// A worker that exited on its own (unwatchable path) counts as idle.
    pub fn state(&self) -> SchedulerState {
        match self.state {
            SchedulerState::Running if !self.worker_alive() => SchedulerState::Idle,
            state => state,
        }
    }

    /// Begin watching. The first cycle starts immediately, without the
    /// configured delay. No-op while already running.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.state == SchedulerState::Running && self.worker_alive() {
            debug!("start ignored, already running");
            return Ok(());
        }
        self.halt();
        self.spawn_worker()
    }

    /// Cancel any in-flight cycle and begin a fresh one against the
    /// current target. Valid in any state.
    pub fn restart(&mut self) -> Result<(), WatchError> {
        self.state = SchedulerState::Stopping;
        self.halt();
        self.spawn_worker()
    }

    /// Cancel in-flight work and stop scheduling. Valid in any state.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Idle && self.worker.is_none() {
            return;
        }
        self.state = SchedulerState::Stopping;
        self.halt();
        self.state = SchedulerState::Idle;
        debug!("watch stopped");
    }

    /// Deliver every notice already queued. Returns how many reached a
    /// callback.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(notice) = self.notice_rx.try_recv() {
            if self.deliver(notice) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for a notice, then deliver it and anything
    /// queued behind it.
    pub fn dispatch_blocking(&mut self, timeout: Duration) -> usize {
        match self.notice_rx.recv_timeout(timeout) {
            Ok(notice) => {
                let first = usize::from(self.deliver(notice));
                first + self.dispatch_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Cancel the current run and wait for its worker to exit. The worker
    /// drops its watch registration before it returns.
    fn halt(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("watch worker panicked");
            }
        }
    }

    fn spawn_worker(&mut self) -> Result<(), WatchError> {
        let worker = Worker {
            watcher: Arc::clone(&self.watcher),
            target: self.target.clone(),
            delay: self.delay,
            token: self.cancel.token(),
            busy: Arc::clone(&self.busy),
            notice_tx: self.notice_tx.clone(),
        };

        let handle = thread::Builder::new()
            .name("stylewatch-cycle".to_string())
            .spawn(move || worker.run())
            .map_err(|err| {
                self.state = SchedulerState::Idle;
                WatchError::Spawn(err)
            })?;

        self.worker = Some(handle);
        self.state = SchedulerState::Running;
        Ok(())
    }

    fn deliver(&mut self, notice: Notice) -> bool {
        let current = self.cancel.generation();
        match notice {
            Notice::Cycle {
                generation,
                cycle,
                changed,
            } => {
                if generation != current || self.state != SchedulerState::Running {
                    trace!(generation, cycle, "dropping result from a cancelled run");
                    return false;
                }
                if let Some(callback) = self.on_result.as_mut() {
                    callback(changed);
                }
                self.cancel.mark_delivered(generation, cycle);
                true
            }
            Notice::Unwatchable {
                generation,
                warning,
            } => {
                if generation != current || self.state != SchedulerState::Running {
                    return false;
                }
                // The worker exits right after posting this.
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        error!("watch worker panicked");
                    }
                }
                self.state = SchedulerState::Idle;
                if let Some(callback) = self.on_warning.as_mut() {
                    callback(&warning);
                }
                true
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one run of cycles needs, moved onto the worker thread.
struct Worker {
    watcher: Arc<dyn PathWatcher>,
    target: WatchTarget,
    delay: Duration,
    token: CancelToken,
    busy: Arc<AtomicBool>,
    notice_tx: Sender<Notice>,
}

impl Worker {
    fn run(self) {
        let generation = self.token.generation();
        let mut cycle = 0u64;

        loop {
            let path = self.target.snapshot();

            if self.busy.swap(true, Ordering::SeqCst) {
                error!("watch cycle started while another was in flight");
            }
            let outcome = self.watcher.watch_once(&path, &self.token);
            self.busy.store(false, Ordering::SeqCst);

            if self.token.is_cancelled() {
                return;
            }

            cycle += 1;
            let changed = match outcome {
                Ok(changed) => changed,
                Err(WatchError::Interrupted) => return,
                Err(WatchError::PathNotWatchable { path, reason }) => {
                    warn!(path = %path.display(), %reason, "stylesheet directory is not watchable");
                    let _ = self.notice_tx.send(Notice::Unwatchable {
                        generation,
                        warning: WatchWarning { path, reason },
                    });
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "watch cycle failed, treating as unchanged");
                    false
                }
            };

            let notice = Notice::Cycle {
                generation,
                cycle,
                changed,
            };
            if self.notice_tx.send(notice).is_err() {
                return;
            }

            // Cycle N is delivered before cycle N+1 starts waiting.
            if !self.token.wait_delivered(cycle) {
                return;
            }
            if !self.token.sleep(self.delay) {
                return;
            }
        }
    }
}
