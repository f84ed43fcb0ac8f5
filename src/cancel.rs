//! Generation-based cancellation shared between the control thread and a
//! watch worker.
//!
//! Every `cancel()` bumps the generation. A token remembers the generation
//! it was issued under and reports cancelled as soon as the two differ.
//! Waits on the token (`sleep`, `wait_delivered`) wake immediately on
//! cancel, so no blocked wait depends on a filesystem event to notice it.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct SignalState {
    generation: u64,
    /// Highest cycle number the control thread has delivered in this generation.
    delivered: u64,
}

struct Signal {
    state: Mutex<SignalState>,
    wake: Condvar,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owned by the control side. Issues tokens and cancels them.
#[derive(Clone)]
pub struct CancelSource {
    signal: Arc<Signal>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal {
                state: Mutex::new(SignalState {
                    generation: 0,
                    delivered: 0,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Token bound to the current generation.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            signal: Arc::clone(&self.signal),
            generation: self.generation(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.signal.lock().generation
    }

    /// Cancel every outstanding token and start a new generation.
    pub fn cancel(&self) -> u64 {
        let mut state = self.signal.lock();
        state.generation += 1;
        state.delivered = 0;
        let generation = state.generation;
        drop(state);
        self.signal.wake.notify_all();
        generation
    }

    /// Record that `cycle` of `generation` reached the control thread.
    /// Stale generations are ignored.
    pub fn mark_delivered(&self, generation: u64, cycle: u64) {
        let mut state = self.signal.lock();
        if state.generation != generation {
            return;
        }
        state.delivered = state.delivered.max(cycle);
        drop(state);
        self.signal.wake.notify_all();
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the worker for the lifetime of one run.
#[derive(Clone)]
pub struct CancelToken {
    signal: Arc<Signal>,
    generation: u64,
}

impl CancelToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.lock().generation != self.generation
    }

    /// Sleep for `duration` unless cancelled first.
    /// Returns `false` if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.signal.lock();
        loop {
            if state.generation != self.generation {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            state = self
                .signal
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    /// Block until the control thread has delivered `cycle`.
    /// Returns `false` if the token was cancelled first.
    pub fn wait_delivered(&self, cycle: u64) -> bool {
        let mut state = self.signal.lock();
        loop {
            if state.generation != self.generation {
                return false;
            }
            if state.delivered >= cycle {
                return true;
            }
            state = self
                .signal
                .wake
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}
