//! Typing debouncer
//!
//! Holds at most one pending timer. Every `schedule` aborts the previous task
//! and bumps an epoch, so a task that already woke up but lost the race
//! against a reschedule sees a stale epoch and does nothing.
//!
//! The action runs while the pending lock is held. `cancel` takes the same
//! lock, so once it returns the action has either finished or will never run.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Default)]
struct Pending {
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

/// Single-pending-timer scheduler
pub struct TypingDebouncer {
    delay: Duration,
    runtime: Handle,
    pending: Arc<Mutex<Pending>>,
}

impl TypingDebouncer {
    /// Create a debouncer bound to the current tokio runtime
    ///
    /// Must be called from within a runtime; `schedule` may then be called
    /// from any thread (the console runs on a blocking thread).
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            runtime: Handle::current(),
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Cancel any pending action and run `action` after the delay
    ///
    /// `action` must not call back into this debouncer.
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(task) = pending.task.take() {
            task.abort();
        }
        pending.epoch += 1;
        let epoch = pending.epoch;

        let delay = self.delay;
        let shared = Arc::clone(&self.pending);
        pending.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let mut pending = shared.lock();
            if pending.epoch != epoch {
                trace!("Typing timer {} superseded", epoch);
                return;
            }
            pending.task = None;
            action();
        }));
    }

    /// Cancel the pending action, if any
    ///
    /// Blocks while an action that already fired is still running.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock();
        pending.epoch += 1;
        if let Some(task) = pending.task.take() {
            task.abort();
        }
    }

    /// True while a timer is scheduled and has not fired
    pub fn is_pending(&self) -> bool {
        self.pending.lock().task.is_some()
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        // Held only by a firing timer, which has already cleared its task
        if let Some(mut pending) = self.pending.try_lock() {
            if let Some(task) = pending.task.take() {
                task.abort();
            }
        }
    }
}
