//! Monitor around the buffer and the pump state.

use once_cell::sync::OnceCell;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::buffer::{BoundedBuffer, DropStats, Overflow, Push};
use crate::pump::StopReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpState {
    Running,
    Stopped,
}

struct Shared<T> {
    buffer: BoundedBuffer<T>,
    state: PumpState,
    stop_requested: bool,
}

impl<T> Shared<T> {
    fn running(&self) -> bool {
        self.state == PumpState::Running
    }
}

/// Single mutex/condvar pair shared by the pump and all consumers.
///
/// Every mutation of the buffer and every state change goes through here and
/// ends with a `notify_all`. Waiters always re-check their predicate.
pub(crate) struct Gate<T> {
    shared: Mutex<Shared<T>>,
    cond: Condvar,
    reason: OnceCell<StopReason>,
}

impl<T> Gate<T> {
    pub(crate) fn new(capacity: usize, overflow: Overflow) -> Self {
        Self {
            shared: Mutex::new(Shared {
                buffer: BoundedBuffer::new(capacity, overflow),
                state: PumpState::Running,
                stop_requested: false,
            }),
            cond: Condvar::new(),
            reason: OnceCell::new(),
        }
    }

    // No user code runs under this lock, so a poisoned mutex still holds
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for a consumer to free space in a full buffer.
    ///
    /// Returns early on a stop request. `true` if there is space.
    pub(crate) fn wait_for_space(&self, timeout: Duration) -> bool {
        let shared = self
            .cond
            .wait_timeout_while(self.lock(), timeout, |s| {
                s.buffer.is_full() && !s.stop_requested
            })
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        !shared.buffer.is_full()
    }

    /// Enqueue `item`, applying the overflow policy if the buffer is full.
    ///
    /// Fullness is decided under the lock, so space freed by a concurrent
    /// drain is used instead of dropping.
    pub(crate) fn put(&self, item: T, size: usize) -> Push<T> {
        let mut shared = self.lock();
        debug_assert!(shared.running(), "put after the pump stopped");

        let outcome = shared.buffer.push(item, size);
        drop(shared);
        if !matches!(outcome, Push::Dropped(..)) {
            self.cond.notify_all();
        }
        outcome
    }

    pub(crate) fn is_full(&self) -> bool {
        self.lock().buffer.is_full()
    }

    pub(crate) fn get_one(&self) -> Option<T> {
        let item = self.lock().buffer.pop();
        if item.is_some() {
            self.cond.notify_all();
        }
        item
    }

    pub(crate) fn drain(&self, max: Option<usize>) -> Vec<T> {
        let items = self.lock().buffer.drain(max);
        if !items.is_empty() {
            self.cond.notify_all();
        }
        items
    }

    /// Wait until at least `threshold` items are buffered or the pump stopped.
    ///
    /// Returns the number of buffered items seen on wakeup, whatever the
    /// reason for waking up was.
    pub(crate) fn block(&self, threshold: usize, timeout: Option<Duration>) -> usize {
        let waiting = |s: &mut Shared<T>| s.buffer.len() < threshold && s.running();
        let shared = self.lock();
        let shared = match timeout {
            None => self
                .cond
                .wait_while(shared, waiting)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.cond
                    .wait_timeout_while(shared, timeout, waiting)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        shared.buffer.len()
    }

    /// Wait for one item. `None` once the pump stopped with nothing buffered,
    /// or when `timeout` elapsed.
    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Option<T> {
        let waiting = |s: &mut Shared<T>| s.buffer.is_empty() && s.running();
        let shared = self.lock();
        let mut shared = match timeout {
            None => self
                .cond
                .wait_while(shared, waiting)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.cond
                    .wait_timeout_while(shared, timeout, waiting)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        let item = shared.buffer.pop();
        drop(shared);
        if item.is_some() {
            self.cond.notify_all();
        }
        item
    }

    pub(crate) fn request_stop(&self) {
        self.lock().stop_requested = true;
        self.cond.notify_all();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    /// Record why the pump ended and move to the stopped state.
    ///
    /// Only the first call has an effect.
    pub(crate) fn finish(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        let mut shared = self.lock();
        if !shared.running() {
            return;
        }
        shared.state = PumpState::Stopped;
        drop(shared);
        self.cond.notify_all();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().running()
    }

    pub(crate) fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub(crate) fn stats(&self) -> DropStats {
        self.lock().buffer.stats()
    }

    pub(crate) fn take_stats(&self) -> DropStats {
        self.lock().buffer.take_stats()
    }
}
