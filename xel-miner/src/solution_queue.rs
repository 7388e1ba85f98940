//! Thread-safe FIFO that carries solutions from workers to the coordinator.
//!
//! Workers run on dedicated `std::thread`s and push without blocking. The
//! coordinator drains the queue either with [`SolutionQueue::pop_nowait`] or
//! by parking in [`SolutionQueue::pop`] with a timeout.
//!
//! Freezing the queue rejects further pushes while still allowing drains.
//! At shutdown this stops workers from adding to a queue nobody will read;
//! solutions still queued at that point are not submitted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::miner::SolutionReport;

/// Error returned by [`SolutionQueue::push`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("solution queue is frozen")]
    Frozen,
}

struct Inner<T> {
    items: VecDeque<T>,
    frozen: bool,
}

/// Mutex/condition-protected FIFO with freeze/thaw lifecycle.
pub struct SolutionQueue<T = SolutionReport> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> SolutionQueue<T> {
    /// Create an empty, thawed queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                frozen: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item.
    ///
    /// Fails only when the queue is frozen, in which case the item is dropped.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.frozen {
            return Err(QueueError::Frozen);
        }
        inner.items.push_back(item);
        drop(inner);

        self.available.notify_one();
        Ok(())
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns early with `None` if the queue is frozen and empty.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.frozen {
                return None;
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.pop_front();
            }
        }
    }

    /// Pop the oldest item if one is queued.
    pub fn pop_nowait(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Reject new pushes and wake every waiter.
    pub fn freeze(&self) {
        self.inner.lock().frozen = true;
        self.available.notify_all();
    }

    /// Accept pushes again.
    pub fn thaw(&self) {
        self.inner.lock().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SolutionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
