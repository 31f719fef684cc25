//! Serial queues: one-at-a-time job runners layered over another executor.
//!
//! A [`SerialQueue`] keeps its own FIFO of pending jobs. When the first job
//! arrives on an idle queue, a drain job is submitted to the target executor;
//! the drain runs pending jobs in submission order until the queue is empty.
//! At most one drain is active per queue at any time, so jobs never overlap
//! and always observe each other's effects.
//!
//! # Fairness
//!
//! A drain runs at most [`DRAIN_BATCH_LIMIT`] jobs before re-submitting itself
//! to the target. A queue under continuous load therefore yields its worker
//! between batches instead of pinning it. When the target runs work inline
//! (e.g. [`Inline`](crate::Inline)), the yielded drain resumes in the same
//! loop, so the call stack stays flat however long the queue gets.
//!
//! # Failure Modes
//!
//! - **Job panics**: the panic is caught and logged; the drain continues with
//!   the next job.
//! - **Target drops work** (e.g. a shut-down pool): pending jobs stay queued
//!   and never run.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::executor::{Executor, Job, run_guarded};

/// Maximum number of jobs a drain runs before yielding back to its target.
pub const DRAIN_BATCH_LIMIT: usize = 64;

thread_local! {
    /// Queues draining on this thread, keyed by address, with a flag set when
    /// a rescheduled drain for that queue arrived inline.
    static ACTIVE_DRAINS: RefCell<Vec<(usize, bool)>> = const { RefCell::new(Vec::new()) };
}

struct SerialState {
    jobs: VecDeque<Job>,
    draining: bool,
}

struct SerialInner {
    label: String,
    target: Arc<dyn Executor>,
    state: Mutex<SerialState>,
}

/// A single-queue, one-at-a-time job runner.
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<SerialInner>,
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SerialQueue")
            .field("label", &self.inner.label)
            .field("pending", &state.jobs.len())
            .field("draining", &state.draining)
            .finish()
    }
}

impl SerialQueue {
    /// Create a queue that drains on `target`.
    pub fn new(label: impl Into<String>, target: Arc<dyn Executor>) -> Self {
        Self {
            inner: Arc::new(SerialInner {
                label: label.into(),
                target,
                state: Mutex::new(SerialState {
                    jobs: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    /// Label used in log fields.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Number of jobs waiting to run (excludes the one currently running).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}

impl Executor for SerialQueue {
    fn execute(&self, job: Job) {
        let start = {
            let mut state = self.inner.lock();
            state.jobs.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };
        if start {
            SerialInner::schedule(&self.inner);
        }
    }
}

impl SerialInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, SerialState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule(this: &Arc<Self>) {
        let inner = Arc::clone(this);
        this.target.execute(Box::new(move || inner.drain()));
    }

    fn drain(self: Arc<Self>) {
        let id = Arc::as_ptr(&self) as usize;
        // A target that runs the rescheduled drain inline lands back here on
        // the same thread; flag the outer drain to continue instead.
        let nested = ACTIVE_DRAINS.with_borrow_mut(|active| {
            match active.iter_mut().find(|(queue, _)| *queue == id) {
                Some((_, resumed)) => {
                    *resumed = true;
                    true
                }
                None => {
                    active.push((id, false));
                    false
                }
            }
        });
        if nested {
            return;
        }

        while self.run_batch() {
            tracing::trace!(queue = %self.label, "serial.yield");
            Self::schedule(&self);
            let resumed = ACTIVE_DRAINS.with_borrow_mut(|active| {
                active
                    .iter_mut()
                    .find(|(queue, _)| *queue == id)
                    .is_some_and(|(_, resumed)| std::mem::take(resumed))
            });
            if !resumed {
                break;
            }
        }

        ACTIVE_DRAINS.with_borrow_mut(|active| active.retain(|(queue, _)| *queue != id));
    }

    /// Run up to [`DRAIN_BATCH_LIMIT`] jobs. Returns `true` if work is left
    /// and the queue is still marked draining.
    fn run_batch(&self) -> bool {
        for _ in 0..DRAIN_BATCH_LIMIT {
            let job = {
                let mut state = self.lock();
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        state.draining = false;
                        return false;
                    }
                }
            };
            run_guarded(&self.label, job);
        }

        let mut state = self.lock();
        if state.jobs.is_empty() {
            state.draining = false;
            false
        } else {
            true
        }
    }
}
