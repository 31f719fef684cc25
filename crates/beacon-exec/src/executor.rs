//! The execution-context abstraction.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that accepts work and runs it, usually on another thread.
///
/// Implementations must not block the caller for the duration of the job,
/// with the exception of [`Inline`], which exists for tests and for
/// subscribers that are cheap enough to run wherever they are dispatched.
pub trait Executor: Send + Sync + 'static {
    /// Schedule `job` to run.
    fn execute(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job);
    }
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Job) {
        run_guarded("inline", job);
    }
}

/// Run `job`, catching and logging a panic instead of unwinding into the
/// executor. Returns `false` if the job panicked.
pub fn run_guarded(context: &str, job: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(context, reason = %reason, "job panicked");
            false
        }
    }
}
