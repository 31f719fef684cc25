//! A fixed-size pool of worker threads sharing one job channel.
//!
//! The pool is the default execution context for subscriber callbacks and
//! the default target that [`SerialQueue`](crate::SerialQueue)s drain on.
//! Jobs are picked up in FIFO order by whichever worker is free, so jobs
//! submitted to the pool directly may run concurrently and complete in any
//! order.
//!
//! # Shutdown
//!
//! [`ThreadPool::shutdown`] closes the channel, lets workers finish every job
//! already queued, and joins them. Jobs submitted after shutdown are dropped
//! with a warning. Dropping the last handle without calling `shutdown` closes
//! the channel and detaches the workers.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use crate::config::PoolConfig;
use crate::error::{ExecError, Result};
use crate::executor::{Executor, Job, run_guarded};

static GLOBAL: OnceLock<ThreadPool> = OnceLock::new();

struct PoolInner {
    name: String,
    threads: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a worker pool. Cloning shares the same workers.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("threads", &self.inner.threads)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ThreadPool {
    /// Spawn a pool according to `config`.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.threads == 0 {
            return Err(ExecError::invalid("threads must be at least 1"));
        }

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(config.threads);

        for index in 0..config.threads {
            let name = format!("{}-{index}", config.name);
            let rx = Arc::clone(&rx);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&rx))
                .map_err(|source| ExecError::Spawn { name, source })?;
            workers.push(handle);
        }

        tracing::debug!(pool = %config.name, threads = config.threads, "pool.start");

        Ok(Self {
            inner: Arc::new(PoolInner {
                name: config.name,
                threads: config.threads,
                sender: Mutex::new(Some(tx)),
                workers: Mutex::new(workers),
            }),
        })
    }

    /// The process-wide shared pool, configured from the environment on
    /// first use (see [`PoolConfig::from_env`]).
    ///
    /// # Panics
    ///
    /// Panics if the worker threads cannot be spawned.
    pub fn global() -> &'static ThreadPool {
        GLOBAL.get_or_init(|| {
            ThreadPool::new(PoolConfig::from_env()).expect("failed to spawn global beacon pool")
        })
    }

    /// The global pool as a shareable executor handle.
    #[must_use]
    pub fn global_handle() -> Arc<dyn Executor> {
        Arc::new(Self::global().clone())
    }

    /// Worker name prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of worker threads the pool was started with.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    /// Whether the pool still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.sender).is_some()
    }

    /// Stop accepting jobs, finish queued ones and join the workers.
    ///
    /// Must not be called from one of this pool's own workers.
    pub fn shutdown(&self) {
        let sender = lock(&self.inner.sender).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *lock(&self.inner.workers));
        for handle in workers {
            let _ = handle.join();
        }
        tracing::debug!(pool = %self.inner.name, "pool.stop");
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) {
        let guard = lock(&self.inner.sender);
        let Some(sender) = guard.as_ref() else {
            tracing::warn!(pool = %self.inner.name, "job submitted after shutdown; dropped");
            return;
        };
        if sender.send(job).is_err() {
            tracing::warn!(pool = %self.inner.name, "all workers exited; job dropped");
        }
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>) {
    let context = thread::current()
        .name()
        .unwrap_or("beacon-worker")
        .to_string();
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let next = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };
        match next {
            Ok(job) => {
                run_guarded(&context, job);
            }
            Err(_) => return, // Sender dropped, exit cleanly.
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
