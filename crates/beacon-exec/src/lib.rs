#![forbid(unsafe_code)]

//! Execution contexts for Beacon.
//!
//! An execution context is anything that accepts a unit of work and runs it
//! asynchronously. Beacon uses two kinds:
//!
//! - A [`SerialQueue`] per reactive variable, which runs bookkeeping jobs one
//!   at a time in submission order.
//! - A per-subscriber context that runs callbacks. The default is the shared
//!   [`ThreadPool::global()`].
//!
//! [`Inline`] runs work on the submitting thread and is mostly useful in tests.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use beacon_exec::{Executor, SerialQueue, ThreadPool};
//!
//! let queue = SerialQueue::new("example", ThreadPool::global_handle());
//! let (tx, rx) = mpsc::channel();
//! for i in 0..4 {
//!     let tx = tx.clone();
//!     queue.execute(Box::new(move || tx.send(i).unwrap()));
//! }
//! let seen: Vec<i32> = rx.iter().take(4).collect();
//! assert_eq!(seen, vec![0, 1, 2, 3]);
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod serial;

pub use config::PoolConfig;
pub use error::{ExecError, Result};
pub use executor::{Executor, Inline, Job, run_guarded};
pub use pool::ThreadPool;
pub use serial::{DRAIN_BATCH_LIMIT, SerialQueue};
