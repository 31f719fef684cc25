#![forbid(unsafe_code)]

//! Reactive variables for Beacon.
//!
//! A [`Variable`] holds a current value and broadcasts every update to a
//! changing set of subscribers:
//!
//! - [`Variable::next`] stores a value and schedules its broadcast.
//! - [`Variable::subscribe`] registers a callback and returns a
//!   [`Subscription`] used to cancel it.
//! - [`Subscribable`] is a read-only view that can only subscribe.
//!
//! # Architecture
//!
//! Every variable owns a [`SerialQueue`](beacon_exec::SerialQueue). All
//! bookkeeping (enqueueing events, registering and unlinking subscribers,
//! advancing the broadcast) runs as jobs on that queue, one at a time.
//! Callbacks run on each subscriber's own [`Executor`](beacon_exec::Executor),
//! the shared global pool unless another context is given. The engine
//! dispatches one event at a time and waits for every callback of that event
//! to complete before moving to the next one.
//!
//! # Invariants
//!
//! 1. Values from ordered `next` calls reach every primed subscriber in
//!    production order, each at most once.
//! 2. A subscriber's first delivery is the value current when it subscribed
//!    (if there was one).
//! 3. No new delivery starts for a subscriber once the engine has observed
//!    its cancellation.
//! 4. Subscribers never keep a variable's state alive; cancelling after the
//!    variable is gone is a no-op.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use beacon::Variable;
//!
//! let counter = Variable::with_value(0);
//! let (tx, rx) = mpsc::channel();
//! let sub = counter.subscribe(move |v| tx.send(v).unwrap());
//!
//! counter.next(1);
//! counter.next(2);
//!
//! let seen: Vec<i32> = rx.iter().take(3).collect();
//! assert_eq!(seen, vec![0, 1, 2]);
//! sub.cancel();
//! assert!(sub.is_cancelled());
//! ```

mod engine;
pub mod registry;
pub mod subscription;
pub mod variable;
pub mod view;

pub use beacon_exec::{Executor, Inline, SerialQueue, ThreadPool};
pub use registry::{Registry, SubscriberKey};
pub use subscription::{Subscription, SubscriptionGuard};
pub use variable::{UNINITIALIZED_ACCESS, Variable, VariableBuilder};
pub use view::Subscribable;
