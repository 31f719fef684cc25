//! The broadcast engine behind [`Variable`](crate::Variable).
//!
//! # Design
//!
//! `Shared<T>` is the reference-counted state of one variable. The current
//! value lives in an [`ArcSwapOption`] so `next` can publish it and readers can
//! load it from any thread without touching the engine. Everything else (the
//! subscriber registry, the event queue, the in-flight delivery counts) sits
//! behind a mutex that is only ever taken from jobs running on the variable's
//! [`SerialQueue`], plus read-only snapshots for diagnostics.
//!
//! # Tick protocol
//!
//! The engine drains the event queue one event at a time:
//!
//! 1. If a delivery batch is in flight (`ticking`), do nothing; the last
//!    completion of that batch resumes the drain.
//! 2. Pop the next event. A targeted event primes exactly one subscriber; a
//!    broadcast event matches every registered subscriber that is primed and
//!    not cancelled.
//! 3. With no matches, continue with the next event. Otherwise record the
//!    batch size, set `ticking`, and dispatch each callback to its
//!    subscriber's context.
//! 4. Each completion hops back onto the serial queue and bumps `invoked`.
//!    The completion that makes `invoked == matched` clears `ticking` and
//!    drains again.
//!
//! The drain is a loop and completions arrive as fresh serial jobs, so stack
//! depth stays flat however long the queue gets.
//!
//! # Ordering rule
//!
//! A subscriber's initial value is the latest broadcast in serial order at the
//! point its registration job runs, not whatever `current` held on the
//! subscribing thread. A `next` racing with `subscribe` therefore lands either
//! before the snapshot (and is the snapshot) or after it (and is delivered as
//! a broadcast), never both.
//!
//! A subscriber that captured an initial value is excluded from every
//! broadcast dequeued before its own targeted event, even one produced after
//! it joined. Its first delivery is therefore always the captured value.
//!
//! # Failure Modes
//!
//! - **Callback panics**: caught and logged; the delivery still counts as
//!   complete.
//! - **Context never runs the callback**: the batch never completes and the
//!   engine stops advancing. There is no timeout.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arc_swap::ArcSwapOption;
use beacon_exec::{Executor, SerialQueue, run_guarded};

use crate::registry::{Registry, SubscriberKey};
use crate::subscription::{Detach, Subscription, Ticket};

pub(crate) type Callback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// One registry entry.
struct Subscriber<T> {
    ticket: Arc<Ticket>,
    context: Arc<dyn Executor>,
    callback: Callback<T>,
    /// Set until the subscriber's targeted initial event fires.
    pending_initial: bool,
}

/// One emitted value awaiting dispatch.
struct Event<T> {
    value: T,
    /// `Some` for a subscriber's initial value, `None` for a broadcast.
    target: Option<SubscriberKey>,
}

/// Completion counts for the event currently being delivered.
#[derive(Debug, Default, Clone, Copy)]
struct Batch {
    matched: usize,
    invoked: usize,
}

/// A callback invocation ready to hand to its context.
struct Delivery<T> {
    subscriber: u64,
    context: Arc<dyn Executor>,
    callback: Callback<T>,
    value: T,
}

struct EngineState<T> {
    /// Value of the most recent broadcast in serial order.
    latest: Option<T>,
    ticking: bool,
    batch: Batch,
    registry: Registry<Subscriber<T>>,
    events: VecDeque<Event<T>>,
}

impl<T: Clone> EngineState<T> {
    /// Serve a targeted event, unless its subscriber is gone, cancelled, or
    /// already primed.
    fn prime(&mut self, key: SubscriberKey, value: T) -> Vec<Delivery<T>> {
        let Some(entry) = self.registry.get_mut(key) else {
            return Vec::new();
        };
        if !entry.pending_initial || entry.ticket.is_cancelled() {
            return Vec::new();
        }
        entry.pending_initial = false;
        vec![Delivery {
            subscriber: entry.ticket.id(),
            context: Arc::clone(&entry.context),
            callback: Arc::clone(&entry.callback),
            value,
        }]
    }

    /// Match a broadcast against every primed, live subscriber.
    fn fan_out(&self, value: &T) -> Vec<Delivery<T>> {
        self.registry
            .iter()
            .filter(|entry| !entry.pending_initial && !entry.ticket.is_cancelled())
            .map(|entry| Delivery {
                subscriber: entry.ticket.id(),
                context: Arc::clone(&entry.context),
                callback: Arc::clone(&entry.callback),
                value: value.clone(),
            })
            .collect()
    }
}

pub(crate) struct Shared<T> {
    label: String,
    current: ArcSwapOption<T>,
    queue: SerialQueue,
    default_context: Arc<dyn Executor>,
    state: Mutex<EngineState<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    pub(crate) fn new(
        label: String,
        initial: Option<T>,
        target: Arc<dyn Executor>,
        default_context: Arc<dyn Executor>,
    ) -> Arc<Self> {
        let queue = SerialQueue::new(label.clone(), target);
        Arc::new(Self {
            label,
            current: ArcSwapOption::new(initial.clone().map(Arc::new)),
            queue,
            default_context,
            state: Mutex::new(EngineState {
                latest: initial,
                ticking: false,
                batch: Batch::default(),
                registry: Registry::new(),
                events: VecDeque::new(),
            }),
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn current(&self) -> Option<T> {
        self.current.load().as_deref().cloned()
    }

    pub(crate) fn has_value(&self) -> bool {
        self.current.load().is_some()
    }

    pub(crate) fn default_context(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.default_context)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().registry.len()
    }

    // ── Caller-side operations (any thread) ─────────────────────────────

    /// Store `value` and schedule its broadcast.
    pub(crate) fn publish(self: &Arc<Self>, value: T) {
        self.current.store(Some(Arc::new(value.clone())));
        let this = Arc::clone(self);
        self.queue.execute(Box::new(move || {
            this.enqueue(Event {
                value,
                target: None,
            });
        }));
    }

    /// Create a subscriber and schedule its registration.
    pub(crate) fn attach(
        self: &Arc<Self>,
        context: Arc<dyn Executor>,
        callback: Callback<T>,
    ) -> Subscription {
        let ticket = Ticket::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = Subscription::new(Arc::clone(&ticket), weak);

        tracing::debug!(
            variable = %self.label,
            subscriber = ticket.id(),
            "subscriber.attach"
        );

        let this = Arc::clone(self);
        self.queue.execute(Box::new(move || {
            this.register(ticket, context, callback);
        }));
        subscription
    }

    // ── Serial-queue jobs ───────────────────────────────────────────────

    fn register(
        self: &Arc<Self>,
        ticket: Arc<Ticket>,
        context: Arc<dyn Executor>,
        callback: Callback<T>,
    ) {
        if ticket.is_cancelled() {
            tracing::debug!(
                variable = %self.label,
                subscriber = ticket.id(),
                "subscriber.cancelled_before_register"
            );
            return;
        }

        let subscriber = ticket.id();
        let deliveries = {
            let mut state = self.lock();
            let initial = state.latest.clone();
            let key = state.registry.insert(Subscriber {
                ticket: Arc::clone(&ticket),
                context,
                callback,
                pending_initial: initial.is_some(),
            });
            ticket.bind(key);
            tracing::debug!(
                variable = %self.label,
                subscriber,
                subscribers = state.registry.len(),
                primed = initial.is_none(),
                "subscriber.register"
            );
            match initial {
                Some(value) => {
                    state.events.push_back(Event {
                        value,
                        target: Some(key),
                    });
                    self.tick(&mut state)
                }
                None => Vec::new(),
            }
        };
        self.dispatch(deliveries);
    }

    fn enqueue(self: &Arc<Self>, event: Event<T>) {
        let deliveries = {
            let mut state = self.lock();
            if event.target.is_none() {
                state.latest = Some(event.value.clone());
            }
            state.events.push_back(event);
            tracing::trace!(
                variable = %self.label,
                queued = state.events.len(),
                "event.enqueue"
            );
            self.tick(&mut state)
        };
        self.dispatch(deliveries);
    }

    fn unlink(&self, ticket: &Ticket) {
        let Some(key) = ticket.key() else {
            // Never registered: cancelled before the registration job ran.
            return;
        };
        let mut state = self.lock();
        if state.registry.remove(key).is_some() {
            tracing::debug!(
                variable = %self.label,
                subscriber = ticket.id(),
                subscribers = state.registry.len(),
                "subscriber.unlink"
            );
        }
    }

    fn delivered(self: &Arc<Self>) {
        let deliveries = {
            let mut state = self.lock();
            state.batch.invoked += 1;
            debug_assert!(state.batch.invoked <= state.batch.matched);
            if state.batch.invoked < state.batch.matched {
                return;
            }
            tracing::trace!(
                variable = %self.label,
                matched = state.batch.matched,
                "event.retire"
            );
            state.ticking = false;
            state.batch = Batch::default();
            self.tick(&mut state)
        };
        self.dispatch(deliveries);
    }

    /// Drain events until one produces deliveries or the queue is empty.
    ///
    /// Returns the deliveries of the new batch; the caller dispatches them
    /// after releasing the state lock.
    fn tick(&self, state: &mut EngineState<T>) -> Vec<Delivery<T>> {
        if state.ticking {
            return Vec::new();
        }
        while let Some(event) = state.events.pop_front() {
            let deliveries = match event.target {
                Some(key) => state.prime(key, event.value),
                None => state.fan_out(&event.value),
            };
            if deliveries.is_empty() {
                tracing::trace!(variable = %self.label, "event.unmatched");
                continue;
            }
            state.ticking = true;
            state.batch = Batch {
                matched: deliveries.len(),
                invoked: 0,
            };
            tracing::trace!(
                variable = %self.label,
                matched = deliveries.len(),
                targeted = event.target.is_some(),
                "event.dispatch"
            );
            return deliveries;
        }
        Vec::new()
    }

    fn dispatch(self: &Arc<Self>, deliveries: Vec<Delivery<T>>) {
        for delivery in deliveries {
            let this = Arc::clone(self);
            let Delivery {
                subscriber,
                context,
                callback,
                value,
            } = delivery;
            context.execute(Box::new(move || {
                if !run_guarded(&this.label, || callback(value)) {
                    tracing::error!(
                        variable = %this.label,
                        subscriber,
                        "subscriber callback panicked"
                    );
                }
                let done = Arc::clone(&this);
                this.queue.execute(Box::new(move || done.delivered()));
            }));
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Detach for Shared<T> {
    fn detach(self: Arc<Self>, ticket: Arc<Ticket>) {
        tracing::debug!(
            variable = %self.label,
            subscriber = ticket.id(),
            "subscriber.cancel"
        );
        let this = Arc::clone(&self);
        self.queue.execute(Box::new(move || this.unlink(&ticket)));
    }
}
