//! Subscription handles.
//!
//! A [`Subscription`] is the capability to cancel one subscriber. It shares a
//! small ticket with the engine's registry entry (identity, cancelled flag,
//! registry key) and holds only a weak reference to the variable, so keeping
//! a subscription around never keeps the variable alive.
//!
//! Cancellation marks the ticket synchronously, then schedules the registry
//! unlink on the variable's serial queue. A callback already handed to the
//! subscriber's context may still run once; nothing new is dispatched after
//! the engine sees the flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::registry::SubscriberKey;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between a [`Subscription`] and its registry entry.
#[derive(Debug)]
pub(crate) struct Ticket {
    id: u64,
    cancelled: AtomicBool,
    key: OnceLock<SubscriberKey>,
}

impl Ticket {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
            key: OnceLock::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Set the flag. Returns `true` for the call that actually flipped it.
    fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Record the registry key. Only the registration job calls this, once.
    pub(crate) fn bind(&self, key: SubscriberKey) {
        let bound = self.key.set(key);
        debug_assert!(bound.is_ok(), "ticket {} bound twice", self.id);
    }

    pub(crate) fn key(&self) -> Option<SubscriberKey> {
        self.key.get().copied()
    }
}

/// The variable side of cancellation.
pub(crate) trait Detach: Send + Sync {
    /// Schedule removal of the subscriber identified by `ticket`.
    fn detach(self: Arc<Self>, ticket: Arc<Ticket>);
}

/// Capability to cancel one subscriber.
///
/// Clones refer to the same subscriber. Dropping a `Subscription` does **not**
/// cancel it; use [`guard`](Subscription::guard) for that.
#[derive(Clone)]
#[must_use = "dropping a Subscription leaves the subscriber active with no way to cancel it"]
pub struct Subscription {
    ticket: Arc<Ticket>,
    owner: Weak<dyn Detach>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.ticket.id)
            .field("cancelled", &self.ticket.is_cancelled())
            .field("attached", &(self.owner.strong_count() > 0))
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(ticket: Arc<Ticket>, owner: Weak<dyn Detach>) -> Self {
        Self { ticket, owner }
    }

    /// Process-unique subscriber id (also used in log fields).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.ticket.id
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }

    /// Stop future deliveries to this subscriber.
    ///
    /// Idempotent. A no-op when already cancelled or when the variable no
    /// longer exists. Never blocks and never invokes the callback.
    pub fn cancel(&self) {
        if self.ticket.is_cancelled() {
            return;
        }
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        if self.ticket.mark_cancelled() {
            owner.detach(Arc::clone(&self.ticket));
        }
    }

    /// Wrap in a guard that cancels on drop.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard { inner: Some(self) }
    }
}

/// RAII guard that cancels its subscription when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    inner: Option<Subscription>,
}

impl SubscriptionGuard {
    /// Release the subscription without cancelling it.
    pub fn into_inner(mut self) -> Subscription {
        self.inner
            .take()
            .expect("guard holds its subscription until dropped")
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.as_ref().is_none_or(Subscription::is_cancelled)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(sub) = self.inner.take() {
            sub.cancel();
        }
    }
}
