//! The [`Variable`] facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_exec::{Executor, ThreadPool};

use crate::engine::Shared;
use crate::subscription::Subscription;
use crate::view::Subscribable;

/// Panic message for reading a variable that has never been set.
pub const UNINITIALIZED_ACCESS: &str =
    "UninitializedAccess: Variable::value() called before any value was set";

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

fn default_label() -> String {
    format!(
        "beacon-variable-{}",
        NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed)
    )
}

/// A reactive value cell that broadcasts every update to its subscribers.
///
/// Cloning a `Variable` creates a new handle to the **same** cell.
///
/// # Invariants
///
/// 1. [`next`](Variable::next) makes the value visible to `value()` and to
///    later `subscribe` calls before it returns.
/// 2. Every subscriber observes values in production order, starting with the
///    value current at its subscription (if any), with no gaps or repeats
///    while it stays subscribed.
/// 3. `next`, `subscribe` and [`Subscription::cancel`] never block.
pub struct Variable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("label", &self.shared.label())
            .field("value", &self.shared.current())
            .field("subscribers", &self.shared.subscriber_count())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Variable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Variable<T> {
    /// An uninitialized variable.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A variable holding `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::builder().value(value).build()
    }

    #[must_use]
    pub fn builder() -> VariableBuilder<T> {
        VariableBuilder::default()
    }

    /// The current value.
    ///
    /// # Panics
    ///
    /// Panics with [`UNINITIALIZED_ACCESS`] if no value has ever been set.
    #[must_use]
    pub fn value(&self) -> T {
        match self.shared.current() {
            Some(value) => value,
            None => panic!("{UNINITIALIZED_ACCESS}"),
        }
    }

    /// The current value, or `None` if no value has ever been set.
    #[must_use]
    pub fn try_value(&self) -> Option<T> {
        self.shared.current()
    }

    /// Whether a value has been set.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.has_value()
    }

    /// Store `value` and broadcast it to every subscriber.
    ///
    /// The value is current as soon as this returns; delivery happens later on
    /// each subscriber's context.
    pub fn next(&self, value: T) {
        self.shared.publish(value);
    }

    /// Subscribe on the variable's default context (the global pool unless
    /// the builder set another).
    ///
    /// If the variable holds a value, `callback` first receives that value,
    /// then every later one.
    pub fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        self.subscribe_on(self.shared.default_context(), callback)
    }

    /// Subscribe with callbacks running on `context`.
    pub fn subscribe_on(
        &self,
        context: Arc<dyn Executor>,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.attach(context, Arc::new(callback))
    }

    /// A read-only view of this variable.
    #[must_use]
    pub fn subscribable(&self) -> Subscribable<T> {
        Subscribable::new(self.clone())
    }

    /// Label used in log fields.
    #[must_use]
    pub fn label(&self) -> &str {
        self.shared.label()
    }

    /// Number of subscribers currently linked into the registry.
    ///
    /// Registration and unlinking happen asynchronously, so this trails
    /// `subscribe` and `cancel` calls.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }
}

/// Builder for [`Variable`].
pub struct VariableBuilder<T> {
    label: Option<String>,
    target: Option<Arc<dyn Executor>>,
    context: Option<Arc<dyn Executor>>,
    value: Option<T>,
}

impl<T> Default for VariableBuilder<T> {
    fn default() -> Self {
        Self {
            label: None,
            target: None,
            context: None,
            value: None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> VariableBuilder<T> {
    /// Label for log fields and the internal serial queue.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Executor the internal serial queue drains on.
    #[must_use]
    pub fn target(mut self, target: Arc<dyn Executor>) -> Self {
        self.target = Some(target);
        self
    }

    /// Default context for [`Variable::subscribe`].
    #[must_use]
    pub fn context(mut self, context: Arc<dyn Executor>) -> Self {
        self.context = Some(context);
        self
    }

    /// Initial value.
    #[must_use]
    pub fn value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn build(self) -> Variable<T> {
        let label = self.label.unwrap_or_else(default_label);
        let target = self.target.unwrap_or_else(ThreadPool::global_handle);
        let context = self.context.unwrap_or_else(ThreadPool::global_handle);
        tracing::debug!(
            variable = %label,
            initialized = self.value.is_some(),
            "variable.create"
        );
        Variable {
            shared: Shared::new(label, self.value, target, context),
        }
    }
}
