//! Read-only view over a [`Variable`].

use std::sync::Arc;

use beacon_exec::Executor;

use crate::subscription::Subscription;
use crate::variable::Variable;

/// A handle that can subscribe to a [`Variable`] but not publish to it.
pub struct Subscribable<T> {
    variable: Variable<T>,
}

impl<T> Clone for Subscribable<T> {
    fn clone(&self) -> Self {
        Self {
            variable: self.variable.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribable<T> {
    #[must_use]
    pub fn new(variable: Variable<T>) -> Self {
        Self { variable }
    }

    /// See [`Variable::subscribe`].
    pub fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        self.variable.subscribe(callback)
    }

    /// See [`Variable::subscribe_on`].
    pub fn subscribe_on(
        &self,
        context: Arc<dyn Executor>,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Subscription {
        self.variable.subscribe_on(context, callback)
    }
}

impl<T: Clone + Send + Sync + 'static> From<Variable<T>> for Subscribable<T> {
    fn from(variable: Variable<T>) -> Self {
        Self::new(variable)
    }
}
