//! Trait for event actions.

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::simulation::Scheduler;

use super::markers;

/// A function or closure that can be used as the action of an event.
///
/// This trait is in particular implemented for any closure with one of the
/// following signatures, where it is implicitly assumed that the closure
/// implements `Send + 'static`:
///
/// ```ignore
/// FnMut()
/// FnMut(&Scheduler)
/// FnMut() -> impl Future<Output = ()> + Send + 'static
/// FnMut(Scheduler) -> impl Future<Output = ()> + Send + 'static
/// ```
///
/// The action is called each time the event fires, which is more than once
/// for continuous events. Asynchronous actions fired within the same batch are
/// polled jointly and may therefore interleave at their suspension points.
pub trait ActionFn<S>: Send + 'static {
    /// Erases the concrete type of the action.
    fn into_action(self) -> Action;
}

impl<F> ActionFn<markers::WithoutScheduler> for F
where
    F: FnMut() + Send + 'static,
{
    fn into_action(mut self) -> Action {
        Action::Sync(Box::new(move |_: &Scheduler| self()))
    }
}

impl<F> ActionFn<markers::WithScheduler> for F
where
    F: FnMut(&Scheduler) + Send + 'static,
{
    fn into_action(self) -> Action {
        Action::Sync(Box::new(self))
    }
}

impl<F, Fut> ActionFn<markers::AsyncWithoutScheduler> for F
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_action(mut self) -> Action {
        Action::Async(Box::new(move |_: Scheduler| self().boxed()))
    }
}

impl<F, Fut> ActionFn<markers::AsyncWithScheduler> for F
where
    F: FnMut(Scheduler) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_action(mut self) -> Action {
        Action::Async(Box::new(move |scheduler: Scheduler| self(scheduler).boxed()))
    }
}

/// A type-erased event action.
pub enum Action {
    /// An action that runs to completion when called.
    Sync(Box<dyn FnMut(&Scheduler) + Send>),
    /// An action that returns a future polled to completion by the kernel.
    Async(Box<dyn FnMut(Scheduler) -> BoxFuture<'static, ()> + Send>),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Action::Sync(..)"),
            Self::Async(_) => f.write_str("Action::Async(..)"),
        }
    }
}
