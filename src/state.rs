//! The completion state shared by a deferred and every promise view over it.
//!
//! A state holds at most one outcome and an ordered queue of callbacks. Both
//! settlement and registration only touch the queue under the lock; the
//! callbacks that become runnable are handed back to the caller as [`Ready`]
//! so they can be dispatched after the lock is released.
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::{AlwaysCallback, DoneCallback, Error, FailCallback, Result, Status};

pub(crate) type Outcome<D, F> = Arc<std::result::Result<D, F>>;

pub(crate) enum Callback<D, F> {
    Done(DoneCallback<D>),
    Fail(FailCallback<F>),
    Always(AlwaysCallback<D, F>),
}

impl<D, F> Callback<D, F> {
    pub(crate) fn invoke(self, outcome: &std::result::Result<D, F>) {
        match (self, outcome) {
            (Callback::Done(callback), Ok(value)) => callback(value),
            (Callback::Fail(callback), Err(cause)) => callback(cause),
            (Callback::Always(callback), Ok(value)) => {
                callback(Status::Resolved, Some(value), None)
            }
            (Callback::Always(callback), Err(cause)) => {
                callback(Status::Rejected, None, Some(cause))
            }
            // done on a rejection, fail on a resolution
            _ => {}
        }
    }
}

/// Callbacks that became runnable, with the outcome they observe.
pub(crate) struct Ready<D, F> {
    pub(crate) outcome: Outcome<D, F>,
    pub(crate) callbacks: Vec<Callback<D, F>>,
}

impl<D, F> Ready<D, F> {
    /// Runs every callback in order on the current thread.
    pub(crate) fn run(self) {
        let Ready { outcome, callbacks } = self;
        for callback in callbacks {
            callback.invoke(&outcome);
        }
    }
}

struct Inner<D, F> {
    outcome: Option<Outcome<D, F>>,
    callbacks: Vec<Callback<D, F>>,
}

pub(crate) struct CompletionState<D, F> {
    inner: Mutex<Inner<D, F>>,
}

impl<D, F> CompletionState<D, F> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                outcome: None,
                callbacks: vec![],
            }),
        }
    }

    pub(crate) fn settled(outcome: std::result::Result<D, F>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                outcome: Some(Arc::new(outcome)),
                callbacks: vec![],
            }),
        }
    }

    // Callbacks never run while the lock is held, so a poisoned lock still
    // guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner<D, F>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> Status {
        match self.lock().outcome.as_deref() {
            None => Status::Pending,
            Some(Ok(_)) => Status::Resolved,
            Some(Err(_)) => Status::Rejected,
        }
    }

    /// Queues `callback` while pending. Once settled, the callback is handed
    /// back together with the outcome and the caller must dispatch it.
    pub(crate) fn register(&self, callback: Callback<D, F>) -> Option<Ready<D, F>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.outcome {
            Some(outcome) => Some(Ready {
                outcome: Arc::clone(outcome),
                callbacks: vec![callback],
            }),
            None => {
                inner.callbacks.push(callback);
                trace!(queued = inner.callbacks.len(), "callback queued on pending state");
                None
            }
        }
    }

    /// Strict settlement: a second attempt is an error and leaves the stored
    /// outcome untouched.
    pub(crate) fn settle(&self, outcome: std::result::Result<D, F>) -> Result<Ready<D, F>> {
        self.transition(outcome).ok_or_else(|| {
            debug!("refused to settle an already settled state");
            Error::AlreadySettled
        })
    }

    /// Relaxed settlement for aggregates, where racing sources may try to
    /// settle more than once. Later attempts are dropped.
    pub(crate) fn try_settle(&self, outcome: std::result::Result<D, F>) -> Option<Ready<D, F>> {
        let ready = self.transition(outcome);
        if ready.is_none() {
            trace!("ignored redundant settlement");
        }
        ready
    }

    fn transition(&self, outcome: std::result::Result<D, F>) -> Option<Ready<D, F>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.outcome.is_some() {
            return None;
        }
        let outcome = Arc::new(outcome);
        inner.outcome = Some(Arc::clone(&outcome));
        let callbacks = std::mem::take(&mut inner.callbacks);
        trace!(
            resolved = outcome.is_ok(),
            callbacks = callbacks.len(),
            "completion state settled"
        );
        Some(Ready { outcome, callbacks })
    }
}

impl<D, F> fmt::Debug for CompletionState<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let status = match inner.outcome.as_deref() {
            None => Status::Pending,
            Some(Ok(_)) => Status::Resolved,
            Some(Err(_)) => Status::Rejected,
        };
        f.debug_struct("CompletionState")
            .field("status", &status)
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}
