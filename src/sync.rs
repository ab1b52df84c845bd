//! The synchronous variant. Settlement and callback invocation happen inline
//! on the calling thread: callbacks queued before settlement run inside
//! `resolve`/`reject`, callbacks registered afterwards run inside the
//! registration call. A panicking callback unwinds into that caller.
use std::fmt;
use std::sync::Arc;

use crate::state::{Callback, CompletionState};
use crate::{Deferred, Promise, Result, Status};

/// # Examples
///
/// ```
/// use deferred_out::{Deferred, Promise, SyncDeferred};
/// use std::thread;
///
/// let deferred = SyncDeferred::<String, String>::new();
/// let promise = deferred.promise();
/// let task = thread::spawn(move || deferred.resolve("🍓".into()));
/// task.join().expect("The task thread has panicked").unwrap();
/// promise.done(|value| assert_eq!(value, "🍓"));
/// ```
pub struct SyncDeferred<D, F> {
    state: Arc<CompletionState<D, F>>,
}

pub struct SyncPromise<D, F> {
    state: Arc<CompletionState<D, F>>,
}

impl<D, F> SyncDeferred<D, F> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CompletionState::new()),
        }
    }
}

impl<D, F> Default for SyncDeferred<D, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, F> Deferred for SyncDeferred<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    type Value = D;
    type Cause = F;
    type Promise = SyncPromise<D, F>;

    fn resolve(&self, value: D) -> Result<()> {
        self.state.settle(Ok(value))?.run();
        Ok(())
    }

    fn reject(&self, cause: F) -> Result<()> {
        self.state.settle(Err(cause))?.run();
        Ok(())
    }

    fn promise(&self) -> SyncPromise<D, F> {
        SyncPromise::from_state(Arc::clone(&self.state))
    }
}

impl<D, F> SyncPromise<D, F> {
    pub(crate) fn from_state(state: Arc<CompletionState<D, F>>) -> Self {
        Self { state }
    }

    fn register(&self, callback: Callback<D, F>) -> &Self {
        if let Some(ready) = self.state.register(callback) {
            ready.run();
        }
        self
    }
}

impl<D, F> Clone for SyncPromise<D, F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<D, F> Promise for SyncPromise<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    type Value = D;
    type Cause = F;

    fn done(&self, callback: impl FnOnce(&D) + Send + 'static) -> &Self {
        self.register(Callback::Done(Box::new(callback)))
    }

    fn fail(&self, callback: impl FnOnce(&F) + Send + 'static) -> &Self {
        self.register(Callback::Fail(Box::new(callback)))
    }

    fn always(
        &self,
        callback: impl FnOnce(Status, Option<&D>, Option<&F>) + Send + 'static,
    ) -> &Self {
        self.register(Callback::Always(Box::new(callback)))
    }

    fn status(&self) -> Status {
        self.state.status()
    }
}

impl<D, F> fmt::Debug for SyncDeferred<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDeferred").field("state", &self.state).finish()
    }
}

impl<D, F> fmt::Debug for SyncPromise<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPromise").field("state", &self.state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::SyncDeferred;
    use crate::{Deferred, Error, Promise, Status};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_resolve_before_register() {
        let counter = Arc::new(AtomicUsize::new(0));
        let deferred = SyncDeferred::<i32, String>::new();
        deferred.resolve(1).unwrap();
        let (c1, c2) = (counter.clone(), counter.clone());
        deferred
            .promise()
            .done(move |value| {
                assert_eq!(*value, 1);
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .fail(|cause| panic!("unexpected rejection {cause}"))
            .always(move |status, value, cause| {
                assert_eq!(status, Status::Resolved);
                assert_eq!(value, Some(&1));
                assert!(cause.is_none());
                c2.fetch_add(1, Ordering::SeqCst);
            });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reject_after_register() {
        let counter = Arc::new(AtomicUsize::new(0));
        let deferred = SyncDeferred::<i32, String>::new();
        let (c1, c2) = (counter.clone(), counter.clone());
        deferred
            .promise()
            .done(|_| panic!("Cannot be resolved"))
            .fail(move |cause| {
                assert_eq!(cause, "💥");
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .always(move |status, value, cause| {
                assert_eq!(status, Status::Rejected);
                assert!(value.is_none());
                assert_eq!(cause.map(String::as_str), Some("💥"));
                c2.fetch_add(1, Ordering::SeqCst);
            });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        deferred.reject("💥".into()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(deferred.promise().status(), Status::Rejected);
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(vec![]));
        let deferred = SyncDeferred::<i32, String>::new();
        let promise = deferred.promise();
        for i in 0..5 {
            let order = order.clone();
            promise.done(move |_| order.lock().unwrap().push(i));
        }
        deferred.resolve(7).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_resolve_twice() {
        let deferred = SyncDeferred::<i32, String>::new();
        deferred.resolve(1).unwrap();
        let err = deferred.resolve(2).unwrap_err();
        assert!(matches!(err, Error::AlreadySettled));
        assert_eq!(err.to_string(), "Deferred is already resolved or rejected");
        assert!(matches!(deferred.reject("late".into()), Err(Error::AlreadySettled)));
        deferred.promise().done(|value| assert_eq!(*value, 1));
    }

    #[test]
    fn test_panicking_callback_unwinds_into_resolve() {
        let deferred = SyncDeferred::<i32, String>::new();
        deferred.promise().done(|_| panic!("callback failure"));
        let unwound = panic::catch_unwind(AssertUnwindSafe(|| deferred.resolve(1)));
        assert!(unwound.is_err());
        assert_eq!(deferred.promise().status(), Status::Resolved);
        assert!(matches!(deferred.resolve(2), Err(Error::AlreadySettled)));
    }

    #[test]
    fn test_concurrent_settlement_has_one_winner() {
        let deferred = SyncDeferred::<usize, String>::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        deferred.promise().always(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let winners = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let deferred = &deferred;
                    scope.spawn(move || {
                        if i % 2 == 0 {
                            deferred.resolve(i).is_ok()
                        } else {
                            deferred.reject(format!("cause {i}")).is_ok()
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_races_settlement() {
        for _ in 0..50 {
            let deferred = SyncDeferred::<u8, String>::new();
            let fired = Arc::new(AtomicUsize::new(0));
            thread::scope(|scope| {
                for _ in 0..4 {
                    let promise = deferred.promise();
                    let fired = fired.clone();
                    scope.spawn(move || {
                        for _ in 0..25 {
                            let fired = fired.clone();
                            promise.done(move |_| {
                                fired.fetch_add(1, Ordering::SeqCst);
                            });
                        }
                    });
                }
                scope.spawn(|| deferred.resolve(1).unwrap());
            });
            assert_eq!(fired.load(Ordering::SeqCst), 100);
        }
    }
}
