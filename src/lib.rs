//! A deferred/promise pair with done, fail and always callbacks.
//!
//! A [`Deferred`] is settled exactly once by its producer, either resolved
//! with a value or rejected with a cause. Any number of observers register
//! callbacks on its [`Promise`] view before or after that happens, and every
//! callback is invoked exactly once with the outcome that occurred.
//!
//! # Examples
//!
//! ```
//! use deferred_out::{new_deferred, Deferred, Promise, Status};
//! use std::sync::mpsc::channel;
//!
//! let deferred = new_deferred::<u32, String>();
//! let (tx, rx) = channel();
//! deferred
//!     .promise()
//!     .done(|value| println!("我等到了{:?}", value))
//!     .always(move |status, _, _| tx.send(status).unwrap());
//! deferred.resolve(42).unwrap();
//! assert_eq!(rx.recv().unwrap(), Status::Resolved);
//! assert!(deferred.resolve(43).is_err());
//! ```
pub mod completable;
pub mod error;
pub mod immediate;
pub mod joined;
pub mod pool;
mod state;
pub mod sync;

pub use completable::{
    into_future, CompletableDeferred, CompletablePromise, NativeFuture, PromiseFuture,
};
pub use error::{Error, Result};
pub use immediate::Immediate;
pub use joined::{JoinedPromise, JoinedResults};
pub use pool::{AsyncDeferred, AsyncPromise, DeferredPool, PoolConfig};
pub use sync::{SyncDeferred, SyncPromise};

/// Where a completion state stands. Once it leaves `Pending` it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
}

pub type DoneCallback<D> = Box<dyn FnOnce(&D) + Send>;
pub type FailCallback<F> = Box<dyn FnOnce(&F) + Send>;
/// Receives the terminal status, the value when resolved and the cause when
/// rejected. Exactly one of the two is present.
pub type AlwaysCallback<D, F> = Box<dyn FnOnce(Status, Option<&D>, Option<&F>) + Send>;

/// The observer side. Registration never blocks and returns the same view so
/// calls can be chained.
pub trait Promise {
    type Value;
    type Cause;

    /// Called once with the value if the promise resolves.
    fn done(&self, callback: impl FnOnce(&Self::Value) + Send + 'static) -> &Self;

    /// Called once with the cause if the promise is rejected.
    fn fail(&self, callback: impl FnOnce(&Self::Cause) + Send + 'static) -> &Self;

    /// Called once whichever way the promise settles.
    fn always(
        &self,
        callback: impl FnOnce(Status, Option<&Self::Value>, Option<&Self::Cause>) + Send + 'static,
    ) -> &Self;

    fn status(&self) -> Status;
}

/// The producer side. Exactly one `resolve` or `reject` succeeds; any later
/// attempt returns [`Error::AlreadySettled`].
pub trait Deferred {
    type Value;
    type Cause;
    type Promise: Promise<Value = Self::Value, Cause = Self::Cause>;

    fn resolve(&self, value: Self::Value) -> Result<()>;

    fn reject(&self, cause: Self::Cause) -> Result<()>;

    /// A view over the same state. May be called any number of times.
    fn promise(&self) -> Self::Promise;
}

/// A synchronous deferred: callbacks run on the thread that settles it.
pub fn new_deferred<D, F>() -> SyncDeferred<D, F> {
    SyncDeferred::new()
}

pub fn resolved<D, F>(value: D) -> Immediate<D, F> {
    Immediate::resolved(value)
}

pub fn rejected<D, F>(cause: F) -> Immediate<D, F> {
    Immediate::rejected(cause)
}

/// Joins `promises` into one promise of their values in input order. See
/// [`JoinedPromise`].
pub fn join<P>(promises: impl IntoIterator<Item = P>) -> JoinedPromise<P>
where
    P: Promise,
    P::Value: Clone + Send + Sync + 'static,
    P::Cause: Clone + Send + Sync + 'static,
{
    JoinedPromise::from_promises(promises)
}
