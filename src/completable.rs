//! The future-backed variant and the conversion boundary to native futures.
//!
//! A [`CompletableDeferred`] keeps no callback queue of its own. Its state is a
//! [`oneshot`] channel whose receiver is wrapped in a [`Shared`] future, and
//! every registered callback is a task on a [`DeferredPool`] awaiting that
//! future. Ordering between callbacks follows the pool's scheduling.
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Either, FutureExt, Shared};
use tracing::{error, trace};

use crate::pool::{run_isolated, DeferredPool};
use crate::state::{Callback, Ready};
use crate::{
    AsyncPromise, Deferred, Error, Immediate, JoinedPromise, Promise, Result, Status, SyncPromise,
};

/// The native single-assignment future behind a [`CompletableDeferred`].
/// Resolves to `None` when the producer is dropped without settling.
pub type NativeFuture<D, F> = Shared<BoxFuture<'static, Option<Arc<std::result::Result<D, F>>>>>;

type Sender<D, F> = Arc<Mutex<Option<oneshot::Sender<std::result::Result<D, F>>>>>;

pub struct CompletableDeferred<D, F> {
    sender: Sender<D, F>,
    future: NativeFuture<D, F>,
    pool: DeferredPool,
}

pub struct CompletablePromise<D, F> {
    future: NativeFuture<D, F>,
    pool: DeferredPool,
}

impl<D, F> CompletableDeferred<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    pub fn new(pool: &DeferredPool) -> Self {
        let (sender, receiver) = oneshot::channel();
        let future = receiver
            .map(|received| received.ok().map(Arc::new))
            .boxed()
            .shared();
        // keep the shared future polled so `status` observes settlement
        pool.spawn(future.clone().map(|_| ()));
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            future,
            pool: pool.clone(),
        }
    }

    /// Backs a deferred with an existing future. The future is driven on
    /// `pool` and settles the deferred when it completes, unless an explicit
    /// `resolve`/`reject` got there first, in which case it is dropped. Its
    /// error is converted into `F`. If it panics the deferred stays pending.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_out::{CompletableDeferred, DeferredPool, PoolConfig, Promise};
    /// use futures::executor::block_on;
    /// use std::io;
    ///
    /// let pool = DeferredPool::new(PoolConfig::default()).unwrap();
    /// let deferred = CompletableDeferred::<u8, io::Error>::from_future(
    ///     &pool,
    ///     async { Err::<u8, _>(io::ErrorKind::TimedOut) },
    /// );
    /// let outcome = block_on(deferred.native()).unwrap();
    /// assert!(matches!(&*outcome, Err(err) if err.kind() == io::ErrorKind::TimedOut));
    /// ```
    pub fn from_future<Fut, E>(pool: &DeferredPool, native: Fut) -> Self
    where
        Fut: Future<Output = std::result::Result<D, E>> + Send + 'static,
        E: Into<F>,
    {
        let deferred = Self::new(pool);
        let sender = Arc::clone(&deferred.sender);
        let settled = deferred.future.clone();
        pool.spawn(async move {
            let native = AssertUnwindSafe(native).catch_unwind();
            futures::pin_mut!(native);
            match future::select(native, settled).await {
                Either::Left((Ok(outcome), _)) => {
                    if complete(&sender, outcome.map_err(Into::into)).is_err() {
                        trace!("native future finished after the deferred was settled");
                    }
                }
                Either::Left((Err(_), _)) => error!("native future panicked"),
                Either::Right(_) => trace!("deferred settled before its native future"),
            }
        });
        deferred
    }

    /// The shared native future, for callers that want native combinators.
    pub fn native(&self) -> NativeFuture<D, F> {
        self.future.clone()
    }
}

fn complete<D, F>(sender: &Sender<D, F>, outcome: std::result::Result<D, F>) -> Result<()> {
    let sender = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .ok_or(Error::AlreadySettled)?;
    // The receiver lives inside the shared future; once every handle is gone
    // nobody is left to observe the outcome.
    let _ = sender.send(outcome);
    Ok(())
}

impl<D, F> Deferred for CompletableDeferred<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    type Value = D;
    type Cause = F;
    type Promise = CompletablePromise<D, F>;

    fn resolve(&self, value: D) -> Result<()> {
        complete(&self.sender, Ok(value))
    }

    fn reject(&self, cause: F) -> Result<()> {
        complete(&self.sender, Err(cause))
    }

    fn promise(&self) -> CompletablePromise<D, F> {
        CompletablePromise {
            future: self.future.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<D, F> CompletablePromise<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    pub fn native(&self) -> NativeFuture<D, F> {
        self.future.clone()
    }

    fn register(&self, callback: Callback<D, F>) -> &Self {
        let settled = self.future.clone();
        self.pool.spawn(async move {
            if let Some(outcome) = settled.await {
                run_isolated(Ready {
                    outcome,
                    callbacks: vec![callback],
                });
            }
        });
        self
    }
}

impl<D, F> Clone for CompletablePromise<D, F> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<D, F> Promise for CompletablePromise<D, F>
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

    /// Settlement becomes visible here once the pool has polled the native
    /// future, shortly after `resolve`/`reject` returns.
    fn status(&self) -> Status {
        match self.future.peek() {
            Some(Some(outcome)) if outcome.is_ok() => Status::Resolved,
            Some(Some(_)) => Status::Rejected,
            _ => Status::Pending,
        }
    }
}

impl<D, F> fmt::Debug for CompletableDeferred<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        f.debug_struct("CompletableDeferred")
            .field("settled", &settled)
            .finish()
    }
}

impl<D, F> fmt::Debug for CompletablePromise<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletablePromise")
            .field("completed", &self.future.peek().is_some())
            .finish()
    }
}

/// A promise viewed as a native future. Completes with the outcome, or with
/// [`Error::ProducerDropped`] if the state it observes is dropped unsettled.
#[derive(Debug)]
pub struct PromiseFuture<D, F> {
    receiver: oneshot::Receiver<std::result::Result<D, F>>,
}

impl<D, F> Future for PromiseFuture<D, F> {
    type Output = Result<std::result::Result<D, F>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|received| received.map_err(|_| Error::ProducerDropped))
    }
}

/// Bridges any promise to a native future through an `always` callback.
///
/// # Examples
///
/// ```
/// use deferred_out::{into_future, new_deferred, Deferred};
/// use futures::executor::block_on;
///
/// let deferred = new_deferred::<u32, String>();
/// let future = into_future(&deferred.promise());
/// deferred.resolve(7).unwrap();
/// assert_eq!(block_on(future).unwrap(), Ok(7));
/// ```
pub fn into_future<P>(promise: &P) -> PromiseFuture<P::Value, P::Cause>
where
    P: Promise,
    P::Value: Clone + Send + 'static,
    P::Cause: Clone + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    promise.always(move |status, value, cause| {
        let outcome = match status {
            Status::Resolved => value.cloned().map(Ok),
            _ => cause.cloned().map(Err),
        };
        if let Some(outcome) = outcome {
            let _ = sender.send(outcome);
        }
    });
    PromiseFuture { receiver }
}

impl<D, F> IntoFuture for SyncPromise<D, F>
where
    D: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Output = Result<std::result::Result<D, F>>;
    type IntoFuture = PromiseFuture<D, F>;

    fn into_future(self) -> Self::IntoFuture {
        into_future(&self)
    }
}

impl<D, F> IntoFuture for AsyncPromise<D, F>
where
    D: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Output = Result<std::result::Result<D, F>>;
    type IntoFuture = PromiseFuture<D, F>;

    fn into_future(self) -> Self::IntoFuture {
        into_future(&self)
    }
}

impl<D, F> IntoFuture for CompletablePromise<D, F>
where
    D: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Output = Result<std::result::Result<D, F>>;
    type IntoFuture = PromiseFuture<D, F>;

    fn into_future(self) -> Self::IntoFuture {
        into_future(&self)
    }
}

impl<D, F> IntoFuture for Immediate<D, F>
where
    D: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Output = Result<std::result::Result<D, F>>;
    type IntoFuture = PromiseFuture<D, F>;

    fn into_future(self) -> Self::IntoFuture {
        into_future(&self)
    }
}

impl<P> IntoFuture for JoinedPromise<P>
where
    P: Promise,
    P::Value: Clone + Send + Sync + 'static,
    P::Cause: Clone + Send + Sync + 'static,
{
    type Output = Result<std::result::Result<crate::JoinedResults<P::Value>, P::Cause>>;
    type IntoFuture = PromiseFuture<crate::JoinedResults<P::Value>, P::Cause>;

    fn into_future(self) -> Self::IntoFuture {
        into_future(&self)
    }
}
