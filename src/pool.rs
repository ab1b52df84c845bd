//! The asynchronous variant. Settlement is decided on the caller's thread but
//! callbacks run on a background [`ThreadPool`], so `resolve`/`reject` may
//! return before they finish.
//!
//! Callbacks drained by one settlement run as a single job, in registration
//! order. Each one is isolated: a panicking callback is logged and the rest
//! of the batch still runs.
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use futures::executor::ThreadPool;
use tracing::{debug, error};

use crate::state::{Callback, CompletionState, Ready};
use crate::{Deferred, Promise, Result, Status};

/// Settings for a [`DeferredPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            name_prefix: "deferred-pool-".into(),
        }
    }
}

impl PoolConfig {
    /// Number of worker threads. Zero is raised to one.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn name_prefix(mut self, name_prefix: impl Into<String>) -> Self {
        self.name_prefix = name_prefix.into();
        self
    }
}

/// The execution context shared by asynchronous and future-backed deferreds.
/// Cloning shares the same workers.
#[derive(Debug, Clone)]
pub struct DeferredPool {
    pool: ThreadPool,
}

impl DeferredPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let pool_size = config.pool_size.max(1);
        let pool = ThreadPool::builder()
            .pool_size(pool_size)
            .name_prefix(config.name_prefix)
            .create()?;
        debug!(pool_size, "deferred pool started");
        Ok(Self { pool })
    }

    /// A fresh deferred whose callbacks run on this pool.
    pub fn deferred<D, F>(&self) -> AsyncDeferred<D, F> {
        AsyncDeferred {
            state: Arc::new(CompletionState::new()),
            pool: self.clone(),
        }
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.pool.spawn_ok(task);
    }

    pub(crate) fn dispatch<D, F>(&self, ready: Ready<D, F>)
    where
        D: Send + Sync + 'static,
        F: Send + Sync + 'static,
    {
        if ready.callbacks.is_empty() {
            return;
        }
        self.spawn(async move { run_isolated(ready) });
    }
}

pub(crate) fn run_isolated<D, F>(ready: Ready<D, F>) {
    let Ready { outcome, callbacks } = ready;
    for callback in callbacks {
        if panic::catch_unwind(AssertUnwindSafe(|| callback.invoke(&outcome))).is_err() {
            error!("deferred callback panicked");
        }
    }
}

pub struct AsyncDeferred<D, F> {
    state: Arc<CompletionState<D, F>>,
    pool: DeferredPool,
}

pub struct AsyncPromise<D, F> {
    state: Arc<CompletionState<D, F>>,
    pool: DeferredPool,
}

impl<D, F> Deferred for AsyncDeferred<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    type Value = D;
    type Cause = F;
    type Promise = AsyncPromise<D, F>;

    fn resolve(&self, value: D) -> Result<()> {
        let ready = self.state.settle(Ok(value))?;
        self.pool.dispatch(ready);
        Ok(())
    }

    fn reject(&self, cause: F) -> Result<()> {
        let ready = self.state.settle(Err(cause))?;
        self.pool.dispatch(ready);
        Ok(())
    }

    fn promise(&self) -> AsyncPromise<D, F> {
        AsyncPromise {
            state: Arc::clone(&self.state),
            pool: self.pool.clone(),
        }
    }
}

impl<D, F> AsyncPromise<D, F>
where
    D: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    fn register(&self, callback: Callback<D, F>) -> &Self {
        if let Some(ready) = self.state.register(callback) {
            self.pool.dispatch(ready);
        }
        self
    }
}

impl<D, F> Clone for AsyncPromise<D, F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            pool: self.pool.clone(),
        }
    }
}

impl<D, F> Promise for AsyncPromise<D, F>
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

impl<D, F> fmt::Debug for AsyncDeferred<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDeferred").field("state", &self.state).finish()
    }
}

impl<D, F> fmt::Debug for AsyncPromise<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPromise").field("state", &self.state).finish()
    }
}
