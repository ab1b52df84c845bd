//! Joins a fixed set of promises into one promise of their values.
//!
//! The joined promise resolves once every source has resolved, with the
//! values laid out in input order whatever order the sources completed in.
//! It rejects as soon as any source rejects. Sources keep settling on their
//! own afterwards; the joined state quietly drops those late attempts, unlike
//! a caller-facing [`Deferred`](crate::Deferred), where a second settlement is
//! an error.
use std::fmt;
use std::ops::Index;
use std::sync::{Arc, Mutex, PoisonError};

use crate::state::CompletionState;
use crate::sync::SyncPromise;
use crate::{Deferred, Promise, Status};

/// The values of a resolved [`JoinedPromise`], slot `i` holding source `i`'s
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinedResults<D> {
    values: Vec<D>,
}

impl<D> JoinedResults<D> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&D> {
        self.values.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, D> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[D] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<D> {
        self.values
    }
}

impl<D> Index<usize> for JoinedResults<D> {
    type Output = D;

    fn index(&self, index: usize) -> &D {
        &self.values[index]
    }
}

impl<D> IntoIterator for JoinedResults<D> {
    type Item = D;
    type IntoIter = std::vec::IntoIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a, D> IntoIterator for &'a JoinedResults<D> {
    type Item = &'a D;
    type IntoIter = std::slice::Iter<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

struct Slots<D> {
    values: Vec<Option<D>>,
    outstanding: usize,
}

/// # Examples
///
/// ```
/// use deferred_out::{new_deferred, Deferred, JoinedPromise, Promise};
///
/// let deferreds: Vec<_> = (0..3).map(|_| new_deferred::<usize, String>()).collect();
/// let joined = JoinedPromise::from_deferreds(&deferreds);
/// joined.done(|results| assert_eq!(results.as_slice(), &[0, 1, 2]));
/// for (i, deferred) in deferreds.iter().enumerate().rev() {
///     deferred.resolve(i).unwrap();
/// }
/// ```
pub struct JoinedPromise<P: Promise> {
    sources: Arc<Vec<P>>,
    promise: SyncPromise<JoinedResults<P::Value>, P::Cause>,
}

impl<P> JoinedPromise<P>
where
    P: Promise,
    P::Value: Clone + Send + Sync + 'static,
    P::Cause: Clone + Send + Sync + 'static,
{
    pub fn from_promises(promises: impl IntoIterator<Item = P>) -> Self {
        let sources: Vec<P> = promises.into_iter().collect();
        let state = Arc::new(CompletionState::new());

        if sources.is_empty() {
            if let Some(ready) = state.try_settle(Ok(JoinedResults { values: vec![] })) {
                ready.run();
            }
        } else {
            let slots = Arc::new(Mutex::new(Slots {
                values: sources.iter().map(|_| None).collect(),
                outstanding: sources.len(),
            }));
            for (index, source) in sources.iter().enumerate() {
                let slots = Arc::clone(&slots);
                let resolved = Arc::clone(&state);
                let rejected = Arc::clone(&state);
                source
                    .done(move |value| {
                        let filled = {
                            let mut guard = slots.lock().unwrap_or_else(PoisonError::into_inner);
                            let slots = &mut *guard;
                            slots.values[index] = Some(value.clone());
                            slots.outstanding -= 1;
                            (slots.outstanding == 0).then(|| std::mem::take(&mut slots.values))
                        };
                        if let Some(values) = filled {
                            let results = JoinedResults {
                                values: values.into_iter().flatten().collect(),
                            };
                            if let Some(ready) = resolved.try_settle(Ok(results)) {
                                ready.run();
                            }
                        }
                    })
                    .fail(move |cause| {
                        if let Some(ready) = rejected.try_settle(Err(cause.clone())) {
                            ready.run();
                        }
                    });
            }
        }

        Self {
            sources: Arc::new(sources),
            promise: SyncPromise::from_state(state),
        }
    }

    pub fn from_deferreds<'a, Q>(deferreds: impl IntoIterator<Item = &'a Q>) -> Self
    where
        Q: Deferred<Promise = P> + 'a,
    {
        Self::from_promises(deferreds.into_iter().map(Deferred::promise))
    }
}

impl<P: Promise> JoinedPromise<P> {
    /// The promises this one was joined from, in input order.
    pub fn sources(&self) -> &[P] {
        &self.sources
    }
}

impl<P: Promise> Clone for JoinedPromise<P> {
    fn clone(&self) -> Self {
        Self {
            sources: Arc::clone(&self.sources),
            promise: self.promise.clone(),
        }
    }
}

impl<P> Promise for JoinedPromise<P>
where
    P: Promise,
    P::Value: Send + Sync + 'static,
    P::Cause: Send + Sync + 'static,
{
    type Value = JoinedResults<P::Value>;
    type Cause = P::Cause;

    fn done(&self, callback: impl FnOnce(&Self::Value) + Send + 'static) -> &Self {
        self.promise.done(callback);
        self
    }

    fn fail(&self, callback: impl FnOnce(&Self::Cause) + Send + 'static) -> &Self {
        self.promise.fail(callback);
        self
    }

    fn always(
        &self,
        callback: impl FnOnce(Status, Option<&Self::Value>, Option<&Self::Cause>) + Send + 'static,
    ) -> &Self {
        self.promise.always(callback);
        self
    }

    fn status(&self) -> Status {
        self.promise.status()
    }
}

impl<P: Promise> fmt::Debug for JoinedPromise<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedPromise")
            .field("sources", &self.sources.len())
            .field("promise", &self.promise)
            .finish()
    }
}
