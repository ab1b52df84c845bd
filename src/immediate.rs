use std::sync::Arc;

use crate::{Promise, Status};

/// A promise whose outcome is known up front. Callbacks run inline at
/// registration; there is no producer side to settle.
///
/// # Examples
///
/// ```
/// use deferred_out::{rejected, Promise, Status};
///
/// rejected::<(), String>("💥".into())
///     .done(|_| unreachable!())
///     .always(|status, value, cause| {
///         assert_eq!(status, Status::Rejected);
///         assert!(value.is_none());
///         assert_eq!(cause.unwrap(), "💥");
///     });
/// ```
#[derive(Debug)]
pub struct Immediate<D, F> {
    outcome: Arc<Result<D, F>>,
}

impl<D, F> Immediate<D, F> {
    pub fn resolved(value: D) -> Self {
        Self {
            outcome: Arc::new(Ok(value)),
        }
    }

    pub fn rejected(cause: F) -> Self {
        Self {
            outcome: Arc::new(Err(cause)),
        }
    }
}

impl<D, F> Clone for Immediate<D, F> {
    fn clone(&self) -> Self {
        Self {
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl<D, F> Promise for Immediate<D, F> {
    type Value = D;
    type Cause = F;

    fn done(&self, callback: impl FnOnce(&D) + Send + 'static) -> &Self {
        if let Ok(value) = &*self.outcome {
            callback(value);
        }
        self
    }

    fn fail(&self, callback: impl FnOnce(&F) + Send + 'static) -> &Self {
        if let Err(cause) = &*self.outcome {
            callback(cause);
        }
        self
    }

    fn always(
        &self,
        callback: impl FnOnce(Status, Option<&D>, Option<&F>) + Send + 'static,
    ) -> &Self {
        match &*self.outcome {
            Ok(value) => callback(Status::Resolved, Some(value), None),
            Err(cause) => callback(Status::Rejected, None, Some(cause)),
        }
        self
    }

    fn status(&self) -> Status {
        match *self.outcome {
            Ok(_) => Status::Resolved,
            Err(_) => Status::Rejected,
        }
    }
}
