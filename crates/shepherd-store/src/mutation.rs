//! Mutation delegate contract
//!
//! A mutation receives the entity's state at the moment it runs, never a
//! copy captured when it was queued, and answers with a [`MutationResult`].

use futures::future::BoxFuture;
use futures::FutureExt;
use shepherd_core::Cancellation;
use std::future::Future;

/// Input handed to a mutation
#[derive(Debug, Clone)]
pub struct MutationRequest<T> {
    /// Current state of the entity
    pub entity: T,
    /// Signal the mutation should honour while it awaits
    pub cancellation: Cancellation,
}

/// Outcome of a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    /// Replacement state, `None` to keep the current one
    pub entity: Option<T>,
    /// Whether the replacement may be applied
    pub successful: bool,
    /// Failure description, set whenever `successful` is false
    pub message: Option<String>,
}

impl<T> MutationResult<T> {
    /// Replace the entity state
    #[inline]
    #[must_use]
    pub fn success(entity: T) -> Self {
        Self {
            entity: Some(entity),
            successful: true,
            message: None,
        }
    }

    /// Succeed without changing anything
    #[inline]
    #[must_use]
    pub fn unchanged() -> Self {
        Self {
            entity: None,
            successful: true,
            message: None,
        }
    }

    /// Reject the mutation
    #[inline]
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            entity: None,
            successful: false,
            message: Some(message.into()),
        }
    }
}

/// What a dispatch reports to its caller
///
/// `state` is shared by every caller whose mutation was drained in the same
/// pass; `successful` and `message` describe this caller's mutation only.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome<T> {
    /// Entity state once the queue drained
    pub state: T,
    /// Whether this caller's mutation was accepted
    pub successful: bool,
    /// Why this caller's mutation was rejected
    pub message: Option<String>,
}

impl<T> DispatchOutcome<T> {
    pub(crate) fn settled(state: T, verdict: Result<(), String>) -> Self {
        match verdict {
            Ok(()) => Self {
                state,
                successful: true,
                message: None,
            },
            Err(message) => Self {
                state,
                successful: false,
                message: Some(message),
            },
        }
    }

    /// Drained state, discarding this caller's verdict
    #[inline]
    #[must_use]
    pub fn into_state(self) -> T {
        self.state
    }
}

/// Boxed future returned by a queued mutation
pub type MutationFuture<T> = BoxFuture<'static, MutationResult<T>>;

/// Type-erased mutation waiting in a queue
pub type BoxedMutation<T> = Box<dyn FnOnce(MutationRequest<T>) -> MutationFuture<T> + Send>;

/// Erase the concrete closure and future types of a mutation
pub(crate) fn boxed<T, F, Fut>(mutation: F) -> BoxedMutation<T>
where
    T: Send + 'static,
    F: FnOnce(MutationRequest<T>) -> Fut + Send + 'static,
    Fut: Future<Output = MutationResult<T>> + Send + 'static,
{
    Box::new(move |request| mutation(request).boxed())
}
