//! Single-entity snapshot context
//!
//! [`SnapshotContext`] owns one immutable snapshot of an entity. Changes go
//! through [`SnapshotContext::dispatch`], one at a time, and every applied
//! change is broadcast to subscribers. Use it when a screen or job edits a
//! single record and does not need a shared [`EntityStore`](crate::EntityStore).

use crate::mutation::{MutationRequest, MutationResult};
use parking_lot::Mutex;
use shepherd_core::{Cancellation, Entity};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Snapshot of one entity with serialized mutation and change notification
#[derive(Debug)]
pub struct SnapshotContext<T> {
    current: watch::Sender<T>,
    saved: Mutex<T>,
    dispatch_lock: tokio::sync::Mutex<()>,
    version: AtomicU64,
}

impl<T: Entity> SnapshotContext<T> {
    /// Create context around an entity
    #[must_use]
    pub fn new(entity: T) -> Self {
        let (current, _) = watch::channel(entity.clone());
        Self {
            current,
            saved: Mutex::new(entity),
            dispatch_lock: tokio::sync::Mutex::new(()),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.current.borrow().clone()
    }

    /// Receive every applied change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.current.subscribe()
    }

    /// Number of changes applied so far
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Check if the snapshot differs from the last saved one
    #[must_use]
    pub fn is_mutated(&self) -> bool {
        *self.saved.lock() != *self.current.borrow()
    }

    /// Treat the current snapshot as saved
    pub fn mark_saved(&self) {
        *self.saved.lock() = self.snapshot();
    }

    /// Restore the last saved snapshot
    ///
    /// Waits for a running dispatch to finish first.
    pub async fn reset(&self) {
        let _guard = self.dispatch_lock.lock().await;
        let saved = self.saved.lock().clone();
        self.publish(saved);
    }

    /// Run a mutation against the current snapshot
    ///
    /// Mutations on one context never overlap; each sees the snapshot the
    /// previous one left. The result is applied only when it is successful
    /// and keeps the entity's identity.
    pub async fn dispatch<F, Fut>(&self, mutation: F) -> MutationResult<T>
    where
        F: FnOnce(MutationRequest<T>) -> Fut,
        Fut: Future<Output = MutationResult<T>>,
    {
        self.dispatch_with_cancellation(Cancellation::new(), mutation)
            .await
    }

    /// Run a mutation that can be cancelled while it awaits
    ///
    /// A result that arrives after cancellation is reported as a failure
    /// and not applied.
    pub async fn dispatch_with_cancellation<F, Fut>(
        &self,
        cancellation: Cancellation,
        mutation: F,
    ) -> MutationResult<T>
    where
        F: FnOnce(MutationRequest<T>) -> Fut,
        Fut: Future<Output = MutationResult<T>>,
    {
        let _guard = self.dispatch_lock.lock().await;
        let current = self.snapshot();
        let uid = current.uid();

        if cancellation.is_cancelled() {
            return MutationResult::failure("Mutation cancelled");
        }

        let result = mutation(MutationRequest {
            entity: current,
            cancellation: cancellation.clone(),
        })
        .await;

        if cancellation.is_cancelled() {
            tracing::debug!("Discarded result of cancelled mutation for {}", uid);
            return MutationResult::failure("Mutation cancelled");
        }
        if !result.successful {
            return MutationResult {
                message: result.message.or_else(|| Some("Mutation failed".to_string())),
                ..result
            };
        }

        match result.entity {
            Some(entity) if entity.uid() != uid => {
                tracing::warn!("Mutation for {} returned entity {}; discarded", uid, entity.uid());
                MutationResult::failure(format!("Mutation changed identity from {uid} to {}", entity.uid()))
            }
            Some(entity) => {
                self.publish(entity.clone());
                MutationResult::success(entity)
            }
            None => MutationResult::unchanged(),
        }
    }

    fn publish(&self, entity: T) {
        self.current.send_replace(entity);
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shepherd_test_utils::{invoice, Invoice};

    fn set_total(total: i64) -> impl FnOnce(MutationRequest<Invoice>) -> std::future::Ready<MutationResult<Invoice>> {
        move |request| {
            let mut entity = request.entity;
            entity.total_amount = total;
            std::future::ready(MutationResult::success(entity))
        }
    }

    #[tokio::test]
    async fn dispatch_applies_and_notifies() {
        let context = SnapshotContext::new(invoice("ACME"));
        let mut changes = context.subscribe();
        assert!(!context.is_mutated());

        let result = context.dispatch(set_total(40)).await;
        assert!(result.successful);
        assert!(result.message.is_none());

        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().total_amount, 40);
        assert_eq!(context.version(), 1);
        assert!(context.is_mutated());
    }

    #[tokio::test]
    async fn failed_mutation_reports_message_and_keeps_snapshot() {
        let context = SnapshotContext::new(invoice("ACME"));
        let before = context.snapshot();

        let result = context
            .dispatch(|_request: MutationRequest<Invoice>| async {
                MutationResult {
                    entity: None,
                    successful: false,
                    message: None,
                }
            })
            .await;

        assert!(!result.successful);
        assert_eq!(result.message.as_deref(), Some("Mutation failed"));
        assert_eq!(context.snapshot(), before);
        assert_eq!(context.version(), 0);
    }

    #[tokio::test]
    async fn identity_change_is_rejected() {
        let context = SnapshotContext::new(invoice("ACME"));

        let result = context
            .dispatch(|_request: MutationRequest<Invoice>| async { MutationResult::success(invoice("Globex")) })
            .await;

        assert!(!result.successful);
        assert_eq!(context.snapshot().customer, "ACME");
    }

    #[tokio::test]
    async fn mark_saved_and_reset() {
        let context = SnapshotContext::new(invoice("ACME"));
        context.dispatch(set_total(10)).await;
        context.mark_saved();
        assert!(!context.is_mutated());

        context.dispatch(set_total(20)).await;
        assert!(context.is_mutated());

        context.reset().await;
        assert_eq!(context.snapshot().total_amount, 10);
        assert!(!context.is_mutated());
    }

    #[tokio::test]
    async fn returning_to_saved_value_is_not_mutated() {
        let context = SnapshotContext::new(invoice("ACME"));
        context.dispatch(set_total(5)).await;
        context.dispatch(set_total(0)).await;

        assert_eq!(context.version(), 2);
        assert!(!context.is_mutated());
    }

    #[tokio::test]
    async fn cancelled_dispatch_is_not_applied() {
        let context = SnapshotContext::new(invoice("ACME"));
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let result = context.dispatch_with_cancellation(cancellation, set_total(9)).await;
        assert!(!result.successful);
        assert_eq!(context.snapshot().total_amount, 0);
    }

    #[tokio::test]
    async fn concurrent_dispatches_do_not_lose_updates() {
        let context = std::sync::Arc::new(SnapshotContext::new(invoice("ACME")));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let context = std::sync::Arc::clone(&context);
                tokio::spawn(async move {
                    context
                        .dispatch(|request: MutationRequest<Invoice>| async move {
                            tokio::task::yield_now().await;
                            let mut entity = request.entity;
                            entity.total_amount += 1;
                            MutationResult::success(entity)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().successful);
        }
        assert_eq!(context.snapshot().total_amount, 20);
    }
}
