//! Serialized mutation queue per tracked entity
//!
//! [`EntityStore`] tracks entities by identity and funnels every change to
//! one entity through a FIFO queue:
//! - at most one drain loop per entity, spawned on demand
//! - each mutation sees the state left by the one before it
//! - a dispatch resolves once the queue it joined is empty, carrying its
//!   own mutation's verdict
//! - a panicking mutation is rejected and the queue moves on
//! - idle entities are evicted by housekeeping
//!
//! Different entities drain independently and in parallel.

use crate::error::StoreError;
use crate::mutation::{boxed, BoxedMutation, DispatchOutcome, MutationRequest, MutationResult};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use shepherd_core::{Cancellation, Entity, EntityUid, StoreConfig};
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Entities currently tracked
    pub tracked: usize,
    /// Mutations accepted into a queue
    pub dispatched: u64,
    /// Mutations whose result replaced the entity state
    pub applied: u64,
    /// Mutations that failed, panicked, were cancelled, or changed identity
    pub rejected: u64,
    /// Entities removed by housekeeping
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    applied: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

type Waiter<T> = oneshot::Sender<DispatchOutcome<T>>;

struct QueuedMutation<T> {
    mutation: BoxedMutation<T>,
    cancellation: Cancellation,
    waiter: Waiter<T>,
}

struct Slot<T> {
    entity: T,
    queue: VecDeque<QueuedMutation<T>>,
    settled: Vec<(Waiter<T>, Result<(), String>)>,
    draining: bool,
    last_activity: Instant,
}

/// One tracked entity and its pending mutations
///
/// The queue is only reachable through [`EntityStore`]; this handle
/// exposes read-only views.
pub struct TrackedEntity<T> {
    uid: EntityUid,
    slot: Mutex<Slot<T>>,
}

impl<T: Entity> TrackedEntity<T> {
    fn new(entity: T) -> Self {
        Self {
            uid: entity.uid(),
            slot: Mutex::new(Slot {
                entity,
                queue: VecDeque::new(),
                settled: Vec::new(),
                draining: false,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Entity identity
    #[inline]
    #[must_use]
    pub fn uid(&self) -> EntityUid {
        self.uid
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> T {
        self.slot.lock().entity.clone()
    }

    /// Mutations waiting behind the one running, if any
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.slot.lock().queue.len()
    }

    /// Check if a drain loop is running
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.slot.lock().draining
    }

    /// When the entity was registered or last finished a mutation
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.slot.lock().last_activity
    }

    fn is_evictable(&self, now: Instant, idle_timeout: Duration) -> bool {
        let slot = self.slot.lock();
        !slot.draining && slot.queue.is_empty() && now.duration_since(slot.last_activity) > idle_timeout
    }
}

impl<T> std::fmt::Debug for TrackedEntity<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedEntity").field("uid", &self.uid).finish_non_exhaustive()
    }
}

/// Registry of tracked entities with serialized mutation
///
/// Cloning shares the registry, so one store can be handed to many tasks.
/// The store is an ordinary value: scope it to the session that owns the
/// entities and drop it with that session.
#[derive(Debug)]
pub struct EntityStore<T> {
    entities: Arc<DashMap<EntityUid, Arc<TrackedEntity<T>>>>,
    // Removed entities whose drain loop had not finished yet
    retired: Arc<DashMap<EntityUid, Arc<TrackedEntity<T>>>>,
    config: Arc<StoreConfig>,
    counters: Arc<Counters>,
}

impl<T> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
            retired: Arc::clone(&self.retired),
            config: Arc::clone(&self.config),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<T: Entity> EntityStore<T> {
    /// Create empty store
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entities: Arc::new(DashMap::new()),
            retired: Arc::new(DashMap::new()),
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Store configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Start tracking an entity
    ///
    /// # Errors
    /// - `StoreError::EntityAlreadyExists` if the identity is tracked
    /// - `StoreError::RemovalPending` if the identity was removed while
    ///   mutations were running and they have not finished
    pub fn add_state(&self, entity: T) -> Result<(), StoreError> {
        let uid = entity.uid();
        self.retired.remove_if(&uid, |_, old| !old.is_draining());
        if self.retired.contains_key(&uid) {
            tracing::debug!("Entity {} re-registered before its old queue drained", uid);
            return Err(StoreError::RemovalPending(uid));
        }
        match self.entities.entry(uid) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!("Entity {} registered twice", uid);
                Err(StoreError::EntityAlreadyExists(uid))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TrackedEntity::new(entity)));
                tracing::debug!("Tracking entity {}", uid);
                Ok(())
            }
        }
    }

    /// Stop tracking an entity, returning its current state
    ///
    /// Mutations already queued still run; their results are no longer
    /// reachable through the store. The identity cannot be registered
    /// again until they finish.
    ///
    /// # Errors
    /// - `StoreError::StateDoesNotExist` if the identity is not tracked
    pub fn remove_state(&self, uid: EntityUid) -> Result<T, StoreError> {
        let (_, tracked) = self
            .entities
            .remove(&uid)
            .ok_or(StoreError::StateDoesNotExist(uid))?;
        tracing::debug!("Stopped tracking entity {}", uid);
        if tracked.is_draining() {
            self.retired.insert(uid, Arc::clone(&tracked));
        }
        Ok(tracked.state())
    }

    /// Current state of an entity
    ///
    /// # Errors
    /// - `StoreError::StateDoesNotExist` if the identity is not tracked
    pub fn get_state(&self, uid: EntityUid) -> Result<T, StoreError> {
        self.entities
            .get(&uid)
            .map(|tracked| tracked.state())
            .ok_or(StoreError::StateDoesNotExist(uid))
    }

    /// Tracked handle of an entity
    #[must_use]
    pub fn tracked(&self, uid: EntityUid) -> Option<Arc<TrackedEntity<T>>> {
        self.entities.get(&uid).map(|tracked| Arc::clone(tracked.value()))
    }

    /// Check if an identity is tracked
    #[inline]
    #[must_use]
    pub fn contains(&self, uid: EntityUid) -> bool {
        self.entities.contains_key(&uid)
    }

    /// Number of tracked entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if nothing is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identities of every tracked entity
    #[must_use]
    pub fn uids(&self) -> Vec<EntityUid> {
        self.entities.iter().map(|entry| *entry.key()).collect()
    }

    /// Queue a mutation and wait for the entity's queue to drain
    ///
    /// # Arguments
    /// * `uid` - Tracked entity
    /// * `mutation` - Receives the state current when it runs
    ///
    /// # Returns
    /// The entity state once every mutation queued before the queue went
    /// idle has run, including ones queued after this one, together with
    /// whether this caller's mutation was accepted and, if not, why.
    ///
    /// # Errors
    /// - `StoreError::StateDoesNotExist` if the identity is not tracked
    /// - `StoreError::QueueFull` if `max_queue_depth` mutations are pending
    /// - `StoreError::QueueClosed` if the drain loop died
    pub async fn dispatch<F, Fut>(
        &self,
        uid: EntityUid,
        mutation: F,
    ) -> Result<DispatchOutcome<T>, StoreError>
    where
        F: FnOnce(MutationRequest<T>) -> Fut + Send + 'static,
        Fut: Future<Output = MutationResult<T>> + Send + 'static,
    {
        self.dispatch_with_cancellation(uid, Cancellation::new(), mutation)
            .await
    }

    /// Queue a mutation that can be cancelled before or while it runs
    ///
    /// A cancelled mutation leaves the state unchanged, is reported as
    /// rejected, and the queue moves on to the next one.
    ///
    /// # Errors
    /// Same as [`EntityStore::dispatch`].
    pub async fn dispatch_with_cancellation<F, Fut>(
        &self,
        uid: EntityUid,
        cancellation: Cancellation,
        mutation: F,
    ) -> Result<DispatchOutcome<T>, StoreError>
    where
        F: FnOnce(MutationRequest<T>) -> Fut + Send + 'static,
        Fut: Future<Output = MutationResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued = QueuedMutation {
            mutation: boxed(mutation),
            cancellation,
            waiter: tx,
        };
        self.enqueue(uid, queued)?;

        if self.config.housekeeping {
            self.do_housekeeping();
        }

        rx.await.map_err(|_| StoreError::QueueClosed(uid))
    }

    /// Like [`EntityStore::dispatch`], giving up after `timeout`
    ///
    /// The mutation stays queued when the wait times out.
    ///
    /// # Errors
    /// - `StoreError::Timeout` if the queue did not drain in time
    /// - everything [`EntityStore::dispatch`] returns
    pub async fn dispatch_timeout<F, Fut>(
        &self,
        uid: EntityUid,
        timeout: Duration,
        mutation: F,
    ) -> Result<DispatchOutcome<T>, StoreError>
    where
        F: FnOnce(MutationRequest<T>) -> Fut + Send + 'static,
        Fut: Future<Output = MutationResult<T>> + Send + 'static,
    {
        tokio::time::timeout(timeout, self.dispatch(uid, mutation))
            .await
            .map_err(|_| StoreError::Timeout {
                uid,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    /// Evict entities idle longer than the configured timeout
    ///
    /// Entities with pending or running mutations are never evicted.
    /// Removed entities whose queue has drained are forgotten.
    ///
    /// # Returns
    /// Number of entities evicted
    pub fn do_housekeeping(&self) -> usize {
        self.retired.retain(|_, tracked| tracked.is_draining());

        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout();
        let before = self.entities.len();

        self.entities.retain(|uid, tracked| {
            let evict = tracked.is_evictable(now, idle_timeout);
            if evict {
                tracing::debug!("Evicting idle entity {}", uid);
            }
            !evict
        });

        let evicted = before.saturating_sub(self.entities.len());
        if evicted > 0 {
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::info!("Housekeeping evicted {} idle entities", evicted);
        }
        evicted
    }

    /// Get store statistics
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            tracked: self.entities.len(),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// Push onto the entity's queue, spawning a drain loop if none runs
    fn enqueue(&self, uid: EntityUid, queued: QueuedMutation<T>) -> Result<(), StoreError> {
        // The map guard is held while queueing so housekeeping cannot evict
        // the entity between lookup and push.
        let tracked = self
            .entities
            .get(&uid)
            .ok_or(StoreError::StateDoesNotExist(uid))?;

        let start_drain = {
            let mut slot = tracked.slot.lock();
            if slot.queue.len() >= self.config.max_queue_depth {
                tracing::warn!("Mutation queue full for {}", uid);
                return Err(StoreError::QueueFull {
                    uid,
                    depth: slot.queue.len(),
                });
            }
            slot.queue.push_back(queued);
            Counters::bump(&self.counters.dispatched);
            !std::mem::replace(&mut slot.draining, true)
        };

        if start_drain {
            let handle = Arc::clone(tracked.value());
            drop(tracked);
            tokio::spawn(drain(handle, Arc::clone(&self.counters)));
        }
        Ok(())
    }
}

/// Run queued mutations one at a time until the queue is empty
async fn drain<T: Entity>(tracked: Arc<TrackedEntity<T>>, counters: Arc<Counters>) {
    let uid = tracked.uid;
    tracing::trace!("Drain loop started for {}", uid);

    loop {
        let (queued, current) = {
            let mut slot = tracked.slot.lock();
            match slot.queue.pop_front() {
                Some(queued) => (queued, slot.entity.clone()),
                None => {
                    slot.draining = false;
                    slot.last_activity = Instant::now();
                    let state = slot.entity.clone();
                    let settled = std::mem::take(&mut slot.settled);
                    drop(slot);

                    for (waiter, verdict) in settled {
                        // Receiver gone means the caller stopped waiting.
                        let _ = waiter.send(DispatchOutcome::settled(state.clone(), verdict));
                    }
                    tracing::trace!("Drain loop finished for {}", uid);
                    return;
                }
            }
        };

        let QueuedMutation {
            mutation,
            cancellation,
            waiter,
        } = queued;

        let outcome = if cancellation.is_cancelled() {
            None
        } else {
            let request = MutationRequest {
                entity: current,
                cancellation: cancellation.clone(),
            };
            Some(run_guarded(mutation, request).await)
        };

        let mut slot = tracked.slot.lock();
        slot.last_activity = Instant::now();

        let verdict = match outcome {
            None => {
                tracing::debug!("Skipped cancelled mutation for {}", uid);
                Counters::bump(&counters.rejected);
                Err(CANCELLED.to_string())
            }
            Some(Err(message)) => {
                tracing::error!("Mutation for {} panicked: {}", uid, message);
                Counters::bump(&counters.rejected);
                Err(format!("Mutation panicked: {message}"))
            }
            Some(Ok(_)) if cancellation.is_cancelled() => {
                tracing::debug!("Discarded result of cancelled mutation for {}", uid);
                Counters::bump(&counters.rejected);
                Err(CANCELLED.to_string())
            }
            Some(Ok(result)) => apply(&mut slot.entity, uid, result, &counters),
        };
        slot.settled.push((waiter, verdict));
    }
}

const CANCELLED: &str = "Mutation cancelled";

/// Run a mutation, turning a panic into an error carrying its message
async fn run_guarded<T: Send + 'static>(
    mutation: BoxedMutation<T>,
    request: MutationRequest<T>,
) -> Result<MutationResult<T>, String> {
    AssertUnwindSafe(async move { mutation(request).await })
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Apply a finished mutation's result to the entity
fn apply<T: Entity>(
    entity: &mut T,
    uid: EntityUid,
    result: MutationResult<T>,
    counters: &Counters,
) -> Result<(), String> {
    if !result.successful {
        let message = result.message.unwrap_or_else(|| "Mutation failed".to_string());
        tracing::debug!("Mutation for {} failed: {}", uid, message);
        Counters::bump(&counters.rejected);
        return Err(message);
    }

    match result.entity {
        Some(next) if next.uid() == uid => {
            *entity = next;
            Counters::bump(&counters.applied);
            Ok(())
        }
        Some(next) => {
            tracing::warn!("Mutation for {} returned entity {}; discarded", uid, next.uid());
            Counters::bump(&counters.rejected);
            Err(format!("Mutation replaced entity {uid} with {}", next.uid()))
        }
        None => Ok(()),
    }
}
