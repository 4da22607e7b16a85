//! Store stress run
//!
//! Hammers an [`EntityStore`] with concurrent increments: every entity gets
//! `mutations` dispatches from as many independent tasks. The run passes
//! when no increment was lost or applied twice on any entity.

use crate::records::Counter;
use shepherd_core::{EntityState, EntityUid, StoreConfig};
use shepherd_store::{EntityStore, MutationRequest, MutationResult, StoreError, StoreStats};
use std::time::{Duration, Instant};

/// Stress run configuration
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Entities tracked
    pub entities: usize,
    /// Increments per entity
    pub mutations: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            entities: 100,
            mutations: 100,
        }
    }
}

/// An entity whose final state does not match the increments sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Entity identity
    pub uid: EntityUid,
    /// Increments applied
    pub value: u64,
    /// Distinct increment tags recorded
    pub distinct_tags: usize,
}

/// Stress run report
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Configuration used
    pub config: StressConfig,
    /// Wall time of the dispatch phase
    pub elapsed: Duration,
    /// Dispatches retried after `QueueFull`
    pub retries: u64,
    /// Entities with lost or duplicated increments
    pub mismatches: Vec<Mismatch>,
    /// Store counters at the end of the run
    pub stats: StoreStats,
}

impl StressReport {
    /// Check if every entity saw exactly its increments
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Applied mutations per second
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.applied as f64 / secs
        } else {
            0.0
        }
    }
}

/// Dispatch one increment, backing off while the queue is full
async fn increment(store: &EntityStore<Counter>, uid: EntityUid, tag: u64) -> Result<u64, StoreError> {
    let mut retries = 0;
    loop {
        let result = store
            .dispatch(uid, move |request: MutationRequest<Counter>| async move {
                tokio::task::yield_now().await;
                let mut counter = request.entity;
                counter.value += 1;
                counter.history.push(tag);
                MutationResult::success(counter)
            })
            .await;

        match result {
            Ok(outcome) => {
                if !outcome.successful {
                    tracing::warn!(
                        "Increment {} on {} rejected: {}",
                        tag,
                        uid,
                        outcome.message.as_deref().unwrap_or_default()
                    );
                }
                return Ok(retries);
            }
            Err(e) if e.is_retryable() => {
                retries += 1;
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run the stress test
///
/// # Errors
/// Fails on store misuse or a crashed dispatch task.
pub async fn run_stress(store_config: StoreConfig, config: StressConfig) -> anyhow::Result<StressReport> {
    let store = EntityStore::new(store_config);

    let mut uids = Vec::with_capacity(config.entities);
    for _ in 0..config.entities {
        let counter = Counter {
            uid: EntityUid::new(),
            entity_state: EntityState::existing(),
            ..Counter::default()
        };
        uids.push(counter.uid);
        store.add_state(counter)?;
    }
    tracing::info!(
        "Stress run: {} entities x {} mutations",
        config.entities,
        config.mutations
    );

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(config.entities * config.mutations);
    for &uid in &uids {
        for tag in 0..config.mutations as u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { increment(&store, uid, tag).await }));
        }
    }

    let mut retries = 0;
    for task in tasks {
        retries += task.await??;
    }
    let elapsed = start.elapsed();

    let mut mismatches = Vec::new();
    for uid in uids {
        let counter = store.get_state(uid)?;
        let mut tags = counter.history.clone();
        tags.sort_unstable();
        tags.dedup();

        let expected = config.mutations as u64;
        if counter.value != expected || tags.len() != config.mutations || counter.history.len() != config.mutations {
            tracing::error!("Entity {} ended at {} of {} increments", uid, counter.value, expected);
            mismatches.push(Mismatch {
                uid,
                value: counter.value,
                distinct_tags: tags.len(),
            });
        }
    }

    Ok(StressReport {
        config,
        elapsed,
        retries,
        mismatches,
        stats: store.stats(),
    })
}
