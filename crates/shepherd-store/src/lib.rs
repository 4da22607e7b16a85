//! Shepherd Store - serialized mutation of tracked entities
//!
//! # Core Concepts
//!
//! - [`EntityStore`]: registry of tracked entities; every mutation of one
//!   entity runs strictly after the one queued before it
//! - [`TrackedEntity`]: read-only view of one entity and its queue
//! - [`SnapshotContext`]: one entity, one snapshot, change notification
//! - [`MutationRequest`] / [`MutationResult`]: the mutation delegate contract
//! - [`DispatchOutcome`]: drained state plus the caller's own verdict
//!
//! # Example
//!
//! ```rust,ignore
//! use shepherd_store::{EntityStore, MutationResult};
//!
//! let store = EntityStore::default();
//! store.add_state(invoice.clone())?;
//!
//! let outcome = store
//!     .dispatch(invoice.uid(), |request| async move {
//!         let mut invoice = request.entity;
//!         invoice.total_amount += 10;
//!         MutationResult::success(invoice)
//!     })
//!     .await?;
//! if !outcome.successful {
//!     tracing::warn!("rejected: {:?}", outcome.message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod mutation;
mod snapshot;
mod store;

// Re-exports
pub use error::StoreError;
pub use mutation::{BoxedMutation, DispatchOutcome, MutationFuture, MutationRequest, MutationResult};
pub use snapshot::SnapshotContext;
pub use store::{EntityStore, StoreStats, TrackedEntity};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
