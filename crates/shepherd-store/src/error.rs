//! Error types for the entity store
//!
//! Two families:
//! - lifecycle misuse (duplicate registration, unknown identity), which
//!   signals a defect in the calling code
//! - runtime conditions (full queue, timeout, pending removal) that a
//!   caller may retry

use shepherd_core::EntityUid;

/// Entity store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Identity already tracked by this store
    #[error("entity already exists: {0}")]
    EntityAlreadyExists(EntityUid),

    /// Identity not tracked by this store
    #[error("state does not exist: {0}")]
    StateDoesNotExist(EntityUid),

    /// Too many mutations pending for one entity
    #[error("mutation queue full for {uid} ({depth} pending)")]
    QueueFull {
        /// Entity identity
        uid: EntityUid,
        /// Pending mutations at rejection time
        depth: usize,
    },

    /// Identity removed while its mutations were still running
    #[error("removed entity {0} still has mutations running")]
    RemovalPending(EntityUid),

    /// Drain loop ended without reporting the final state
    #[error("mutation queue closed for {0}")]
    QueueClosed(EntityUid),

    /// Queue did not drain in time
    #[error("dispatch to {uid} timed out after {timeout_ms}ms")]
    Timeout {
        /// Entity identity
        uid: EntityUid,
        /// Time waited
        timeout_ms: u64,
    },
}

impl StoreError {
    /// Check if the error reveals misuse of the store's lifecycle
    #[inline]
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::EntityAlreadyExists(_) | Self::StateDoesNotExist(_))
    }

    /// Check if the same dispatch may succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::Timeout { .. } | Self::RemovalPending(_)
        )
    }

    /// Identity the error refers to
    #[must_use]
    pub fn uid(&self) -> EntityUid {
        match self {
            Self::EntityAlreadyExists(uid)
            | Self::StateDoesNotExist(uid)
            | Self::RemovalPending(uid)
            | Self::QueueClosed(uid)
            | Self::QueueFull { uid, .. }
            | Self::Timeout { uid, .. } => *uid,
        }
    }
}
