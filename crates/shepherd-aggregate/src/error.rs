//! Error types for aggregate operations
//!
//! Every variant is a value-level, recoverable condition: aggregate
//! operations return these and never panic on them.

use shepherd_core::EntityUid;

/// Aggregate operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Update carried a different identity than the tracked record
    #[error("identity mismatch: tracking {expected}, got {actual}")]
    IdentityMismatch {
        /// Identity of the tracked record
        expected: EntityUid,
        /// Identity carried by the rejected update
        actual: EntityUid,
    },

    /// Optimistic update asserted a baseline that is not the current one
    #[error("base state mismatch for {0}")]
    BaseMismatch(EntityUid),

    /// No collection item with this identity
    #[error("no item exists: {0}")]
    ItemNotFound(EntityUid),

    /// Broker could not supply the aggregate
    #[error("load failed: {0}")]
    LoadFailed(String),
}

impl AggregateError {
    /// Create identity mismatch error
    #[inline]
    #[must_use]
    pub fn identity_mismatch(expected: EntityUid, actual: EntityUid) -> Self {
        Self::IdentityMismatch { expected, actual }
    }

    /// Check if the caller may retry the same operation unchanged
    ///
    /// Only loads can succeed on retry; the other variants depend on the
    /// caller's input.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadFailed(_))
    }
}
