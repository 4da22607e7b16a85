//! Core types for Shepherd
//!
//! Defines the fundamental entity vocabulary:
//! - Entity identities
//! - Lifecycle state codes and the edit-state value
//! - The [`Entity`] contract every tracked record satisfies

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use uuid::Uuid;

/// Unique entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityUid(pub Uuid);

impl EntityUid {
    /// Generate new entity ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero identity, used for "no key"
    #[inline]
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Check if this is the nil identity
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EntityUid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityUid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EntityUid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Lifecycle stage of an entity relative to the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StateCode {
    /// Never persisted
    #[default]
    New,
    /// Loaded from, or written to, the backing store
    Existing,
    /// Removed from the backing store
    Deleted,
}

impl StateCode {
    /// Get numeric code (the shape generic persistence layers store)
    #[inline]
    #[must_use]
    pub fn value(&self) -> u8 {
        match self {
            StateCode::New => 0,
            StateCode::Existing => 1,
            StateCode::Deleted => 2,
        }
    }
}

/// Edit state carried by every tracked entity
///
/// A pure value: every transition returns a new state and none can fail.
///
/// # Invariants
/// - `is_new()` iff `state_code == StateCode::New`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntityState {
    /// Lifecycle stage
    pub state_code: StateCode,
    /// Edited since it was loaded or last saved
    pub is_mutated: bool,
    /// Pending deletion on the next save
    pub marked_for_deletion: bool,
}

impl EntityState {
    /// Same as [`EntityState::as_new`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::as_new()
    }

    /// State of a record that has never been persisted
    #[inline]
    #[must_use]
    pub fn as_new() -> Self {
        Self {
            state_code: StateCode::New,
            is_mutated: false,
            marked_for_deletion: false,
        }
    }

    /// Clean state of a record loaded from the backing store
    #[inline]
    #[must_use]
    pub fn existing() -> Self {
        Self {
            state_code: StateCode::Existing,
            is_mutated: false,
            marked_for_deletion: false,
        }
    }

    /// Same stage, flagged as edited
    #[inline]
    #[must_use]
    pub fn mutate(self) -> Self {
        Self {
            is_mutated: true,
            ..self
        }
    }

    /// Same stage, flagged for deletion
    #[inline]
    #[must_use]
    pub fn mark_for_deletion(self) -> Self {
        Self {
            marked_for_deletion: true,
            ..self
        }
    }

    /// State after a successful write-through
    ///
    /// New and edited records become clean `Existing`; records marked for
    /// deletion become `Deleted`.
    #[inline]
    #[must_use]
    pub fn as_saved(self) -> Self {
        if self.marked_for_deletion {
            Self {
                state_code: StateCode::Deleted,
                is_mutated: false,
                marked_for_deletion: false,
            }
        } else {
            Self::existing()
        }
    }

    /// Never persisted
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state_code == StateCode::New
    }

    /// Neither edited nor pending deletion
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.is_mutated && !self.marked_for_deletion
    }
}

/// Contract for records tracked by Shepherd
///
/// `PartialEq` must be structural: dirtiness is computed by comparing the
/// working value against the persisted baseline.
pub trait Entity: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Stable identity
    fn uid(&self) -> EntityUid;

    /// Current edit state
    fn entity_state(&self) -> EntityState;

    /// Copy of this record carrying `state`
    #[must_use]
    fn with_entity_state(self, state: EntityState) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_uid_round_trips_through_display() {
        let uid = EntityUid::new();
        let parsed = EntityUid::from_str(&uid.to_string()).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn entity_uid_nil() {
        assert!(EntityUid::nil().is_nil());
        assert!(!EntityUid::new().is_nil());
    }

    #[test]
    fn entity_state_new_is_new() {
        let state = EntityState::as_new();
        assert!(state.is_new());
        assert!(state.is_clean());
        assert_eq!(EntityState::default(), state);
    }

    #[test]
    fn entity_state_transitions() {
        let state = EntityState::existing().mutate();
        assert!(!state.is_new());
        assert!(state.is_mutated);
        assert!(!state.is_clean());

        let deleting = state.mark_for_deletion();
        assert!(deleting.marked_for_deletion);
        assert!(deleting.is_mutated);
    }

    #[test]
    fn entity_state_as_saved() {
        assert_eq!(EntityState::as_new().mutate().as_saved(), EntityState::existing());

        let deleted = EntityState::existing().mark_for_deletion().as_saved();
        assert_eq!(deleted.state_code, StateCode::Deleted);
        assert!(deleted.is_clean());
    }

    #[test]
    fn state_code_values() {
        assert_eq!(StateCode::New.value(), 0);
        assert_eq!(StateCode::Existing.value(), 1);
        assert_eq!(StateCode::Deleted.value(), 2);
    }
}
