//! Aggregate policies
//!
//! An [`AggregatePolicy`] decides how a root record's edit state is stamped
//! on each transition and whether the root has derived fields (totals,
//! counters) to recompute when its dependent records change.

use crate::item::AggregateItem;
use crate::list::AggregateItemList;
use shepherd_core::Entity;

/// Root transitions a policy stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootTransition {
    /// Root edited
    Edit,
    /// Root requested for deletion
    Delete,
    /// Derived root fields refreshed after a dependent changed
    ///
    /// A pending deletion survives this transition.
    Derived,
    /// Root and dependents durably written
    Saved,
}

/// Domain hooks for an aggregate
///
/// # Contract
/// - `mutate_root_item_state` must return a record with the same identity
///   as `root`
/// - `notify_updated` must be pure: the same inputs give the same output
pub trait AggregatePolicy<R: Entity, I: Entity>: Send + Sync {
    /// Stamp the edit state `root` should carry after `transition`
    ///
    /// `current` is the tracked root before the transition applies.
    fn mutate_root_item_state(
        &self,
        current: &AggregateItem<R>,
        root: R,
        transition: RootTransition,
    ) -> R {
        stamp_root(current, root, transition)
    }

    /// Recompute derived root fields after a dependent record changed
    ///
    /// Returns the updated root, or `None` when nothing is derived.
    fn notify_updated(&self, _root: &R, _items: &AggregateItemList<I>) -> Option<R> {
        None
    }
}

/// Policy with no derived fields and [`EntityState`](shepherd_core::EntityState) stamping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultPolicy;

impl<R: Entity, I: Entity> AggregatePolicy<R, I> for DefaultPolicy {}

/// Stamping shared by every policy that keeps the default state mapping
#[must_use]
pub fn stamp_root<R: Entity>(current: &AggregateItem<R>, root: R, transition: RootTransition) -> R {
    match transition {
        RootTransition::Edit => current.stamped(root),
        RootTransition::Derived => {
            let stamped = current.stamped(root);
            if current.is_marked_for_deletion() {
                let state = stamped.entity_state().mark_for_deletion();
                stamped.with_entity_state(state)
            } else {
                stamped
            }
        }
        RootTransition::Delete => {
            let stamped = current.stamped(root);
            let state = stamped.entity_state().mark_for_deletion();
            stamped.with_entity_state(state)
        }
        RootTransition::Saved => {
            let state = root.entity_state().as_saved();
            root.with_entity_state(state)
        }
    }
}
