//! Collection of tracked records
//!
//! [`AggregateItemList`] keeps dependent records of an aggregate. Removal is
//! logical until the list is saved: records pending deletion stay in
//! [`AggregateItemList::all_items`] so the save pass can emit their deletes.

use crate::error::AggregateError;
use crate::item::AggregateItem;
use shepherd_core::{CommandRequest, Entity, EntityUid};
use std::collections::HashMap;

/// Ordered set of tracked records keyed by identity
///
/// # Invariants
/// - at most one entry per identity
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateItemList<T> {
    entries: Vec<AggregateItem<T>>,
}

impl<T> Default for AggregateItemList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Entity> AggregateItemList<T> {
    /// Create empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create list from persisted records
    #[must_use]
    pub fn from_existing(items: impl IntoIterator<Item = T>) -> Self {
        let mut list = Self::new();
        list.load(items);
        list
    }

    /// Replace every entry with the given persisted records
    ///
    /// Duplicate identities collapse onto the first position, keeping the
    /// last value supplied.
    pub fn load(&mut self, items: impl IntoIterator<Item = T>) {
        let mut positions: HashMap<EntityUid, usize> = HashMap::new();
        let mut entries: Vec<AggregateItem<T>> = Vec::new();

        for item in items {
            let entry = AggregateItem::as_existing(item);
            match positions.get(&entry.uid()) {
                Some(&idx) => entries[idx] = entry,
                None => {
                    positions.insert(entry.uid(), entries.len());
                    entries.push(entry);
                }
            }
        }

        self.entries = entries;
    }

    /// Number of entries, including those pending deletion
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if any entry is dirty
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.entries.iter().any(AggregateItem::is_dirty)
    }

    /// Upsert a record
    ///
    /// A known identity updates that entry, stamped against its baseline;
    /// an unknown identity is appended as a new record.
    ///
    /// # Errors
    /// Never fails for lookup reasons; the `Result` mirrors
    /// [`AggregateItem::update`].
    pub fn save_item(&mut self, item: T) -> Result<(), AggregateError> {
        match self.position(item.uid()) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                let stamped = entry.stamped(item);
                entry.update(stamped)
            }
            None => {
                self.entries.push(AggregateItem::as_new(item));
                Ok(())
            }
        }
    }

    /// Working value of a record
    #[must_use]
    pub fn get_item(&self, uid: EntityUid) -> Option<&T> {
        self.get_entry(uid).map(AggregateItem::item)
    }

    /// Tracked entry of a record
    #[must_use]
    pub fn get_entry(&self, uid: EntityUid) -> Option<&AggregateItem<T>> {
        self.entries.iter().find(|e| e.uid() == uid)
    }

    /// Remove a record
    ///
    /// Persisted records are marked for deletion and kept until
    /// [`AggregateItemList::set_as_saved`]; records that were never persisted
    /// have nothing to delete and are dropped at once.
    ///
    /// # Errors
    /// - `AggregateError::ItemNotFound` if no entry has this identity
    pub fn remove_item(&mut self, uid: EntityUid) -> Result<(), AggregateError> {
        let idx = self.position(uid).ok_or(AggregateError::ItemNotFound(uid))?;

        if self.entries[idx].is_new() {
            self.entries.remove(idx);
        } else {
            self.entries[idx].mark_for_deletion();
        }
        Ok(())
    }

    /// Records not pending deletion
    pub fn live_items(&self) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(|e| !e.is_marked_for_deletion())
            .map(AggregateItem::item)
    }

    /// Every record, including those pending deletion
    pub fn all_items(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(AggregateItem::item)
    }

    /// Tracked entries
    pub fn entries(&self) -> impl Iterator<Item = &AggregateItem<T>> {
        self.entries.iter()
    }

    /// Discard every pending edit
    ///
    /// Drops never-persisted records and reverts the rest to their baseline,
    /// which also clears deletion marks.
    pub fn reset_items(&mut self) {
        self.entries.retain(|e| !e.is_new());
        for entry in &mut self.entries {
            entry.reset();
        }
    }

    /// Commit every pending edit as the new baseline
    ///
    /// Call only after the backing store has durably applied
    /// [`AggregateItemList::pending_commands`]. Records pending deletion are
    /// dropped.
    pub fn set_as_saved(&mut self) {
        self.entries.retain(|e| !e.is_marked_for_deletion());
        for entry in &mut self.entries {
            entry.set_as_saved();
        }
    }

    /// Writes needed to bring the backing store in line with this list
    #[must_use]
    pub fn pending_commands(&self) -> Vec<CommandRequest<T>> {
        self.entries
            .iter()
            .filter_map(AggregateItem::command_request)
            .collect()
    }

    fn position(&self, uid: EntityUid) -> Option<usize> {
        self.entries.iter().position(|e| e.uid() == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use shepherd_core::CommandState;
    use shepherd_test_utils::{invoice, invoice_line, InvoiceLine};

    fn lines(count: usize) -> Vec<InvoiceLine> {
        let parent = invoice("ACME");
        (0..count)
            .map(|i| invoice_line(&parent, &format!("line {i}"), 1, 100))
            .collect()
    }

    #[test]
    fn from_existing_is_clean() {
        let list = AggregateItemList::from_existing(lines(3));
        assert_eq!(list.len(), 3);
        assert!(!list.is_dirty());
        assert!(list.pending_commands().is_empty());
    }

    #[test]
    fn load_collapses_duplicate_identities() {
        let mut source = lines(2);
        let mut duplicate = source[0].clone();
        duplicate.quantity = 9;
        source.push(duplicate);

        let list = AggregateItemList::from_existing(source.clone());
        assert_eq!(list.len(), 2);
        assert_eq!(list.get_item(source[0].uid).unwrap().quantity, 9);
        let order: Vec<EntityUid> = list.all_items().map(|l| l.uid).collect();
        assert_eq!(order, vec![source[0].uid, source[1].uid]);
    }

    #[test]
    fn save_item_inserts_unknown_identity_as_new() {
        let mut list = AggregateItemList::from_existing(lines(1));
        let fresh = lines(1).remove(0);

        list.save_item(fresh.clone()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.get_entry(fresh.uid).unwrap().is_new());
        assert!(list.is_dirty());
    }

    #[test]
    fn save_item_updates_known_identity() {
        let source = lines(1);
        let mut list = AggregateItemList::from_existing(source.clone());

        let edited = InvoiceLine {
            quantity: 5,
            ..source[0].clone()
        };
        list.save_item(edited).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.get_item(source[0].uid).unwrap().quantity, 5);
        assert!(list.get_item(source[0].uid).unwrap().entity_state.is_mutated);
        assert_eq!(list.pending_commands()[0].state, CommandState::Update);
    }

    #[test]
    fn save_item_twice_is_idempotent() {
        let source = lines(1);
        let mut list = AggregateItemList::from_existing(source.clone());
        let edited = InvoiceLine {
            quantity: 5,
            ..source[0].clone()
        };

        list.save_item(edited.clone()).unwrap();
        let after_first = list.clone();
        list.save_item(edited).unwrap();

        assert_eq!(list, after_first);
        assert!(list.is_dirty());
    }

    #[test]
    fn remove_persisted_item_marks_for_deletion() {
        let source = lines(2);
        let mut list = AggregateItemList::from_existing(source.clone());

        list.remove_item(source[0].uid).unwrap();

        assert_eq!(list.live_items().count(), 1);
        assert_eq!(list.all_items().count(), 2);
        assert!(list.get_item(source[0].uid).unwrap().entity_state.marked_for_deletion);
        assert_eq!(list.pending_commands()[0].state, CommandState::Delete);

        list.set_as_saved();
        assert_eq!(list.all_items().count(), 1);
        assert!(list.get_item(source[0].uid).is_none());
        assert!(!list.is_dirty());
    }

    #[test]
    fn remove_new_item_drops_it() {
        let mut list = AggregateItemList::new();
        let fresh = lines(1).remove(0);
        list.save_item(fresh.clone()).unwrap();

        list.remove_item(fresh.uid).unwrap();
        assert!(list.is_empty());
        assert!(!list.is_dirty());
    }

    #[test]
    fn remove_unknown_item_fails() {
        let mut list: AggregateItemList<InvoiceLine> = AggregateItemList::new();
        let uid = EntityUid::new();
        assert_eq!(list.remove_item(uid), Err(AggregateError::ItemNotFound(uid)));
    }

    #[test]
    fn reset_items_discards_unsaved_inserts() {
        let source = lines(2);
        let mut list = AggregateItemList::from_existing(source.clone());

        let fresh = lines(1).remove(0);
        list.save_item(fresh.clone()).unwrap();
        list.save_item(InvoiceLine {
            quantity: 42,
            ..source[1].clone()
        })
        .unwrap();
        list.remove_item(source[0].uid).unwrap();

        list.reset_items();

        assert_eq!(list.len(), 2);
        assert!(list.get_item(fresh.uid).is_none());
        assert_eq!(list.get_item(source[1].uid).unwrap().quantity, 1);
        assert_eq!(list.live_items().count(), 2);
        assert!(!list.is_dirty());
    }

    #[test]
    fn set_as_saved_baselines_new_items_as_existing() {
        let mut list = AggregateItemList::new();
        let fresh = lines(1).remove(0);
        list.save_item(fresh.clone()).unwrap();

        list.set_as_saved();
        let entry = list.get_entry(fresh.uid).unwrap();
        assert!(!entry.is_new());
        assert!(!entry.entity_state().is_new());
        assert!(!list.is_dirty());
    }

    proptest! {
        #[test]
        fn prop_list_dirty_iff_any_entry_dirty(edits in proptest::collection::vec(proptest::option::of(1i64..50), 1..8)) {
            let source = lines(edits.len());
            let mut list = AggregateItemList::from_existing(source.clone());

            for (line, edit) in source.iter().zip(&edits) {
                if let Some(quantity) = edit {
                    list.save_item(InvoiceLine { quantity: *quantity, ..line.clone() }).unwrap();
                }
            }

            let any_dirty = list.entries().any(AggregateItem::is_dirty);
            prop_assert_eq!(list.is_dirty(), any_dirty);
            prop_assert_eq!(any_dirty, edits.iter().any(|e| matches!(e, Some(q) if *q != 1)));
        }
    }
}
