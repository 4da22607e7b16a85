//! Single tracked record
//!
//! [`AggregateItem`] holds the last persisted snapshot of a record next to
//! its working value. Dirtiness is never stored: it is recomputed from a
//! structural comparison of the two on every read.

use crate::error::AggregateError;
use shepherd_core::{CommandRequest, CommandState, Entity, EntityState, EntityUid};

/// Persisted baseline plus working value of one record
///
/// # Invariants
/// - `is_dirty()` iff `Some(item) != base_item`
/// - the working value never changes identity
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateItem<T> {
    base_item: Option<T>,
    item: T,
}

impl<T: Entity> AggregateItem<T> {
    /// Track a record that has never been persisted
    #[must_use]
    pub fn as_new(item: T) -> Self {
        Self {
            base_item: None,
            item: item.with_entity_state(EntityState::as_new()),
        }
    }

    /// Track a record loaded from the backing store
    #[must_use]
    pub fn as_existing(item: T) -> Self {
        let item = item.with_entity_state(EntityState::existing());
        Self {
            base_item: Some(item.clone()),
            item,
        }
    }

    /// Identity of the tracked record
    #[inline]
    #[must_use]
    pub fn uid(&self) -> EntityUid {
        self.item.uid()
    }

    /// Working value
    #[inline]
    #[must_use]
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Last persisted value, `None` if never persisted
    #[inline]
    #[must_use]
    pub fn base_item(&self) -> Option<&T> {
        self.base_item.as_ref()
    }

    /// Edit state of the working value
    #[inline]
    #[must_use]
    pub fn entity_state(&self) -> EntityState {
        self.item.entity_state()
    }

    /// Check if the record has never been persisted
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.base_item.is_none()
    }

    /// Check if the working value differs from the persisted one
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.base_item.as_ref() != Some(&self.item)
    }

    /// Check if the record is pending deletion
    #[inline]
    #[must_use]
    pub fn is_marked_for_deletion(&self) -> bool {
        self.item.entity_state().marked_for_deletion
    }

    /// Replace the working value
    ///
    /// # Errors
    /// - `AggregateError::IdentityMismatch` if `item` carries another identity;
    ///   the working value is left untouched
    pub fn update(&mut self, item: T) -> Result<(), AggregateError> {
        self.check_identity(&item)?;
        self.item = item;
        Ok(())
    }

    /// Replace the working value, asserting which baseline it was derived from
    ///
    /// Succeeds only while the persisted value still equals `base_variant`,
    /// so a caller cannot silently overwrite a baseline it has not seen.
    /// Never succeeds for a record that has not been persisted.
    ///
    /// # Errors
    /// - `AggregateError::IdentityMismatch` if `actual` carries another identity
    /// - `AggregateError::BaseMismatch` if the baseline moved
    pub fn update_contested(&mut self, actual: T, base_variant: &T) -> Result<(), AggregateError> {
        self.check_identity(&actual)?;
        if self.base_item.as_ref() != Some(base_variant) {
            return Err(AggregateError::BaseMismatch(self.uid()));
        }
        self.item = actual;
        Ok(())
    }

    /// Restore the working value to the persisted one
    ///
    /// No-op for a record that has never been persisted.
    pub fn reset(&mut self) {
        if let Some(base) = &self.base_item {
            self.item = base.clone();
        }
    }

    /// Treat the working value as the new persisted baseline
    ///
    /// The working value's edit state becomes its saved form first, so the
    /// record reads as a clean `Existing` one afterwards.
    pub fn set_as_saved(&mut self) {
        let state = self.item.entity_state().as_saved();
        self.set_entity_state(state);
        self.commit_baseline();
    }

    /// Baseline the working value exactly as it is
    pub(crate) fn commit_baseline(&mut self) {
        self.base_item = Some(self.item.clone());
    }

    /// Flag the working value for deletion on the next save
    pub fn mark_for_deletion(&mut self) {
        let state = self.item.entity_state().mark_for_deletion();
        self.set_entity_state(state);
    }

    /// Edit state an incoming value should carry to replace the working one
    ///
    /// Never-persisted records stay `New`. Otherwise the baseline state is
    /// carried over, flagged as mutated only when the data actually differs
    /// from the baseline.
    #[must_use]
    pub fn stamped(&self, item: T) -> T {
        match &self.base_item {
            None => item.with_entity_state(EntityState::as_new()),
            Some(base) => {
                let base_state = base.entity_state();
                let carried = item.with_entity_state(base_state);
                if &carried == base {
                    carried
                } else {
                    carried.with_entity_state(base_state.mutate())
                }
            }
        }
    }

    /// Write the backing store needs for this record
    #[must_use]
    pub fn command_state(&self) -> CommandState {
        match (self.is_new(), self.is_marked_for_deletion()) {
            (true, true) => CommandState::None,
            (true, false) => CommandState::Add,
            (false, true) => CommandState::Delete,
            (false, false) if self.is_dirty() => CommandState::Update,
            (false, false) => CommandState::None,
        }
    }

    /// Command for this record, `None` if it needs no write
    #[must_use]
    pub fn command_request(&self) -> Option<CommandRequest<T>> {
        match self.command_state() {
            CommandState::None => None,
            state => Some(CommandRequest::new(self.item.clone(), state)),
        }
    }

    pub(crate) fn set_entity_state(&mut self, state: EntityState) {
        self.item = self.item.clone().with_entity_state(state);
    }

    fn check_identity(&self, item: &T) -> Result<(), AggregateError> {
        if item.uid() == self.uid() {
            Ok(())
        } else {
            tracing::debug!("Rejected update for {}: carried {}", self.uid(), item.uid());
            Err(AggregateError::identity_mismatch(self.uid(), item.uid()))
        }
    }
}
