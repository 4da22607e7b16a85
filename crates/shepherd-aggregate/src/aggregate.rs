//! Root-plus-dependents aggregate
//!
//! [`AggregateBase`] composes one tracked root record (an invoice) with a
//! list of dependent records (its lines) into a single unit of work:
//! - root edits and deletion requests, stamped by an [`AggregatePolicy`]
//! - dependent upserts and removals, followed by derived-field refresh
//! - save and reset as one transition for root and dependents together
//!
//! The aggregate never writes to storage itself. [`AggregateBase::save`]
//! hands a reconciled [`AggregateCommandRequest`] to an external handler
//! and only baselines its state once the handler reports success.
//!
//! Not thread-safe by contract: one aggregate belongs to one edit session.

use crate::error::AggregateError;
use crate::item::AggregateItem;
use crate::list::AggregateItemList;
use crate::policy::{AggregatePolicy, DefaultPolicy, RootTransition};
use shepherd_core::{
    AggregateCommandHandler, AggregateCommandRequest, CommandRequest, CommandResult, CommandState,
    Entity, EntityUid, ItemQueryHandler, ItemQueryRequest, ItemQueryResult, ListQueryHandler,
    ListQueryRequest, NO_ITEM_EXISTS,
};

/// One root record with its dependent records
///
/// # Invariants
/// - `uid()` is the root's identity
/// - `is_dirty()` iff the root or any dependent is dirty
#[derive(Debug, Clone)]
pub struct AggregateBase<R, I, P = DefaultPolicy> {
    root: AggregateItem<R>,
    items: AggregateItemList<I>,
    policy: P,
}

impl<R: Entity, I: Entity> AggregateBase<R, I, DefaultPolicy> {
    /// Start a new aggregate around a never-persisted root
    #[must_use]
    pub fn new(root: R) -> Self {
        Self::new_with(root, DefaultPolicy)
    }

    /// Track a persisted root and its persisted dependents
    #[must_use]
    pub fn from_existing(root: R, items: impl IntoIterator<Item = I>) -> Self {
        Self::from_existing_with(root, items, DefaultPolicy)
    }
}

impl<R: Entity + Default, I: Entity, P: AggregatePolicy<R, I> + Default> Default
    for AggregateBase<R, I, P>
{
    fn default() -> Self {
        Self::new_with(R::default(), P::default())
    }
}

impl<R: Entity, I: Entity, P: AggregatePolicy<R, I>> AggregateBase<R, I, P> {
    /// Start a new aggregate with a policy
    #[must_use]
    pub fn new_with(root: R, policy: P) -> Self {
        Self {
            root: AggregateItem::as_new(root),
            items: AggregateItemList::new(),
            policy,
        }
    }

    /// Track persisted records with a policy
    #[must_use]
    pub fn from_existing_with(root: R, items: impl IntoIterator<Item = I>, policy: P) -> Self {
        Self {
            root: AggregateItem::as_existing(root),
            items: AggregateItemList::from_existing(items),
            policy,
        }
    }

    /// Build an aggregate from broker reads
    ///
    /// # Arguments
    /// * `uid` - Root identity
    /// * `roots` - Broker holding root records
    /// * `items` - Broker holding dependent records
    /// * `items_request` - Query selecting this root's dependents
    /// * `policy` - Aggregate policy
    ///
    /// # Errors
    /// - `AggregateError::LoadFailed` with the broker's message if either read fails
    pub async fn load<RQ, IQ>(
        uid: EntityUid,
        roots: &RQ,
        items: &IQ,
        items_request: ListQueryRequest,
        policy: P,
    ) -> Result<Self, AggregateError>
    where
        RQ: ItemQueryHandler<R> + ?Sized,
        IQ: ListQueryHandler<I> + ?Sized,
    {
        let root_result = roots.get_item(ItemQueryRequest::new(uid)).await;
        let root = match root_result.item {
            Some(root) if root_result.successful => root,
            _ => {
                let message = root_result
                    .message
                    .unwrap_or_else(|| NO_ITEM_EXISTS.to_string());
                tracing::warn!("Failed to load aggregate root {}: {}", uid, message);
                return Err(AggregateError::LoadFailed(message));
            }
        };

        let items_result = items.get_items(items_request).await;
        if !items_result.successful {
            let message = items_result
                .message
                .unwrap_or_else(|| "Item list query failed".to_string());
            tracing::warn!("Failed to load items of aggregate {}: {}", uid, message);
            return Err(AggregateError::LoadFailed(message));
        }

        tracing::debug!(
            "Loaded aggregate {} with {} items",
            uid,
            items_result.items.len()
        );
        Ok(Self::from_existing_with(root, items_result.items, policy))
    }

    /// Aggregate identity (the root's)
    #[inline]
    #[must_use]
    pub fn uid(&self) -> EntityUid {
        self.root.uid()
    }

    /// Working root record
    #[inline]
    #[must_use]
    pub fn root(&self) -> &R {
        self.root.item()
    }

    /// Tracked root
    #[inline]
    #[must_use]
    pub fn root_item(&self) -> &AggregateItem<R> {
        &self.root
    }

    /// Tracked dependents
    #[inline]
    #[must_use]
    pub fn items(&self) -> &AggregateItemList<I> {
        &self.items
    }

    /// Aggregate policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Check if the root has never been persisted
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.root.is_new()
    }

    /// Check if the root or any dependent is dirty
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.root.is_dirty() || self.items.is_dirty()
    }

    /// Replace the working root
    ///
    /// # Errors
    /// - `AggregateError::IdentityMismatch` if `root` is another record
    pub fn update_root(&mut self, root: R) -> Result<(), AggregateError> {
        self.apply_root(root, RootTransition::Edit)
    }

    /// Request deletion of the root on the next save
    ///
    /// Nothing is removed here; the save pass emits the delete.
    ///
    /// # Errors
    /// - `AggregateError::IdentityMismatch` if `root` is another record
    pub fn delete_root(&mut self, root: R) -> Result<(), AggregateError> {
        self.apply_root(root, RootTransition::Delete)
    }

    /// Upsert a dependent record
    ///
    /// # Errors
    /// Mirrors [`AggregateItemList::save_item`].
    pub fn save_collection_item(&mut self, item: I) -> Result<(), AggregateError> {
        self.items.save_item(item)?;
        self.notify_updated();
        Ok(())
    }

    /// Remove a dependent record
    ///
    /// # Errors
    /// - `AggregateError::ItemNotFound` if no dependent has this identity
    pub fn remove_collection_item(&mut self, uid: EntityUid) -> Result<(), AggregateError> {
        self.items.remove_item(uid)?;
        self.notify_updated();
        Ok(())
    }

    /// Read a dependent record
    #[must_use]
    pub fn get_collection_item(&self, uid: EntityUid) -> ItemQueryResult<I> {
        match self.items.get_item(uid) {
            Some(item) => ItemQueryResult::success(item.clone()),
            None => ItemQueryResult::failure(NO_ITEM_EXISTS),
        }
    }

    /// Dependents not pending deletion
    pub fn live_items(&self) -> impl Iterator<Item = &I> {
        self.items.live_items()
    }

    /// Every dependent, including those pending deletion
    pub fn all_items(&self) -> impl Iterator<Item = &I> {
        self.items.all_items()
    }

    /// Writes that bring the backing store in line with this aggregate
    ///
    /// A root pending deletion also deletes every persisted dependent and
    /// drops never-persisted ones, whether or not the root itself was ever
    /// persisted.
    #[must_use]
    pub fn command_request(&self) -> AggregateCommandRequest<R, I> {
        let root_state = self.root.command_state();

        let items = if self.root.is_marked_for_deletion() {
            self.items
                .entries()
                .filter(|e| !e.is_new())
                .map(|e| CommandRequest::new(e.item().clone(), CommandState::Delete))
                .collect()
        } else {
            self.items.pending_commands()
        };

        AggregateCommandRequest {
            root: CommandRequest::new(self.root.item().clone(), root_state),
            items,
        }
    }

    /// Write pending changes through `handler`
    ///
    /// On success the aggregate is baselined; on failure it is left dirty
    /// so the caller can retry, and the handler's message is returned.
    pub async fn save<H>(&mut self, handler: &H) -> CommandResult
    where
        H: AggregateCommandHandler<R, I> + ?Sized,
    {
        if !self.is_dirty() {
            return CommandResult::success_with_key(self.uid());
        }

        let request = self.command_request();
        let command_count = request.items.len();
        let mut result = handler.execute(request).await;

        if result.successful {
            self.set_aggregate_as_saved();
            tracing::info!("Saved aggregate {} ({} item commands)", self.uid(), command_count);
        } else {
            if result.message.is_none() {
                result.message = Some("Save failed".to_string());
            }
            tracing::warn!(
                "Save of aggregate {} failed: {}",
                self.uid(),
                result.message.as_deref().unwrap_or_default()
            );
        }
        result
    }

    /// Baseline root and dependents together
    ///
    /// Call only after the backing store committed every write in
    /// [`AggregateBase::command_request`]. A deleted root takes its
    /// dependents with it.
    pub fn set_aggregate_as_saved(&mut self) {
        let root_deleted = self.root.is_marked_for_deletion();
        let saved =
            self.policy
                .mutate_root_item_state(&self.root, self.root.item().clone(), RootTransition::Saved);
        if let Err(e) = self.root.update(saved) {
            tracing::error!("Policy changed root identity while saving: {}", e);
        }
        self.root.commit_baseline();
        if root_deleted {
            self.items = AggregateItemList::new();
        } else {
            self.items.set_as_saved();
        }
    }

    /// Discard every pending change to root and dependents
    pub fn reset_aggregate(&mut self) {
        self.root.reset();
        self.items.reset_items();
    }

    fn apply_root(&mut self, root: R, transition: RootTransition) -> Result<(), AggregateError> {
        if root.uid() != self.uid() {
            tracing::debug!("Rejected root update for aggregate {}: carried {}", self.uid(), root.uid());
            return Err(AggregateError::identity_mismatch(self.uid(), root.uid()));
        }
        let stamped = self.policy.mutate_root_item_state(&self.root, root, transition);
        self.root.update(stamped)
    }

    fn notify_updated(&mut self) {
        let Some(root) = self.policy.notify_updated(self.root.item(), &self.items) else {
            return;
        };
        if let Err(e) = self.apply_root(root, RootTransition::Derived) {
            tracing::error!("Derived root update rejected: {}", e);
        }
    }
}
