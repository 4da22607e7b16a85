//! Data broker contracts and an in-memory implementation
//!
//! The state layer talks to its backing store only through these traits:
//! - [`ItemQueryHandler`]: load one record by key
//! - [`ListQueryHandler`]: load a filtered, sorted page of records
//! - [`CommandHandler`]: write one record
//! - [`AggregateCommandHandler`]: write a root and its dependents as one unit
//!
//! [`InMemoryBroker`] and [`InMemoryAggregateBroker`] back tests and the CLI
//! harness. List queries filter and sort on the JSON projection of each
//! record, so any `Serialize` entity works without field accessors.

use crate::records::{
    AggregateCommandRequest, CommandRequest, CommandResult, CommandState, ItemQueryRequest,
    ItemQueryResult, ListQueryRequest, ListQueryResult, SortDefinition,
};
use crate::types::{Entity, EntityState, EntityUid};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Message returned when a keyed read finds nothing
pub const NO_ITEM_EXISTS: &str = "No Item Exists";

/// Loads a single record by key
#[async_trait]
pub trait ItemQueryHandler<T: Entity>: Send + Sync {
    /// Read one record
    async fn get_item(&self, request: ItemQueryRequest) -> ItemQueryResult<T>;
}

/// Loads a page of records
#[async_trait]
pub trait ListQueryHandler<T: Entity>: Send + Sync {
    /// Read a filtered, sorted page
    async fn get_items(&self, request: ListQueryRequest) -> ListQueryResult<T>;
}

/// Writes a single record
#[async_trait]
pub trait CommandHandler<T: Entity>: Send + Sync {
    /// Execute one write
    async fn execute(&self, request: CommandRequest<T>) -> CommandResult;
}

/// Writes a root record and its dependents in one transaction
///
/// # Contract
/// Either every command in the request is committed or none is.
#[async_trait]
pub trait AggregateCommandHandler<R: Entity, I: Entity>: Send + Sync {
    /// Execute all writes atomically
    async fn execute(&self, request: AggregateCommandRequest<R, I>) -> CommandResult;
}

/// Thread-safe keyed record set
///
/// Cloning shares the underlying records.
#[derive(Debug)]
pub struct InMemoryBroker<T> {
    records: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for InMemoryBroker<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T> Default for InMemoryBroker<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Entity + Serialize> InMemoryBroker<T> {
    /// Create empty broker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create broker seeded with persisted records
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
        let broker = Self::new();
        for record in records {
            broker.insert(record);
        }
        broker
    }

    /// Insert or replace a persisted record
    ///
    /// Returns `true` if the key was new.
    pub fn insert(&self, record: T) -> bool {
        let record = record.with_entity_state(EntityState::existing());
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.uid() == record.uid()) {
            Some(slot) => {
                *slot = record;
                false
            }
            None => {
                records.push(record);
                true
            }
        }
    }

    /// Get a persisted record
    #[must_use]
    pub fn get(&self, uid: EntityUid) -> Option<T> {
        self.records.read().iter().find(|r| r.uid() == uid).cloned()
    }

    /// Snapshot of every persisted record
    #[must_use]
    pub fn records(&self) -> Vec<T> {
        self.records.read().clone()
    }

    /// Number of persisted records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if no record is persisted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn query(&self, request: &ListQueryRequest) -> Result<(Vec<T>, usize), serde_json::Error> {
        let records = self.records.read();

        let mut matched = Vec::with_capacity(records.len());
        for record in records.iter() {
            let projection = serde_json::to_value(record)?;
            let keep = request
                .filters
                .iter()
                .all(|f| projection.get(&f.field).map(field_text).as_deref() == Some(f.value.as_str()));
            if keep {
                matched.push((projection, record.clone()));
            }
        }
        drop(records);

        if !request.sorters.is_empty() {
            matched.sort_by(|(a, _), (b, _)| compare_projections(a, b, &request.sorters));
        }

        let total_count = matched.len();
        let page_size = if request.page_size == 0 {
            usize::MAX
        } else {
            request.page_size
        };
        let page = matched
            .into_iter()
            .skip(request.start_index)
            .take(page_size)
            .map(|(_, record)| record)
            .collect();

        Ok((page, total_count))
    }
}

/// Apply one command to a record set, checking its preconditions
fn apply_command<T: Entity>(
    records: &mut Vec<T>,
    command: CommandRequest<T>,
) -> Result<Option<EntityUid>, String> {
    let uid = command.item.uid();
    let position = records.iter().position(|r| r.uid() == uid);

    match (command.state, position) {
        (CommandState::None, _) => Ok(None),
        (CommandState::Add, Some(_)) => Err(format!("Record {uid} already exists")),
        (CommandState::Add, None) => {
            records.push(command.item.with_entity_state(EntityState::existing()));
            Ok(Some(uid))
        }
        (CommandState::Update | CommandState::Delete, None) => {
            Err(format!("Record {uid} does not exist"))
        }
        (CommandState::Update, Some(idx)) => {
            records[idx] = command.item.with_entity_state(EntityState::existing());
            Ok(Some(uid))
        }
        (CommandState::Delete, Some(idx)) => {
            records.remove(idx);
            Ok(Some(uid))
        }
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => field_text(x).cmp(&field_text(y)),
    }
}

fn compare_projections(a: &Value, b: &Value, sorters: &[SortDefinition]) -> Ordering {
    for sorter in sorters {
        let ordering = compare_values(a.get(&sorter.field), b.get(&sorter.field));
        let ordering = if sorter.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl<T: Entity + Serialize> ItemQueryHandler<T> for InMemoryBroker<T> {
    async fn get_item(&self, request: ItemQueryRequest) -> ItemQueryResult<T> {
        if request.cancellation.is_cancelled() {
            return ItemQueryResult::failure("Query cancelled");
        }
        match self.get(request.key_value) {
            Some(record) => ItemQueryResult::success(record),
            None => ItemQueryResult::failure(NO_ITEM_EXISTS),
        }
    }
}

#[async_trait]
impl<T: Entity + Serialize> ListQueryHandler<T> for InMemoryBroker<T> {
    async fn get_items(&self, request: ListQueryRequest) -> ListQueryResult<T> {
        match self.query(&request) {
            Ok((items, total_count)) => ListQueryResult::success(items, total_count),
            Err(e) => {
                tracing::warn!("List query projection failed: {}", e);
                ListQueryResult::failure(e.to_string())
            }
        }
    }
}

#[async_trait]
impl<T: Entity + Serialize> CommandHandler<T> for InMemoryBroker<T> {
    async fn execute(&self, request: CommandRequest<T>) -> CommandResult {
        let mut records = self.records.write();
        match apply_command(&mut records, request) {
            Ok(Some(uid)) => CommandResult::success_with_key(uid),
            Ok(None) => CommandResult::success(),
            Err(message) => CommandResult::failure(message),
        }
    }
}

/// Root and dependent record sets committed together
///
/// [`AggregateCommandHandler::execute`] validates every command against a
/// scratch copy of both sets and publishes the copies only when all of them
/// succeed, so a failed request leaves the stored records untouched.
#[derive(Debug)]
pub struct InMemoryAggregateBroker<R, I> {
    roots: InMemoryBroker<R>,
    items: InMemoryBroker<I>,
    commit_lock: Mutex<()>,
    fail_next_commit: AtomicBool,
}

impl<R: Entity + Serialize, I: Entity + Serialize> InMemoryAggregateBroker<R, I> {
    /// Create broker over two record sets
    ///
    /// The two sets must be distinct. Clones of one broker passed as both
    /// make every commit fail instead of locking the same records twice.
    #[inline]
    #[must_use]
    pub fn new(roots: InMemoryBroker<R>, items: InMemoryBroker<I>) -> Self {
        Self {
            roots,
            items,
            commit_lock: Mutex::new(()),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Root record set
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &InMemoryBroker<R> {
        &self.roots
    }

    /// Dependent record set
    #[inline]
    #[must_use]
    pub fn items(&self) -> &InMemoryBroker<I> {
        &self.items
    }

    /// Make the next commit fail without applying anything
    #[inline]
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, AtomicOrdering::SeqCst);
    }

    fn shares_storage(&self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.roots.records).cast::<()>(),
            Arc::as_ptr(&self.items.records).cast::<()>(),
        )
    }

    fn commit(&self, request: AggregateCommandRequest<R, I>) -> Result<EntityUid, String> {
        let _guard = self.commit_lock.lock();
        let root_uid = request.root.item.uid();

        if self.shares_storage() {
            return Err("Root and item records share one record set".to_string());
        }

        if self.fail_next_commit.swap(false, AtomicOrdering::SeqCst) {
            return Err("Injected commit failure".to_string());
        }

        let mut roots = self.roots.records.write();
        let mut items = self.items.records.write();

        let mut scratch_roots = roots.clone();
        let mut scratch_items = items.clone();

        apply_command(&mut scratch_roots, request.root)?;
        for command in request.items {
            apply_command(&mut scratch_items, command)?;
        }

        *roots = scratch_roots;
        *items = scratch_items;
        Ok(root_uid)
    }
}

impl<R: Entity + Serialize, I: Entity + Serialize> Default for InMemoryAggregateBroker<R, I> {
    fn default() -> Self {
        Self::new(InMemoryBroker::new(), InMemoryBroker::new())
    }
}

#[async_trait]
impl<R: Entity + Serialize, I: Entity + Serialize> AggregateCommandHandler<R, I>
    for InMemoryAggregateBroker<R, I>
{
    async fn execute(&self, request: AggregateCommandRequest<R, I>) -> CommandResult {
        let item_count = request.items.len();
        match self.commit(request) {
            Ok(uid) => {
                tracing::debug!("Committed aggregate {} with {} item commands", uid, item_count);
                CommandResult::success_with_key(uid)
            }
            Err(message) => {
                tracing::warn!("Aggregate commit rejected: {}", message);
                CommandResult::failure(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FilterDefinition;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        uid: EntityUid,
        owner: String,
        rank: i64,
        state: EntityState,
    }

    impl Entity for Note {
        fn uid(&self) -> EntityUid {
            self.uid
        }

        fn entity_state(&self) -> EntityState {
            self.state
        }

        fn with_entity_state(self, state: EntityState) -> Self {
            Self { state, ..self }
        }
    }

    fn note(owner: &str, rank: i64) -> Note {
        Note {
            uid: EntityUid::new(),
            owner: owner.to_string(),
            rank,
            state: EntityState::as_new(),
        }
    }

    #[tokio::test]
    async fn get_item_found_and_missing() {
        let n = note("ann", 1);
        let broker = InMemoryBroker::with_records([n.clone()]);

        let found = broker.get_item(ItemQueryRequest::new(n.uid)).await;
        assert!(found.successful);
        assert_eq!(found.item.unwrap().state, EntityState::existing());

        let missing = broker.get_item(ItemQueryRequest::new(EntityUid::new())).await;
        assert!(!missing.successful);
        assert_eq!(missing.message.as_deref(), Some(NO_ITEM_EXISTS));
    }

    #[tokio::test]
    async fn get_item_cancelled() {
        let n = note("ann", 1);
        let broker = InMemoryBroker::with_records([n.clone()]);
        let request = ItemQueryRequest::new(n.uid);
        request.cancellation.cancel();

        let result = broker.get_item(request).await;
        assert!(!result.successful);
    }

    #[tokio::test]
    async fn list_query_filters_sorts_and_pages() {
        let broker = InMemoryBroker::with_records([
            note("ann", 3),
            note("bob", 1),
            note("ann", 1),
            note("ann", 2),
        ]);

        let request = ListQueryRequest::new(1, 2)
            .with_filter(FilterDefinition::new("owner", "ann"))
            .with_sorter(SortDefinition::descending("rank"));
        let result = broker.get_items(request).await;

        assert!(result.successful);
        assert_eq!(result.total_count, 3);
        let ranks: Vec<i64> = result.items.iter().map(|n| n.rank).collect();
        assert_eq!(ranks, vec![2, 1]);
    }

    #[tokio::test]
    async fn command_preconditions() {
        let broker = InMemoryBroker::new();
        let n = note("ann", 1);

        let added = broker.execute(CommandRequest::new(n.clone(), CommandState::Add)).await;
        assert!(added.successful);
        assert_eq!(added.key_value, Some(n.uid));

        let again = broker.execute(CommandRequest::new(n.clone(), CommandState::Add)).await;
        assert!(!again.successful);

        let deleted = broker.execute(CommandRequest::new(n.clone(), CommandState::Delete)).await;
        assert!(deleted.successful);
        assert!(broker.is_empty());

        let update = broker.execute(CommandRequest::new(n, CommandState::Update)).await;
        assert!(!update.successful);
        assert!(update.message.is_some());
    }

    #[tokio::test]
    async fn aggregate_commit_is_all_or_nothing() {
        let root = note("root", 0);
        let child = note("child", 1);
        let broker = InMemoryAggregateBroker::<Note, Note>::default();

        // Second item command fails: the root add must not be applied.
        let request = AggregateCommandRequest {
            root: CommandRequest::new(root.clone(), CommandState::Add),
            items: vec![
                CommandRequest::new(child.clone(), CommandState::Add),
                CommandRequest::new(note("ghost", 2), CommandState::Update),
            ],
        };
        let result = broker.execute(request).await;
        assert!(!result.successful);
        assert!(broker.roots().is_empty());
        assert!(broker.items().is_empty());

        let request = AggregateCommandRequest {
            root: CommandRequest::new(root.clone(), CommandState::Add),
            items: vec![CommandRequest::new(child, CommandState::Add)],
        };
        let result = broker.execute(request).await;
        assert!(result.successful);
        assert_eq!(result.key_value, Some(root.uid));
        assert_eq!(broker.items().len(), 1);
    }

    #[tokio::test]
    async fn aggregate_injected_failure_applies_nothing() {
        let broker = InMemoryAggregateBroker::<Note, Note>::default();
        broker.fail_next_commit();

        let request = AggregateCommandRequest {
            root: CommandRequest::new(note("root", 0), CommandState::Add),
            items: vec![],
        };
        assert!(!broker.execute(request.clone()).await.successful);
        assert!(broker.roots().is_empty());

        assert!(broker.execute(request).await.successful);
        assert_eq!(broker.roots().len(), 1);
    }

    #[tokio::test]
    async fn aggregate_commit_over_one_record_set_fails() {
        let shared: InMemoryBroker<Note> = InMemoryBroker::new();
        let broker = InMemoryAggregateBroker::new(shared.clone(), shared.clone());
        let request = AggregateCommandRequest {
            root: CommandRequest::new(note("alice", 1), CommandState::Add),
            items: vec![CommandRequest::new(note("alice", 2), CommandState::Add)],
        };

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), broker.execute(request))
            .await
            .unwrap();
        assert!(!result.successful);
        assert!(shared.is_empty());
    }
}
