//! Command and query records
//!
//! The shapes exchanged with external data brokers. The state layer hands
//! a fully reconciled record to a command handler and never issues storage
//! calls itself.
//!
//! Every result type keeps the same contract: `message` is populated on
//! failure and empty on success.

use crate::cancellation::Cancellation;
use crate::types::EntityUid;
use serde::{Deserialize, Serialize};

/// What a command asks the backing store to do with its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandState {
    /// Nothing to write
    #[default]
    None,
    /// Insert a new record
    Add,
    /// Replace an existing record
    Update,
    /// Remove an existing record
    Delete,
}

/// Single-record write request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest<T> {
    /// The reconciled record
    pub item: T,
    /// Requested write
    pub state: CommandState,
}

impl<T> CommandRequest<T> {
    /// Create new command request
    #[inline]
    #[must_use]
    pub fn new(item: T, state: CommandState) -> Self {
        Self { item, state }
    }
}

/// Outcome of a command
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the write was committed
    pub successful: bool,
    /// Failure reason
    pub message: Option<String>,
    /// Key of the written record, when the handler reports one
    pub key_value: Option<EntityUid>,
}

impl CommandResult {
    /// Successful command without a key
    #[inline]
    #[must_use]
    pub fn success() -> Self {
        Self {
            successful: true,
            message: None,
            key_value: None,
        }
    }

    /// Successful command reporting the written key
    #[inline]
    #[must_use]
    pub fn success_with_key(key_value: EntityUid) -> Self {
        Self {
            successful: true,
            message: None,
            key_value: Some(key_value),
        }
    }

    /// Failed command
    #[inline]
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            message: Some(message.into()),
            key_value: None,
        }
    }
}

/// Root plus dependent-item writes committed as one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCommandRequest<R, I> {
    /// Root record write
    pub root: CommandRequest<R>,
    /// Dependent record writes, including deletions
    pub items: Vec<CommandRequest<I>>,
}

impl<R, I> AggregateCommandRequest<R, I> {
    /// Check if the request writes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.state == CommandState::None
            && self.items.iter().all(|c| c.state == CommandState::None)
    }
}

/// Single-record read request
#[derive(Debug, Clone, Default)]
pub struct ItemQueryRequest {
    /// Key of the record to read
    pub key_value: EntityUid,
    /// Cancellation for the read
    pub cancellation: Cancellation,
}

impl ItemQueryRequest {
    /// Create request for a key
    #[inline]
    #[must_use]
    pub fn new(key_value: EntityUid) -> Self {
        Self {
            key_value,
            cancellation: Cancellation::new(),
        }
    }

    /// With caller-supplied cancellation
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Single-record read result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemQueryResult<T> {
    /// The record, when found
    pub item: Option<T>,
    /// Whether the read succeeded
    pub successful: bool,
    /// Failure reason
    pub message: Option<String>,
}

impl<T> ItemQueryResult<T> {
    /// Successful read
    #[inline]
    #[must_use]
    pub fn success(item: T) -> Self {
        Self {
            item: Some(item),
            successful: true,
            message: None,
        }
    }

    /// Failed read
    #[inline]
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            item: None,
            successful: false,
            message: Some(message.into()),
        }
    }
}

/// Field equality filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Field name
    pub field: String,
    /// Required value, compared against the field's text form
    pub value: String,
}

impl FilterDefinition {
    /// Create new filter
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDefinition {
    /// Field name
    pub field: String,
    /// Descending order
    pub descending: bool,
}

impl SortDefinition {
    /// Ascending sort on a field
    #[inline]
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field
    #[inline]
    #[must_use]
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Paged list read request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQueryRequest {
    /// Offset of the first record
    pub start_index: usize,
    /// Page size; zero means "everything"
    pub page_size: usize,
    /// Equality filters, all of which must match
    pub filters: Vec<FilterDefinition>,
    /// Sort keys, applied in order
    pub sorters: Vec<SortDefinition>,
}

impl ListQueryRequest {
    /// Create request for one page
    #[inline]
    #[must_use]
    pub fn new(start_index: usize, page_size: usize) -> Self {
        Self {
            start_index,
            page_size,
            filters: Vec::new(),
            sorters: Vec::new(),
        }
    }

    /// Request every record
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::new(0, 0)
    }

    /// Request every dependent record whose `field` holds `parent`
    #[inline]
    #[must_use]
    pub fn for_parent(field: impl Into<String>, parent: EntityUid) -> Self {
        Self::all().with_filter(FilterDefinition::new(field, parent.to_string()))
    }

    /// Add filter
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add sort key
    #[inline]
    #[must_use]
    pub fn with_sorter(mut self, sorter: SortDefinition) -> Self {
        self.sorters.push(sorter);
        self
    }
}

impl Default for ListQueryRequest {
    fn default() -> Self {
        Self::all()
    }
}

/// Paged list read result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQueryResult<T> {
    /// Records in the requested page
    pub items: Vec<T>,
    /// Records matching the filters, before paging
    pub total_count: usize,
    /// Whether the read succeeded
    pub successful: bool,
    /// Failure reason
    pub message: Option<String>,
}

impl<T> ListQueryResult<T> {
    /// Successful read
    #[inline]
    #[must_use]
    pub fn success(items: Vec<T>, total_count: usize) -> Self {
        Self {
            items,
            total_count,
            successful: true,
            message: None,
        }
    }

    /// Failed read
    #[inline]
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            successful: false,
            message: Some(message.into()),
        }
    }
}
