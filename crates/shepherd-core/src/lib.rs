//! Shepherd Core - entity vocabulary shared by every Shepherd crate
//!
//! Provides:
//! - Entity identities and the [`EntityState`] edit-state value
//! - The [`Entity`] contract for tracked records
//! - Command and query records exchanged with data brokers
//! - Broker traits plus an in-memory broker for tests and tooling
//! - Configuration loading
//!
//! # Example
//!
//! ```rust,ignore
//! use shepherd_core::{InMemoryBroker, ItemQueryHandler, ItemQueryRequest};
//!
//! # async fn example(invoice: Invoice) {
//! let broker = InMemoryBroker::with_records([invoice.clone()]);
//! let result = broker.get_item(ItemQueryRequest::new(invoice.uid())).await;
//! assert!(result.successful);
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod broker;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod records;
pub mod types;

// Re-exports for convenience
pub use broker::{
    AggregateCommandHandler, CommandHandler, InMemoryAggregateBroker, InMemoryBroker,
    ItemQueryHandler, ListQueryHandler, NO_ITEM_EXISTS,
};
pub use cancellation::Cancellation;
pub use config::{ShepherdConfig, StoreConfig};
pub use error::CoreError;
pub use records::{
    AggregateCommandRequest, CommandRequest, CommandResult, CommandState, FilterDefinition,
    ItemQueryRequest, ItemQueryResult, ListQueryRequest, ListQueryResult, SortDefinition,
};
pub use types::{Entity, EntityState, EntityUid, StateCode};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Shepherd Core
    pub use crate::{
        CommandRequest, CommandResult, CommandState, Entity, EntityState, EntityUid,
        ItemQueryResult, StateCode,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
