//! Shepherd Aggregate - dirty tracking for root-plus-children records
//!
//! # Core Concepts
//!
//! - [`AggregateItem`]: one record with its persisted baseline
//! - [`AggregateItemList`]: dependent records, with logical removal until saved
//! - [`AggregateBase`]: a root record plus its dependents as one unit of work
//! - [`AggregatePolicy`]: root state stamping and derived-field hooks
//!
//! # Example
//!
//! ```rust,ignore
//! use shepherd_aggregate::AggregateBase;
//!
//! let mut aggregate = AggregateBase::from_existing(invoice, lines);
//! aggregate.save_collection_item(new_line)?;
//! assert!(aggregate.is_dirty());
//!
//! let result = aggregate.save(&broker).await;
//! assert!(result.successful);
//! assert!(!aggregate.is_dirty());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod aggregate;
mod error;
mod item;
mod list;
mod policy;

// Re-exports
pub use aggregate::AggregateBase;
pub use error::AggregateError;
pub use item::AggregateItem;
pub use list::AggregateItemList;
pub use policy::{stamp_root, AggregatePolicy, DefaultPolicy, RootTransition};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
