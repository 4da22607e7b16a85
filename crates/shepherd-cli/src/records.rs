//! Records driven by the harness
//!
//! - [`Order`] and [`OrderLine`]: root and dependents for the save simulation
//! - [`Counter`]: single entity hammered by the stress run

use serde::{Deserialize, Serialize};
use shepherd_core::{Entity, EntityState, EntityUid};

/// Field on [`OrderLine`] holding the parent order identity
pub const ORDER_UID_FIELD: &str = "order_uid";

/// Sales order root record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    /// Identity
    pub uid: EntityUid,
    /// Customer name
    pub customer: String,
    /// Sum of live line amounts, in cents
    pub total_cents: i64,
    /// Edit state
    pub entity_state: EntityState,
}

impl Order {
    /// Create never-persisted order
    #[must_use]
    pub fn new(customer: impl Into<String>) -> Self {
        Self {
            uid: EntityUid::new(),
            customer: customer.into(),
            total_cents: 0,
            entity_state: EntityState::as_new(),
        }
    }
}

/// One line of an [`Order`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Identity
    pub uid: EntityUid,
    /// Parent order
    pub order_uid: EntityUid,
    /// Article description
    pub description: String,
    /// Units ordered
    pub quantity: i64,
    /// Price per unit, in cents
    pub unit_cents: i64,
    /// Edit state
    pub entity_state: EntityState,
}

impl OrderLine {
    /// Create never-persisted line for `order`
    #[must_use]
    pub fn new(order: &Order, description: impl Into<String>, quantity: i64, unit_cents: i64) -> Self {
        Self {
            uid: EntityUid::new(),
            order_uid: order.uid,
            description: description.into(),
            quantity,
            unit_cents,
            entity_state: EntityState::as_new(),
        }
    }

    /// Line amount in cents
    #[inline]
    #[must_use]
    pub fn amount(&self) -> i64 {
        self.quantity * self.unit_cents
    }
}

/// Counter with the sequence of mutations applied to it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counter {
    /// Identity
    pub uid: EntityUid,
    /// Number of applied increments
    pub value: u64,
    /// Tag of every applied increment, in application order
    pub history: Vec<u64>,
    /// Edit state
    pub entity_state: EntityState,
}

macro_rules! impl_entity {
    ($($ty:ty),*) => {
        $(
            impl Entity for $ty {
                fn uid(&self) -> EntityUid {
                    self.uid
                }

                fn entity_state(&self) -> EntityState {
                    self.entity_state
                }

                fn with_entity_state(self, entity_state: EntityState) -> Self {
                    Self { entity_state, ..self }
                }
            }
        )*
    };
}

impl_entity!(Order, OrderLine, Counter);
