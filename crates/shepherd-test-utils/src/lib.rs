//! Testing utilities for Shepherd workspace
//!
//! Shared test fixtures: an invoice root record and its line items.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use shepherd_core::{Entity, EntityState, EntityUid, InMemoryAggregateBroker, InMemoryBroker};

/// Field on [`InvoiceLine`] holding the parent invoice identity
pub const INVOICE_UID_FIELD: &str = "invoice_uid";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invoice {
    pub uid: EntityUid,
    pub customer: String,
    pub total_amount: i64,
    pub entity_state: EntityState,
}

impl Entity for Invoice {
    fn uid(&self) -> EntityUid {
        self.uid
    }

    fn entity_state(&self) -> EntityState {
        self.entity_state
    }

    fn with_entity_state(self, entity_state: EntityState) -> Self {
        Self {
            entity_state,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub uid: EntityUid,
    pub invoice_uid: EntityUid,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub entity_state: EntityState,
}

impl InvoiceLine {
    pub fn amount(&self) -> i64 {
        self.quantity * self.unit_price
    }
}

impl Entity for InvoiceLine {
    fn uid(&self) -> EntityUid {
        self.uid
    }

    fn entity_state(&self) -> EntityState {
        self.entity_state
    }

    fn with_entity_state(self, entity_state: EntityState) -> Self {
        Self {
            entity_state,
            ..self
        }
    }
}

pub fn invoice(customer: &str) -> Invoice {
    Invoice {
        uid: EntityUid::new(),
        customer: customer.to_string(),
        total_amount: 0,
        entity_state: EntityState::as_new(),
    }
}

pub fn invoice_line(invoice: &Invoice, description: &str, quantity: i64, unit_price: i64) -> InvoiceLine {
    InvoiceLine {
        uid: EntityUid::new(),
        invoice_uid: invoice.uid,
        description: description.to_string(),
        quantity,
        unit_price,
        entity_state: EntityState::as_new(),
    }
}

/// Broker pre-loaded with one persisted invoice and its lines
pub fn seeded_broker(
    invoice: &Invoice,
    lines: &[InvoiceLine],
) -> InMemoryAggregateBroker<Invoice, InvoiceLine> {
    InMemoryAggregateBroker::new(
        InMemoryBroker::with_records([invoice.clone()]),
        InMemoryBroker::with_records(lines.iter().cloned()),
    )
}
