//! Aggregate save simulation
//!
//! Drives one order aggregate through a full edit session against the
//! in-memory broker:
//! 1. Create an order with lines and save it (optionally failing the first
//!    commit to exercise the retry path)
//! 2. Edit the root, change one line, remove another, save again
//! 3. Reload from the broker and compare with the in-memory aggregate
//!
//! Every broken expectation is recorded as a [`Violation`].

use crate::records::{Order, OrderLine, ORDER_UID_FIELD};
use shepherd_aggregate::{AggregateBase, AggregateItemList, AggregatePolicy};
use shepherd_core::{
    InMemoryAggregateBroker, ListQueryHandler, ListQueryRequest, ShepherdConfig, SortDefinition,
};
use std::fmt::Write as _;

/// Keeps the order total equal to the sum of its live lines
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderTotals;

impl AggregatePolicy<Order, OrderLine> for OrderTotals {
    fn notify_updated(&self, root: &Order, items: &AggregateItemList<OrderLine>) -> Option<Order> {
        Some(Order {
            total_cents: items.live_items().map(OrderLine::amount).sum(),
            ..root.clone()
        })
    }
}

/// Order aggregate used by the simulation
pub type OrderAggregate = AggregateBase<Order, OrderLine, OrderTotals>;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Lines created on the order
    pub lines: usize,
    /// Fail the first commit and retry
    pub fail_first_commit: bool,
    /// Lines per page when listing the saved order
    pub page_size: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            lines: 3,
            fail_first_commit: false,
            page_size: ShepherdConfig::default().page_size,
        }
    }
}

/// A broken expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Aggregate reported clean while it had unsaved changes
    CleanWithPendingChanges {
        /// Simulation step
        step: &'static str,
    },
    /// Aggregate stayed dirty after a successful save
    DirtyAfterSave {
        /// Simulation step
        step: &'static str,
    },
    /// Save outcome differed from what the broker was told to do
    UnexpectedSaveOutcome {
        /// Simulation step
        step: &'static str,
        /// Message returned by the save
        message: Option<String>,
    },
    /// Reloaded aggregate differs from the saved one
    ReloadMismatch {
        /// What differed
        detail: String,
    },
}

/// Simulation counters
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Saves attempted
    pub saves_attempted: u64,
    /// Saves the broker rejected
    pub saves_failed: u64,
    /// Line commands sent across all saves
    pub line_commands: u64,
}

/// Final report from the simulation
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Broken expectations
    pub violations: Vec<Violation>,
    /// Order total after the last save
    pub final_total_cents: i64,
    /// Lines stored for the order after the last save
    pub stored_lines: usize,
    /// Lines on the first listing page
    pub first_page_lines: usize,
}

impl SimulatorReport {
    /// Check if every expectation held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Render the report as text
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        let _ = writeln!(report, "=== Shepherd Aggregate Simulation ===\n");
        let _ = writeln!(report, "Lines Created: {}", self.config.lines);
        let _ = writeln!(report, "Saves Attempted: {}", self.stats.saves_attempted);
        let _ = writeln!(report, "Saves Failed: {}", self.stats.saves_failed);
        let _ = writeln!(report, "Line Commands: {}", self.stats.line_commands);
        let _ = writeln!(report, "Final Total: {}", self.final_total_cents);
        let _ = writeln!(
            report,
            "Stored Lines: {} (first page: {})",
            self.stored_lines, self.first_page_lines
        );
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {:?}", i + 1, v);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

struct Session {
    broker: InMemoryAggregateBroker<Order, OrderLine>,
    stats: SimulatorStats,
    violations: Vec<Violation>,
}

impl Session {
    /// Save, expecting `expect_success`, and check dirtiness afterwards
    async fn save(&mut self, aggregate: &mut OrderAggregate, step: &'static str, expect_success: bool) {
        if !aggregate.is_dirty() {
            self.violations.push(Violation::CleanWithPendingChanges { step });
        }

        self.stats.saves_attempted += 1;
        self.stats.line_commands += aggregate.command_request().items.len() as u64;
        let result = aggregate.save(&self.broker).await;

        if !result.successful {
            self.stats.saves_failed += 1;
        }
        if result.successful != expect_success {
            self.violations.push(Violation::UnexpectedSaveOutcome {
                step,
                message: result.message.clone(),
            });
        }
        if result.successful && aggregate.is_dirty() {
            self.violations.push(Violation::DirtyAfterSave { step });
        }
        if !result.successful && !aggregate.is_dirty() {
            self.violations.push(Violation::CleanWithPendingChanges { step });
        }
    }
}

/// Run the aggregate save simulation
///
/// # Errors
/// Fails only if the aggregate rejects an edit the simulation made, which
/// means the harness itself is broken.
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    let mut session = Session {
        broker: InMemoryAggregateBroker::default(),
        stats: SimulatorStats::default(),
        violations: Vec::new(),
    };

    // Phase 1: create and save
    let mut aggregate = OrderAggregate::new_with(Order::new("Simulated customer"), OrderTotals);
    for i in 0..config.lines {
        let quantity = i64::try_from(i)? + 1;
        let line = OrderLine::new(aggregate.root(), format!("article {i:03}"), quantity, 250);
        aggregate.save_collection_item(line)?;
    }
    tracing::info!("Created order {} with {} lines", aggregate.uid(), config.lines);

    if config.fail_first_commit {
        session.broker.fail_next_commit();
        session.save(&mut aggregate, "create (injected failure)", false).await;
    }
    session.save(&mut aggregate, "create", true).await;

    // Phase 2: edit and save
    let renamed = Order {
        customer: "Simulated customer (renamed)".to_string(),
        ..aggregate.root().clone()
    };
    aggregate.update_root(renamed)?;

    let line_uids: Vec<_> = aggregate.live_items().map(|l| l.uid).collect();
    if let Some(&first) = line_uids.first() {
        aggregate.remove_collection_item(first)?;
    }
    if let Some(&second) = line_uids.get(1) {
        if let Some(line) = aggregate.get_collection_item(second).item {
            aggregate.save_collection_item(OrderLine {
                quantity: line.quantity * 10,
                ..line
            })?;
        }
    }
    session.save(&mut aggregate, "edit", true).await;

    // Phase 3: reload and compare
    let reloaded = OrderAggregate::load(
        aggregate.uid(),
        session.broker.roots(),
        session.broker.items(),
        ListQueryRequest::for_parent(ORDER_UID_FIELD, aggregate.uid()),
        OrderTotals,
    )
    .await?;

    if reloaded.root().total_cents != aggregate.root().total_cents {
        session.violations.push(Violation::ReloadMismatch {
            detail: format!(
                "total {} stored, {} in memory",
                reloaded.root().total_cents,
                aggregate.root().total_cents
            ),
        });
    }
    let stored_lines = reloaded.live_items().count();
    if stored_lines != aggregate.live_items().count() {
        session.violations.push(Violation::ReloadMismatch {
            detail: format!(
                "{} lines stored, {} in memory",
                stored_lines,
                aggregate.live_items().count()
            ),
        });
    }

    let first_page = session
        .broker
        .items()
        .get_items(
            ListQueryRequest::new(0, config.page_size)
                .with_filter(shepherd_core::FilterDefinition::new(
                    ORDER_UID_FIELD,
                    aggregate.uid().to_string(),
                ))
                .with_sorter(SortDefinition::ascending("description")),
        )
        .await;

    tracing::info!(
        "Simulation finished with {} violations",
        session.violations.len()
    );

    Ok(SimulatorReport {
        final_total_cents: aggregate.root().total_cents,
        stored_lines,
        first_page_lines: first_page.items.len(),
        config,
        stats: session.stats,
        violations: session.violations,
    })
}
