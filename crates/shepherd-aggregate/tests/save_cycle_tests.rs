use shepherd_aggregate::{AggregateBase, AggregateError, AggregateItemList, AggregatePolicy};
use shepherd_core::{CommandState, ListQueryRequest, StateCode};
use shepherd_test_utils::{invoice, invoice_line, seeded_broker, Invoice, InvoiceLine, INVOICE_UID_FIELD};

#[derive(Debug, Default)]
struct TotalsPolicy;

impl AggregatePolicy<Invoice, InvoiceLine> for TotalsPolicy {
    fn notify_updated(&self, root: &Invoice, items: &AggregateItemList<InvoiceLine>) -> Option<Invoice> {
        Some(Invoice {
            total_amount: items.live_items().map(InvoiceLine::amount).sum(),
            ..root.clone()
        })
    }
}

async fn load(
    broker: &shepherd_core::InMemoryAggregateBroker<Invoice, InvoiceLine>,
    root: &Invoice,
) -> Result<AggregateBase<Invoice, InvoiceLine, TotalsPolicy>, AggregateError> {
    AggregateBase::load(
        root.uid,
        broker.roots(),
        broker.items(),
        ListQueryRequest::for_parent(INVOICE_UID_FIELD, root.uid),
        TotalsPolicy,
    )
    .await
}

#[tokio::test]
async fn test_edit_save_reload_round() {
    let root = invoice("ACME");
    let lines = vec![invoice_line(&root, "bolts", 2, 50), invoice_line(&root, "nuts", 1, 25)];
    let broker = seeded_broker(&Invoice { total_amount: 125, ..root.clone() }, &lines);

    let mut aggregate = load(&broker, &root).await.unwrap();
    assert_eq!(aggregate.root().entity_state.state_code, StateCode::Existing);

    aggregate.remove_collection_item(lines[1].uid).unwrap();
    aggregate
        .save_collection_item(invoice_line(aggregate.root(), "washers", 4, 5))
        .unwrap();
    assert_eq!(aggregate.root().total_amount, 120);

    let result = aggregate.save(&broker).await;
    assert!(result.successful);
    assert_eq!(result.key_value, Some(root.uid));

    let reloaded = load(&broker, &root).await.unwrap();
    assert_eq!(reloaded.root().total_amount, 120);
    assert_eq!(reloaded.all_items().count(), 2);
    assert!(!reloaded.all_items().any(|l| l.uid == lines[1].uid));
    assert!(!reloaded.is_dirty());
}

#[tokio::test]
async fn test_new_aggregate_first_save_adds_everything() {
    let broker = shepherd_core::InMemoryAggregateBroker::<Invoice, InvoiceLine>::default();
    let mut aggregate = AggregateBase::new_with(invoice("Initech"), TotalsPolicy);
    aggregate
        .save_collection_item(invoice_line(aggregate.root(), "staplers", 3, 10))
        .unwrap();

    let request = aggregate.command_request();
    assert_eq!(request.root.state, CommandState::Add);
    assert_eq!(request.items[0].state, CommandState::Add);

    assert!(aggregate.save(&broker).await.successful);
    assert!(!aggregate.is_new());
    assert_eq!(broker.roots().get(aggregate.uid()).unwrap().total_amount, 30);
    assert_eq!(broker.items().len(), 1);

    // Nothing pending after a successful save.
    assert!(aggregate.command_request().items.is_empty());
    assert_eq!(aggregate.command_request().root.state, CommandState::None);
}

#[tokio::test]
async fn test_injected_failure_keeps_pending_work_for_retry() {
    let root = invoice("ACME");
    let lines = vec![invoice_line(&root, "bolts", 2, 50)];
    let broker = seeded_broker(&Invoice { total_amount: 100, ..root.clone() }, &lines);
    let mut aggregate = load(&broker, &root).await.unwrap();

    aggregate
        .save_collection_item(InvoiceLine {
            quantity: 3,
            ..lines[0].clone()
        })
        .unwrap();

    broker.fail_next_commit();
    let failed = aggregate.save(&broker).await;
    assert!(!failed.successful);
    assert!(aggregate.is_dirty());
    assert_eq!(broker.roots().get(root.uid).unwrap().total_amount, 100);

    let retried = aggregate.save(&broker).await;
    assert!(retried.successful);
    assert_eq!(broker.roots().get(root.uid).unwrap().total_amount, 150);
    assert_eq!(broker.items().get(lines[0].uid).unwrap().quantity, 3);
}

#[tokio::test]
async fn test_root_delete_removes_children() {
    let root = invoice("ACME");
    let lines = vec![invoice_line(&root, "bolts", 2, 50), invoice_line(&root, "nuts", 1, 25)];
    let broker = seeded_broker(&root, &lines);
    let mut aggregate = load(&broker, &root).await.unwrap();

    let current = aggregate.root().clone();
    aggregate.delete_root(current).unwrap();
    assert!(aggregate.save(&broker).await.successful);

    assert!(broker.roots().is_empty());
    assert!(broker.items().is_empty());
    assert_eq!(aggregate.root().entity_state.state_code, StateCode::Deleted);
    assert!(aggregate.items().is_empty());
    assert!(!aggregate.is_dirty());
}

#[tokio::test]
async fn test_reset_after_edits_matches_broker() {
    let root = invoice("ACME");
    let lines = vec![invoice_line(&root, "bolts", 2, 50)];
    let broker = seeded_broker(&Invoice { total_amount: 100, ..root.clone() }, &lines);
    let mut aggregate = load(&broker, &root).await.unwrap();
    let pristine = load(&broker, &root).await.unwrap();

    aggregate.remove_collection_item(lines[0].uid).unwrap();
    aggregate
        .update_root(Invoice {
            customer: "Globex".to_string(),
            ..aggregate.root().clone()
        })
        .unwrap();
    aggregate.reset_aggregate();

    assert_eq!(aggregate.root(), pristine.root());
    assert_eq!(aggregate.items(), pristine.items());
}

#[tokio::test]
async fn test_line_edit_after_root_delete_still_deletes() {
    let root = invoice("ACME");
    let lines = vec![invoice_line(&root, "bolts", 2, 50), invoice_line(&root, "nuts", 1, 25)];
    let broker = seeded_broker(&Invoice { total_amount: 125, ..root.clone() }, &lines);

    let mut aggregate = load(&broker, &root).await.unwrap();
    aggregate.delete_root(aggregate.root().clone()).unwrap();
    aggregate
        .save_collection_item(InvoiceLine {
            quantity: 9,
            ..lines[0].clone()
        })
        .unwrap();

    let result = aggregate.save(&broker).await;
    assert!(result.successful);
    assert!(broker.roots().is_empty());
    assert!(broker.items().is_empty());
    assert_eq!(aggregate.root().entity_state.state_code, StateCode::Deleted);
}

#[tokio::test]
async fn test_deleting_unsaved_aggregate_writes_nothing() {
    let broker = shepherd_core::InMemoryAggregateBroker::<Invoice, InvoiceLine>::default();
    let mut aggregate = AggregateBase::new_with(invoice("Globex"), TotalsPolicy);
    aggregate
        .save_collection_item(invoice_line(aggregate.root(), "gears", 2, 30))
        .unwrap();
    aggregate.delete_root(aggregate.root().clone()).unwrap();

    let result = aggregate.save(&broker).await;
    assert!(result.successful);
    assert!(broker.roots().is_empty());
    assert!(broker.items().is_empty());
}
