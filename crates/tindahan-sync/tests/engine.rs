//! End-to-end engine behaviour against the in-memory store.

use std::sync::Arc;

use serde_json::{json, Value};

use tindahan_core::{
    clock, Actor, Category, ClientEvent, CoreError, Customer, Product, Role, SaleStatus,
    StockReason, SyncEventEnvelope, SyncEventStatus,
};
use tindahan_db::{CatalogStore, CustomerStore, LedgerStore, MemoryStore, SaleStore};
use tindahan_sync::{classify, Engine, EngineConfig, EngineError, ErrorCode, FailureClass};

// =============================================================================
// Fixtures
// =============================================================================

const STORE: &str = "s1";

fn actor(role: Role) -> Actor {
    Actor {
        user_id: "u-1".to_string(),
        store_id: STORE.to_string(),
        device_id: "d-1".to_string(),
        role,
        grants: Vec::new(),
        revokes: Vec::new(),
    }
}

fn product(id: &str, qty: i64, updated_micros: i64) -> Product {
    let at = clock::from_micros(updated_micros);
    Product {
        id: id.to_string(),
        store_id: STORE.to_string(),
        sku: format!("SKU-{}", id),
        name: format!("Product {}", id),
        price_centavos: 500,
        stock_quantity: qty,
        category_id: None,
        parent_id: None,
        is_sellable: true,
        is_active: true,
        created_at: at,
        updated_at: at,
    }
}

fn customer(id: &str, balance: i64) -> Customer {
    let now = clock::now();
    Customer {
        id: id.to_string(),
        store_id: STORE.to_string(),
        name: "Aling Nena".to_string(),
        phone: None,
        balance_due_centavos: balance,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

async fn setup() -> (Arc<MemoryStore>, Engine) {
    setup_with(EngineConfig::default()).await
}

async fn setup_with(config: EngineConfig) -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    store.upsert_product(&product("p-1", 50, 1_000)).await.unwrap();
    store.upsert_customer(&customer("c-1", 0)).await.unwrap();
    let engine = Engine::new(store.clone(), config);
    (store, engine)
}

fn event(event_type: &str, payload: Value) -> ClientEvent {
    ClientEvent::parse(event_type, payload).unwrap()
}

async fn quantity(store: &MemoryStore, product_id: &str) -> i64 {
    store
        .product_quantity(STORE, product_id)
        .await
        .unwrap()
        .unwrap()
}

// =============================================================================
// Idempotent replay
// =============================================================================

#[tokio::test]
async fn test_replay_returns_identical_data_and_applies_once() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);
    let restock = event(
        "restock",
        json!({"request_id": "r-1", "product_id": "p-1", "quantity": 12}),
    );

    let first = engine.execute(&owner, &restock, None).await.unwrap();
    let second = engine.execute(&owner, &restock, None).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(
        serde_json::to_string(&first.data).unwrap(),
        serde_json::to_string(&second.data).unwrap()
    );
    assert_eq!(quantity(&store, "p-1").await, 62);
}

#[tokio::test]
async fn test_ledger_conserves_quantity_under_duplicates() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);

    let events = [
        ("restock", json!({"request_id": "r-1", "product_id": "p-1", "quantity": 10})),
        ("adjust_stock", json!({"request_id": "a-1", "product_id": "p-1", "delta_qty": -4})),
        ("restock", json!({"request_id": "r-1", "product_id": "p-1", "quantity": 10})),
        ("adjust_stock", json!({"request_id": "a-2", "product_id": "p-1", "delta_qty": 7})),
        ("adjust_stock", json!({"request_id": "a-1", "product_id": "p-1", "delta_qty": -4})),
    ];
    for (event_type, payload) in events {
        engine
            .execute(&owner, &event(event_type, payload), None)
            .await
            .unwrap();
    }

    let entries = store.ledger_entries(STORE, "p-1").await.unwrap();
    let sum: i64 = entries.iter().map(|e| e.delta_qty).sum();
    assert_eq!(entries.len(), 3);
    assert_eq!(quantity(&store, "p-1").await, 50 + sum);
    assert_eq!(quantity(&store, "p-1").await, 63);
    assert_eq!(entries.last().unwrap().resulting_qty, 63);
}

// =============================================================================
// Sales
// =============================================================================

#[tokio::test]
async fn test_sale_totals_and_receipt() {
    let (store, engine) = setup().await;
    let sale = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-1",
            "items": [{"product_id": "p-1", "quantity": 2, "unit_price_centavos": 500}],
            "payments": [{"method": "cash", "amount_centavos": 1000}],
            "discount_centavos": 100
        }),
    );

    let response = engine.execute(&actor(Role::Owner), &sale, None).await.unwrap();
    let data = &response.data;

    assert_eq!(data["subtotal_centavos"], 1000);
    assert_eq!(data["total_centavos"], 900);
    assert_eq!(data["change_centavos"], 100);
    assert_eq!(data["status"], "completed");
    assert_eq!(data["receipt_number"], "OR-000001");
    assert_eq!(quantity(&store, "p-1").await, 48);
}

#[tokio::test]
async fn test_duplicate_lines_move_stock_once_per_product() {
    let (store, engine) = setup().await;
    let sale = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-dup",
            "items": [
                {"product_id": "p-1", "quantity": 2, "unit_price_centavos": 500},
                {"product_id": "p-1", "quantity": 3, "unit_price_centavos": 500}
            ],
            "payments": [{"method": "cash", "amount_centavos": 2500}]
        }),
    );

    engine.execute(&actor(Role::Cashier), &sale, None).await.unwrap();

    let entries = store.ledger_entries(STORE, "p-1").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].delta_qty, -5);
    assert_eq!(entries[0].reason, StockReason::Sale);
    assert_eq!(quantity(&store, "p-1").await, 45);
}

#[tokio::test]
async fn test_due_sale_raises_balance_and_payment_floors_at_zero() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);

    let due = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-due",
            "status": "due",
            "customer_id": "c-1",
            "items": [{"product_id": "p-1", "quantity": 2, "unit_price_centavos": 500}],
            "payments": [{"method": "cash", "amount_centavos": 300}],
            "discount_centavos": 100
        }),
    );
    let response = engine.execute(&owner, &due, None).await.unwrap();
    assert_eq!(response.data["balance_due_centavos"], 600);

    // Same key: the guard answers with the stored result.
    engine.execute(&owner, &due, None).await.unwrap();
    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 600);

    let pay = event(
        "record_payment",
        json!({"request_id": "pay-1", "customer_id": "c-1", "amount_centavos": 600}),
    );
    let paid = engine.execute(&owner, &pay, None).await.unwrap();
    assert_eq!(paid.data["balance_due_centavos"], 0);

    let over = event(
        "record_payment",
        json!({"request_id": "pay-2", "customer_id": "c-1", "amount_centavos": 100}),
    );
    let paid = engine.execute(&owner, &over, None).await.unwrap();
    assert_eq!(paid.data["balance_due_centavos"], 0);
}

fn due_sale(client_tx_id: &str, qty: i64, paid: i64) -> ClientEvent {
    event(
        "complete_sale",
        json!({
            "client_tx_id": client_tx_id,
            "status": "due",
            "customer_id": "c-1",
            "items": [{"product_id": "p-1", "quantity": qty, "unit_price_centavos": 500}],
            "payments": [{"method": "cash", "amount_centavos": paid}]
        }),
    )
}

#[tokio::test]
async fn test_failed_due_sale_resumes_with_effects_once() {
    let config = EngineConfig {
        ledger_retry_limit: 2,
        ..EngineConfig::default()
    };
    let (store, engine) = setup_with(config).await;
    let owner = actor(Role::Owner);
    let sale = due_sale("tx-flaky", 2, 300);

    store.fail_next_appends(2);
    let err = engine.execute(&owner, &sale, Some("k1")).await.unwrap_err();
    assert_eq!(classify(&err), FailureClass::Retryable);
    let row = store
        .find_sale_by_client_tx(STORE, "tx-flaky")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.receipt_number, None);
    assert!(!row.balance_due_applied);
    assert_eq!(quantity(&store, "p-1").await, 50);

    let retried = engine.execute(&owner, &sale, Some("k1")).await.unwrap();
    assert_eq!(retried.data["resumed"], true);
    assert_eq!(retried.data["receipt_number"], "OR-000001");

    // A fresh key for the same sale re-enters it without new effects.
    let rekeyed = engine.execute(&owner, &sale, Some("k2")).await.unwrap();
    assert!(!rekeyed.replayed);
    assert_eq!(rekeyed.data["resumed"], true);
    assert_eq!(rekeyed.data["receipt_number"], "OR-000001");

    assert_eq!(quantity(&store, "p-1").await, 48);
    assert_eq!(store.ledger_entries(STORE, "p-1").await.unwrap().len(), 1);
    assert_eq!(store.payments_for_sale(STORE, &row.id).await.unwrap().len(), 1);
    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 700);
}

#[tokio::test]
async fn test_settled_sale_cannot_be_resubmitted_with_new_content() {
    let (store, engine) = setup().await;
    store.upsert_customer(&customer("c-1", 1500)).await.unwrap();
    let owner = actor(Role::Owner);

    let first = engine
        .execute(&owner, &due_sale("tx-fixed", 2, 0), Some("k1"))
        .await
        .unwrap();
    let sale_id = first.data["sale_id"].as_str().unwrap().to_string();
    assert_eq!(quantity(&store, "p-1").await, 48);

    let err = engine
        .execute(&owner, &due_sale("tx-fixed", 5, 0), Some("k2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert_eq!(classify(&err), FailureClass::Permanent);
    assert!(matches!(err, EngineError::Rule(CoreError::SubmissionMismatch { .. })));

    let row = store.get_sale(STORE, &sale_id).await.unwrap().unwrap();
    assert_eq!(row.balance_due_centavos, 1000);
    assert_eq!(store.line_items(&sale_id).await.unwrap()[0].quantity, 2);
    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 2500);

    let void = event("void_sale", json!({"sale_id": sale_id, "request_id": "v-1"}));
    let voided = engine.execute(&owner, &void, None).await.unwrap();
    assert_eq!(voided.data["balance_reversed_centavos"], 1000);
    assert_eq!(quantity(&store, "p-1").await, 50);
    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 1500);
}

#[tokio::test]
async fn test_parked_sale_resumes_into_completion() {
    let (store, engine) = setup().await;
    let cashier = actor(Role::Cashier);

    let park = event(
        "park_sale",
        json!({
            "client_tx_id": "tx-park",
            "items": [{"product_id": "p-1", "quantity": 1, "unit_price_centavos": 500}]
        }),
    );
    let parked = engine.execute(&cashier, &park, Some("park-1")).await.unwrap();
    assert_eq!(parked.data["status"], "parked");
    assert_eq!(parked.data["receipt_number"], Value::Null);
    assert_eq!(quantity(&store, "p-1").await, 50);

    let complete = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-park",
            "items": [{"product_id": "p-1", "quantity": 1, "unit_price_centavos": 500}],
            "payments": [{"method": "e_wallet", "amount_centavos": 500, "reference": "GC-1"}]
        }),
    );
    let completed = engine.execute(&cashier, &complete, None).await.unwrap();
    assert_eq!(completed.data["resumed"], true);
    assert_eq!(completed.data["status"], "completed");
    assert_eq!(quantity(&store, "p-1").await, 49);

    let sale = store
        .find_sale_by_client_tx(STORE, "tx-park")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sale.status, SaleStatus::Completed);
    assert_eq!(store.payments_for_sale(STORE, &sale.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let (store, engine) = setup().await;
    store.upsert_product(&product("p-2", 1, 1_000)).await.unwrap();

    let sale = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-short",
            "items": [
                {"product_id": "p-1", "quantity": 1, "unit_price_centavos": 500},
                {"product_id": "p-2", "quantity": 3, "unit_price_centavos": 500}
            ],
            "payments": [{"method": "cash", "amount_centavos": 2000}]
        }),
    );
    let err = engine
        .execute(&actor(Role::Cashier), &sale, None)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert!(matches!(
        err,
        EngineError::Rule(CoreError::InsufficientStock { available: 1, requested: 3, .. })
    ));
    assert!(store.ledger_entries(STORE, "p-1").await.unwrap().is_empty());
    assert_eq!(quantity(&store, "p-2").await, 1);
    assert!(store
        .find_sale_by_client_tx(STORE, "tx-short")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_non_sellable_parent_is_rejected() {
    let (store, engine) = setup().await;
    let mut parent = product("rice-sack", 10, 1_000);
    parent.is_sellable = false;
    store.upsert_product(&parent).await.unwrap();

    let sale = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-parent",
            "items": [{"product_id": "rice-sack", "quantity": 1, "unit_price_centavos": 500}],
            "payments": [{"method": "cash", "amount_centavos": 500}]
        }),
    );
    let err = engine
        .execute(&actor(Role::Cashier), &sale, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rule(_)));
}

// =============================================================================
// Void & Refund
// =============================================================================

async fn completed_sale(engine: &Engine, client_tx_id: &str) -> String {
    let sale = event(
        "complete_sale",
        json!({
            "client_tx_id": client_tx_id,
            "items": [{"product_id": "p-1", "quantity": 2, "unit_price_centavos": 500}],
            "payments": [{"method": "cash", "amount_centavos": 1000}]
        }),
    );
    let response = engine.execute(&actor(Role::Owner), &sale, None).await.unwrap();
    response.data["sale_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_void_is_idempotent() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);
    let sale_id = completed_sale(&engine, "tx-void").await;
    assert_eq!(quantity(&store, "p-1").await, 48);

    let void = event("void_sale", json!({"sale_id": sale_id, "request_id": "v-1"}));
    let first = engine.execute(&owner, &void, None).await.unwrap();
    assert_eq!(first.data["status"], "voided");
    assert_eq!(first.data["idempotent"], false);
    assert_eq!(quantity(&store, "p-1").await, 50);

    let again = event("void_sale", json!({"sale_id": sale_id, "request_id": "v-2"}));
    let second = engine.execute(&owner, &again, None).await.unwrap();
    assert_eq!(second.data["status"], "voided");
    assert_eq!(second.data["idempotent"], true);

    // The first void's own key echoes its stored response.
    let replay = engine.execute(&owner, &void, None).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.data["idempotent"], false);

    let entries = store.ledger_entries(STORE, "p-1").await.unwrap();
    let voids = entries.iter().filter(|e| e.reason == StockReason::Void).count();
    assert_eq!(voids, 1);
    assert_eq!(quantity(&store, "p-1").await, 50);
}

#[tokio::test]
async fn test_void_due_sale_reverses_customer_balance() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);
    let due = event(
        "complete_sale",
        json!({
            "client_tx_id": "tx-due-void",
            "status": "due",
            "customer_id": "c-1",
            "items": [{"product_id": "p-1", "quantity": 1, "unit_price_centavos": 800}]
        }),
    );
    let sale_id = engine.execute(&owner, &due, None).await.unwrap().data["sale_id"]
        .as_str()
        .unwrap()
        .to_string();
    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 800);

    let void = event("void_sale", json!({"sale_id": sale_id}));
    let voided = engine.execute(&owner, &void, None).await.unwrap();
    assert_eq!(voided.data["balance_reversed_centavos"], 800);

    let c = store.get_customer(STORE, "c-1").await.unwrap().unwrap();
    assert_eq!(c.balance_due_centavos, 0);
}

#[tokio::test]
async fn test_refund_respects_refundable_amount() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);
    let sale_id = completed_sale(&engine, "tx-refund").await;

    let too_much = event(
        "refund_sale",
        json!({"sale_id": sale_id, "request_id": "rf-1", "amount_centavos": 1200}),
    );
    let err = engine.execute(&owner, &too_much, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert_eq!(err.details().unwrap()["refundable_centavos"], 1000);

    let refund = event("refund_sale", json!({"sale_id": sale_id, "request_id": "rf-2"}));
    let refunded = engine.execute(&owner, &refund, None).await.unwrap();
    assert_eq!(refunded.data["status"], "refunded");
    assert_eq!(refunded.data["amount_centavos"], 1000);
    assert_eq!(quantity(&store, "p-1").await, 50);

    let void = event("void_sale", json!({"sale_id": sale_id, "request_id": "v-after"}));
    let err = engine.execute(&owner, &void, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Rule(_)));
}

// =============================================================================
// Batch push
// =============================================================================

fn envelope(event_id: &str, event_type: &str, payload: Value) -> SyncEventEnvelope {
    SyncEventEnvelope {
        event_id: event_id.to_string(),
        device_id: "d-1".to_string(),
        event_type: event_type.to_string(),
        payload,
        created_at_device: None,
    }
}

#[tokio::test]
async fn test_batch_partial_failure_continues() {
    let (store, engine) = setup().await;
    let owner = actor(Role::Owner);

    let batch = vec![
        envelope("e-1", "restock", json!({"request_id": "r-1", "product_id": "p-1", "quantity": 5})),
        envelope("e-2", "adjust_stock", json!({"request_id": "a-1", "delta_qty": -1})),
        envelope("e-3", "restock", json!({"request_id": "r-2", "product_id": "p-1", "quantity": 2})),
    ];
    let response = engine.push(&owner, batch.clone()).await.unwrap();

    let statuses: Vec<_> = response.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            SyncEventStatus::Applied,
            SyncEventStatus::FailedPermanent,
            SyncEventStatus::Applied
        ]
    );
    assert_eq!(
        response.results[1].error.as_ref().unwrap().code,
        ErrorCode::BadRequest
    );
    assert_eq!(quantity(&store, "p-1").await, 57);

    // Pushing the same batch again echoes stored results.
    let again = engine.push(&owner, batch).await.unwrap();
    assert_eq!(again.results[0].status, SyncEventStatus::DuplicateIgnored);
    assert_eq!(again.results[0].data, response.results[0].data);
    assert_eq!(again.results[1].status, SyncEventStatus::FailedPermanent);
    assert_eq!(quantity(&store, "p-1").await, 57);
}

#[tokio::test]
async fn test_batch_gate_failure_is_permanent() {
    let (_store, engine) = setup().await;
    let sale_id = completed_sale(&engine, "tx-gate").await;

    let response = engine
        .push(
            &actor(Role::Cashier),
            vec![envelope("e-9", "void-sale", json!({"sale_id": sale_id}))],
        )
        .await
        .unwrap();

    let result = &response.results[0];
    assert_eq!(result.status, SyncEventStatus::FailedPermanent);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::Forbidden);
    assert_eq!(error.details.as_ref().unwrap()["capability"], "sale_void");
}

#[tokio::test]
async fn test_batch_transient_failure_is_retryable() {
    let config = EngineConfig {
        ledger_retry_limit: 2,
        ..EngineConfig::default()
    };
    let (store, engine) = setup_with(config).await;
    store.fail_next_appends(2);

    let batch = vec![envelope(
        "e-1",
        "restock",
        json!({"request_id": "r-1", "product_id": "p-1", "quantity": 5}),
    )];
    let first = engine.push(&actor(Role::Owner), batch.clone()).await.unwrap();
    assert_eq!(first.results[0].status, SyncEventStatus::FailedRetry);
    assert_eq!(quantity(&store, "p-1").await, 50);

    let retry = engine.push(&actor(Role::Owner), batch).await.unwrap();
    assert_eq!(retry.results[0].status, SyncEventStatus::Applied);
    assert_eq!(quantity(&store, "p-1").await, 55);
}

#[tokio::test]
async fn test_batch_limit() {
    let config = EngineConfig {
        max_batch_events: 1,
        ..EngineConfig::default()
    };
    let (_store, engine) = setup_with(config).await;
    let batch = vec![
        envelope("e-1", "restock", json!({"request_id": "r-1", "product_id": "p-1", "quantity": 1})),
        envelope("e-2", "restock", json!({"request_id": "r-2", "product_id": "p-1", "quantity": 1})),
    ];
    let err = engine.push(&actor(Role::Owner), batch).await.unwrap_err();
    assert!(matches!(err, EngineError::BatchTooLarge { size: 2, max: 1 }));
}

// =============================================================================
// Pull
// =============================================================================

#[tokio::test]
async fn test_pull_cursor_is_monotonic_and_stable() {
    let (_store, engine) = setup().await;
    let owner = actor(Role::Owner);

    let first = engine.pull(&owner, None).await.unwrap();
    assert_eq!(first.updates.products.len(), 1);
    assert_eq!(first.updates.customers.len(), 1);
    assert!(!first.has_more);

    let second = engine.pull(&owner, Some(&first.new_cursor)).await.unwrap();
    assert_eq!(second.new_cursor, first.new_cursor);
    assert!(second.updates.products.is_empty());
    assert!(second.updates.customers.is_empty());

    let third = engine.pull(&owner, Some(&second.new_cursor)).await.unwrap();
    assert_eq!(third.new_cursor, second.new_cursor);
}

#[tokio::test]
async fn test_pull_pages_never_split_a_timestamp() {
    let config = EngineConfig {
        pull_page_limit: 2,
        ..EngineConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    store.upsert_product(&product("a", 1, 10)).await.unwrap();
    store.upsert_product(&product("b", 1, 20)).await.unwrap();
    store.upsert_product(&product("c", 1, 20)).await.unwrap();
    let mut gone = product("d", 1, 30);
    gone.is_active = false;
    store.upsert_product(&gone).await.unwrap();
    let engine = Engine::new(store.clone(), config);
    let owner = actor(Role::Owner);

    let page1 = engine.pull(&owner, None).await.unwrap();
    assert!(page1.has_more);
    assert_eq!(page1.new_cursor, "v1:10");
    assert_eq!(page1.updates.products.len(), 1);

    let page2 = engine.pull(&owner, Some(&page1.new_cursor)).await.unwrap();
    assert!(page2.has_more);
    assert_eq!(page2.new_cursor, "v1:20");
    let ids: Vec<_> = page2.updates.products.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    let page3 = engine.pull(&owner, Some(&page2.new_cursor)).await.unwrap();
    assert!(!page3.has_more);
    assert!(page3.updates.products.is_empty());
    assert_eq!(page3.tombstones.products.len(), 1);
    assert_eq!(page3.tombstones.products[0].id, "d");
    assert_eq!(page3.new_cursor, "v1:30");
}

#[tokio::test]
async fn test_pull_reports_categories_and_records_checkpoint() {
    let (store, engine) = setup().await;
    store
        .upsert_category(&Category {
            id: "cat-1".to_string(),
            store_id: STORE.to_string(),
            name: "Canned goods".to_string(),
            is_active: true,
            updated_at: clock::from_micros(5_000),
        })
        .await
        .unwrap();

    let pulled = engine.pull(&actor(Role::Owner), None).await.unwrap();
    assert_eq!(pulled.updates.categories.len(), 1);
    assert_eq!(pulled.updates.categories[0].snapshot["name"], "Canned goods");

    use tindahan_db::SyncEventStore;
    let checkpoint = store.get_checkpoint(STORE, "d-1").await.unwrap().unwrap();
    assert_eq!(checkpoint.cursor, pulled.new_cursor);
}

#[tokio::test]
async fn test_malformed_cursor_is_rejected() {
    let (_store, engine) = setup().await;
    let err = engine
        .pull(&actor(Role::Owner), Some("yesterday"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
}
