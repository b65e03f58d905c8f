//! # In-Memory Store
//!
//! A [`Storage`] implementation over hash maps behind one tokio `Mutex`.
//! Every trait method takes the lock once, so the atomic primitives are
//! trivially atomic here.
//!
//! Used by the engine's tests; also handy for running the API without a
//! database file.
//!
//! ## Fault Injection
//! ```rust
//! use tindahan_db::memory::MemoryStore;
//!
//! let store = MemoryStore::new();
//! store.fail_next_appends(2); // the next two ledger appends fail transiently
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use tindahan_core::clock;
use tindahan_core::{
    AuditEntry, Category, Customer, DeviceCheckpoint, IdempotencyRecord, IdempotencyStatus,
    OperationKind, Payment, Product, Refund, Sale, SaleLineItem, SaleStatus, StockLedgerEntry,
    StoreSettings, SyncEventRecord,
};

use crate::error::{DbError, DbResult};
use crate::store::{
    AccountPaymentOutcome, AppendOutcome, AuditStore, CatalogStore, ChangeWindow, CustomerStore,
    IdempotencyStore, LedgerStore, SaleStore, Storage, SyncEventStore,
};

type Scoped = (String, String);

fn scoped(store_id: &str, id: &str) -> Scoped {
    (store_id.to_string(), id.to_string())
}

#[derive(Debug, Default)]
struct Inner {
    idempotency: HashMap<(String, OperationKind, String), IdempotencyRecord>,
    products: HashMap<Scoped, Product>,
    categories: HashMap<Scoped, Category>,
    customers: HashMap<Scoped, Customer>,
    settings: HashMap<String, StoreSettings>,
    ledger: Vec<StockLedgerEntry>,
    ledger_keys: HashMap<Scoped, usize>,
    sales: HashMap<String, Sale>,
    line_items: HashMap<String, Vec<SaleLineItem>>,
    payments: Vec<Payment>,
    refunds: Vec<Refund>,
    receipt_counters: HashMap<String, i64>,
    sync_events: HashMap<Scoped, SyncEventRecord>,
    checkpoints: HashMap<Scoped, DeviceCheckpoint>,
    audit: Vec<AuditEntry>,
}

impl Inner {
    fn idempotency_by_id(&mut self, id: &str) -> Option<&mut IdempotencyRecord> {
        self.idempotency.values_mut().find(|r| r.id == id)
    }

    fn sale_mut(&mut self, store_id: &str, sale_id: &str) -> DbResult<&mut Sale> {
        self.sales
            .get_mut(sale_id)
            .filter(|s| s.store_id == store_id)
            .ok_or_else(|| DbError::not_found("Sale", sale_id))
    }
}

/// In-memory [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    append_faults: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` ledger appends fail with a transient error.
    pub fn fail_next_appends(&self, count: u32) {
        self.append_faults.store(count, Ordering::SeqCst);
    }

    fn take_append_fault(&self) -> bool {
        self.append_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn changed<'a, T: 'a>(
    rows: impl Iterator<Item = &'a T>,
    store_id: &str,
    window: ChangeWindow,
    key: impl Fn(&T) -> (&str, i64, &str),
) -> Vec<T>
where
    T: Clone,
{
    let mut hits: Vec<&T> = rows
        .filter(|row| {
            let (store, micros, _) = key(row);
            store == store_id && window.contains(micros)
        })
        .collect();
    hits.sort_by(|a, b| {
        let (_, ma, ia) = key(a);
        let (_, mb, ib) = key(b);
        ma.cmp(&mb).then_with(|| ia.cmp(ib))
    });
    if let Some(limit) = window.limit {
        hits.truncate(limit);
    }
    hits.into_iter().cloned().collect()
}

// =============================================================================
// Idempotency
// =============================================================================

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn find_idempotency(
        &self,
        store_id: &str,
        operation: OperationKind,
        key: &str,
    ) -> DbResult<Option<IdempotencyRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .idempotency
            .get(&(store_id.to_string(), operation, key.to_string()))
            .cloned())
    }

    async fn insert_idempotency(&self, record: &IdempotencyRecord) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        let slot = (
            record.store_id.clone(),
            record.operation,
            record.key.clone(),
        );
        if inner.idempotency.contains_key(&slot) {
            return Err(DbError::duplicate("idempotency_records.key", &record.key));
        }
        inner.idempotency.insert(slot, record.clone());
        Ok(())
    }

    async fn restart_idempotency(
        &self,
        id: &str,
        observed_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.idempotency_by_id(id) {
            Some(record)
                if record.status != IdempotencyStatus::Applied
                    && record.updated_at == observed_updated_at =>
            {
                record.status = IdempotencyStatus::Pending;
                record.attempts += 1;
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_idempotency(
        &self,
        id: &str,
        result: &Value,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .idempotency_by_id(id)
            .ok_or_else(|| DbError::not_found("IdempotencyRecord", id))?;
        if record.status == IdempotencyStatus::Applied {
            return Ok(false);
        }
        record.status = IdempotencyStatus::Applied;
        record.result = Some(result.clone());
        record.last_error = None;
        record.updated_at = now;
        Ok(true)
    }

    async fn fail_idempotency(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.idempotency_by_id(id) {
            if record.status == IdempotencyStatus::Pending {
                record.status = IdempotencyStatus::Failed;
                record.last_error = Some(error.to_string());
                record.updated_at = now;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_ledger_entry(
        &self,
        store_id: &str,
        mutation_key: &str,
    ) -> DbResult<Option<StockLedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledger_keys
            .get(&scoped(store_id, mutation_key))
            .and_then(|&idx| inner.ledger.get(idx))
            .cloned())
    }

    async fn product_quantity(&self, store_id: &str, product_id: &str) -> DbResult<Option<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .get(&scoped(store_id, product_id))
            .map(|p| p.stock_quantity))
    }

    async fn append_ledger_entry(
        &self,
        entry: &StockLedgerEntry,
        expected_qty: i64,
    ) -> DbResult<AppendOutcome> {
        if self.take_append_fault() {
            debug!(mutation_key = %entry.mutation_key, "Injected ledger append fault");
            return Err(DbError::ConnectionFailed("injected fault".to_string()));
        }

        let mut inner = self.inner.lock().await;
        let key = scoped(&entry.store_id, &entry.mutation_key);
        if let Some(existing) = inner.ledger_keys.get(&key).and_then(|&i| inner.ledger.get(i)) {
            return Ok(AppendOutcome::Duplicate(existing.clone()));
        }

        let product = inner
            .products
            .get_mut(&scoped(&entry.store_id, &entry.product_id))
            .ok_or_else(|| DbError::not_found("Product", &entry.product_id))?;
        if product.stock_quantity != expected_qty {
            return Ok(AppendOutcome::Conflict);
        }
        product.stock_quantity = entry.resulting_qty;
        product.updated_at = entry.created_at;

        inner.ledger.push(entry.clone());
        let idx = inner.ledger.len() - 1;
        inner.ledger_keys.insert(key, idx);
        Ok(AppendOutcome::Appended(entry.clone()))
    }

    async fn ledger_entries(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.store_id == store_id && e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn ledger_entries_for_reference(
        &self,
        store_id: &str,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| {
                e.store_id == store_id
                    && e.reference_type == reference_type
                    && e.reference_id == reference_id
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, store_id: &str, id: &str) -> DbResult<Option<Product>> {
        let inner = self.inner.lock().await;
        Ok(inner.products.get(&scoped(store_id, id)).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .products
            .insert(scoped(&product.store_id, &product.id), product.clone());
        Ok(())
    }

    async fn upsert_category(&self, category: &Category) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .categories
            .insert(scoped(&category.store_id, &category.id), category.clone());
        Ok(())
    }

    async fn get_settings(&self, store_id: &str) -> DbResult<Option<StoreSettings>> {
        let inner = self.inner.lock().await;
        Ok(inner.settings.get(store_id).cloned())
    }

    async fn upsert_settings(&self, settings: &StoreSettings) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .settings
            .insert(settings.store_id.clone(), settings.clone());
        Ok(())
    }

    async fn products_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Product>> {
        let inner = self.inner.lock().await;
        Ok(changed(inner.products.values(), store_id, window, |p| {
            (p.store_id.as_str(), clock::to_micros(p.updated_at), p.id.as_str())
        }))
    }

    async fn categories_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Category>> {
        let inner = self.inner.lock().await;
        Ok(changed(inner.categories.values(), store_id, window, |c| {
            (c.store_id.as_str(), clock::to_micros(c.updated_at), c.id.as_str())
        }))
    }

    async fn settings_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Option<StoreSettings>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settings
            .get(store_id)
            .filter(|s| window.contains(clock::to_micros(s.updated_at)))
            .cloned())
    }
}

// =============================================================================
// Customers
// =============================================================================

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn get_customer(&self, store_id: &str, id: &str) -> DbResult<Option<Customer>> {
        let inner = self.inner.lock().await;
        Ok(inner.customers.get(&scoped(store_id, id)).cloned())
    }

    async fn upsert_customer(&self, customer: &Customer) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .customers
            .insert(scoped(&customer.store_id, &customer.id), customer.clone());
        Ok(())
    }

    async fn customers_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Customer>> {
        let inner = self.inner.lock().await;
        Ok(changed(inner.customers.values(), store_id, window, |c| {
            (c.store_id.as_str(), clock::to_micros(c.updated_at), c.id.as_str())
        }))
    }

    async fn apply_account_payment(
        &self,
        customer_id: &str,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> DbResult<AccountPaymentOutcome> {
        let mut inner = self.inner.lock().await;
        let inserted = !inner.payments.iter().any(|p| p.id == payment.id);

        let customer = inner
            .customers
            .get_mut(&scoped(&payment.store_id, customer_id))
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;
        if inserted {
            customer.balance_due_centavos =
                (customer.balance_due_centavos - payment.amount_centavos).max(0);
            customer.updated_at = now;
        }
        let balance_due_centavos = customer.balance_due_centavos;

        if inserted {
            inner.payments.push(payment.clone());
        }
        Ok(AccountPaymentOutcome {
            inserted,
            balance_due_centavos,
        })
    }
}

// =============================================================================
// Sales
// =============================================================================

#[async_trait]
impl SaleStore for MemoryStore {
    async fn find_sale_by_client_tx(
        &self,
        store_id: &str,
        client_tx_id: &str,
    ) -> DbResult<Option<Sale>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sales
            .values()
            .find(|s| s.store_id == store_id && s.client_tx_id == client_tx_id)
            .cloned())
    }

    async fn get_sale(&self, store_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sales
            .get(id)
            .filter(|s| s.store_id == store_id)
            .cloned())
    }

    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        let taken = inner.sales.contains_key(&sale.id)
            || inner
                .sales
                .values()
                .any(|s| s.store_id == sale.store_id && s.client_tx_id == sale.client_tx_id);
        if taken {
            return Err(DbError::duplicate("sales.client_tx_id", &sale.client_tx_id));
        }
        inner.sales.insert(sale.id.clone(), sale.clone());
        Ok(())
    }

    async fn update_sale(&self, sale: &Sale, expected_status: SaleStatus) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        let current = inner.sale_mut(&sale.store_id, &sale.id)?;
        if current.status != expected_status {
            return Ok(false);
        }
        let receipt_number = current.receipt_number.take();
        let balance_due_applied = current.balance_due_applied;
        let balance_applied_centavos = current.balance_applied_centavos;
        let created_at = current.created_at;
        *current = Sale {
            receipt_number,
            balance_due_applied,
            balance_applied_centavos,
            created_at,
            ..sale.clone()
        };
        Ok(true)
    }

    async fn replace_line_items(&self, sale_id: &str, items: &[SaleLineItem]) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner.line_items.insert(sale_id.to_string(), items.to_vec());
        Ok(())
    }

    async fn line_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>> {
        let inner = self.inner.lock().await;
        Ok(inner.line_items.get(sale_id).cloned().unwrap_or_default())
    }

    async fn insert_payment(&self, payment: &Payment) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.payments.iter().any(|p| p.id == payment.id) {
            return Ok(false);
        }
        inner.payments.push(payment.clone());
        Ok(true)
    }

    async fn payments_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Payment>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .iter()
            .filter(|p| p.store_id == store_id && p.sale_id.as_deref() == Some(sale_id))
            .cloned()
            .collect())
    }

    async fn insert_refund(&self, refund: &Refund) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.refunds.iter().any(|r| r.id == refund.id) {
            return Ok(false);
        }
        inner.refunds.push(refund.clone());
        Ok(true)
    }

    async fn refunds_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Refund>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .refunds
            .iter()
            .filter(|r| r.store_id == store_id && r.sale_id == sale_id)
            .cloned()
            .collect())
    }

    async fn assign_receipt_number(
        &self,
        store_id: &str,
        sale_id: &str,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.sale_mut(store_id, sale_id)?.receipt_number.clone() {
            return Ok(existing);
        }

        let counter = inner
            .receipt_counters
            .entry(store_id.to_string())
            .or_insert(0);
        *counter += 1;
        let receipt_number = format!("{}{:06}", prefix, *counter);

        let sale = inner.sale_mut(store_id, sale_id)?;
        sale.receipt_number = Some(receipt_number.clone());
        sale.updated_at = now;
        Ok(receipt_number)
    }

    async fn apply_sale_balance(
        &self,
        store_id: &str,
        sale_id: &str,
        customer_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.sale_mut(store_id, sale_id)?.balance_due_applied {
            return Ok(false);
        }
        let customer = inner
            .customers
            .get_mut(&scoped(store_id, customer_id))
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;
        customer.balance_due_centavos += amount;
        customer.updated_at = now;

        let sale = inner.sale_mut(store_id, sale_id)?;
        sale.balance_due_applied = true;
        sale.balance_applied_centavos = amount;
        sale.updated_at = now;
        Ok(true)
    }

    async fn reverse_sale_balance(
        &self,
        store_id: &str,
        sale_id: &str,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let mut inner = self.inner.lock().await;
        let sale = inner.sale_mut(store_id, sale_id)?;
        if !sale.balance_due_applied {
            return Ok(None);
        }
        let amount = sale.balance_applied_centavos;

        let customer = inner
            .customers
            .get_mut(&scoped(store_id, customer_id))
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;
        customer.balance_due_centavos = (customer.balance_due_centavos - amount).max(0);
        customer.updated_at = now;

        let sale = inner.sale_mut(store_id, sale_id)?;
        sale.balance_due_applied = false;
        sale.balance_applied_centavos = 0;
        sale.updated_at = now;
        Ok(Some(amount))
    }

    async fn transition_sale_status(
        &self,
        store_id: &str,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock().await;
        let sale = inner.sale_mut(store_id, sale_id)?;
        if sale.status != from {
            return Ok(false);
        }
        sale.status = to;
        sale.updated_at = now;
        match to {
            SaleStatus::Voided => sale.voided_at = Some(now),
            SaleStatus::Refunded => sale.refunded_at = Some(now),
            SaleStatus::Completed | SaleStatus::Due => sale.completed_at = Some(now),
            SaleStatus::Parked => {}
        }
        Ok(true)
    }
}

// =============================================================================
// Sync Events & Audit
// =============================================================================

#[async_trait]
impl SyncEventStore for MemoryStore {
    async fn get_sync_event(
        &self,
        store_id: &str,
        event_id: &str,
    ) -> DbResult<Option<SyncEventRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.sync_events.get(&scoped(store_id, event_id)).cloned())
    }

    async fn save_sync_event(&self, record: &SyncEventRecord) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sync_events
            .insert(scoped(&record.store_id, &record.event_id), record.clone());
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &DeviceCheckpoint) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner.checkpoints.insert(
            scoped(&checkpoint.store_id, &checkpoint.device_id),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        store_id: &str,
        device_id: &str,
    ) -> DbResult<Option<DeviceCheckpoint>> {
        let inner = self.inner.lock().await;
        Ok(inner.checkpoints.get(&scoped(store_id, device_id)).cloned())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditEntry) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        inner.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(&self, store_id: &str, limit: usize) -> DbResult<Vec<AuditEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .rev()
            .filter(|e| e.store_id == store_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn health_check(&self) -> DbResult<()> {
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tindahan_core::StockReason;

    fn product(store: &str, id: &str, qty: i64) -> Product {
        let now = clock::now();
        Product {
            id: id.to_string(),
            store_id: store.to_string(),
            sku: format!("SKU-{}", id),
            name: id.to_string(),
            price_centavos: 500,
            stock_quantity: qty,
            category_id: None,
            parent_id: None,
            is_sellable: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(key: &str, delta: i64, resulting: i64) -> StockLedgerEntry {
        StockLedgerEntry {
            id: format!("entry-{}", key),
            store_id: "store-1".to_string(),
            product_id: "p-1".to_string(),
            mutation_key: key.to_string(),
            delta_qty: delta,
            reason: StockReason::Adjustment,
            reference_type: "adjustment".to_string(),
            reference_id: key.to_string(),
            resulting_qty: resulting,
            device_id: None,
            client_tx_id: None,
            created_at: clock::now(),
        }
    }

    #[tokio::test]
    async fn test_append_checks_expected_quantity() {
        let store = MemoryStore::new();
        store.upsert_product(&product("store-1", "p-1", 10)).await.unwrap();

        let stale = store.append_ledger_entry(&entry("k1", 5, 12), 7).await.unwrap();
        assert_eq!(stale, AppendOutcome::Conflict);

        let ok = store.append_ledger_entry(&entry("k1", 5, 15), 10).await.unwrap();
        assert!(matches!(ok, AppendOutcome::Appended(_)));
        assert_eq!(store.product_quantity("store-1", "p-1").await.unwrap(), Some(15));

        let dup = store.append_ledger_entry(&entry("k1", 5, 20), 15).await.unwrap();
        assert!(matches!(dup, AppendOutcome::Duplicate(e) if e.resulting_qty == 15));
        assert_eq!(store.product_quantity("store-1", "p-1").await.unwrap(), Some(15));
    }

    #[tokio::test]
    async fn test_injected_faults_are_transient_and_counted() {
        let store = MemoryStore::new();
        store.upsert_product(&product("store-1", "p-1", 0)).await.unwrap();
        store.fail_next_appends(1);

        let err = store.append_ledger_entry(&entry("k", 1, 1), 0).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.append_ledger_entry(&entry("k", 1, 1), 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_changed_window_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, micros) in [("b", 20), ("a", 20), ("c", 10), ("d", 30)] {
            let mut p = product("store-1", id, 0);
            p.updated_at = clock::from_micros(micros);
            store.upsert_product(&p).await.unwrap();
        }

        let rows = store
            .products_changed("store-1", ChangeWindow::after(10).limit(2))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
