//! # Storage Access Interface
//!
//! The engine never talks to SQLite directly. Every component receives a
//! [`SharedStore`] through its constructor, so tests can swap in
//! [`MemoryStore`](crate::memory::MemoryStore).
//!
//! ## Trait Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Storage                                      │
//! │                                                                         │
//! │  IdempotencyStore   guard records, CAS takeover                        │
//! │  LedgerStore        append-only stock ledger + quantity projection     │
//! │  CatalogStore       products, categories, store settings               │
//! │  CustomerStore      customers, account payments                        │
//! │  SaleStore          sales, lines, payments, refunds, receipts          │
//! │  SyncEventStore     pushed-event log, device checkpoints               │
//! │  AuditStore         non-critical audit trail                           │
//! │                                                                         │
//! │  Implemented by:  Database (SQLite)   MemoryStore (tests)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomic Primitives
//! Each of these is one storage transaction. Everything else the engine does
//! is a sequence of independently idempotent steps.
//!
//! - [`LedgerStore::append_ledger_entry`]
//! - [`IdempotencyStore::restart_idempotency`]
//! - [`SaleStore::apply_sale_balance`] / [`SaleStore::reverse_sale_balance`]
//! - [`SaleStore::assign_receipt_number`]
//! - [`SaleStore::transition_sale_status`]
//! - [`CustomerStore::apply_account_payment`]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use tindahan_core::{
    AuditEntry, Category, Customer, DeviceCheckpoint, IdempotencyRecord, OperationKind, Payment,
    Product, Refund, Sale, SaleLineItem, SaleStatus, StockLedgerEntry, StoreSettings,
    SyncEventRecord,
};

use crate::error::DbResult;

/// Shared handle passed to every engine component.
pub type SharedStore = Arc<dyn Storage>;

// =============================================================================
// Supporting Types
// =============================================================================

/// Result of [`LedgerStore::append_ledger_entry`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Entry written and projection moved.
    Appended(StockLedgerEntry),
    /// The projection no longer equals the expected quantity; nothing written.
    Conflict,
    /// An entry with the same mutation key already exists; nothing written.
    Duplicate(StockLedgerEntry),
}

/// Bounds of a "changed since" read.
///
/// ```text
/// after < updated_at ≤ until      ordered by (updated_at, id), at most `limit`
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeWindow {
    /// Exclusive lower bound, unix microseconds.
    pub after: i64,
    /// Inclusive upper bound, unix microseconds.
    pub until: Option<i64>,
    pub limit: Option<usize>,
}

impl ChangeWindow {
    pub fn after(after: i64) -> Self {
        ChangeWindow {
            after,
            until: None,
            limit: None,
        }
    }

    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record stamped `micros` falls inside the window (ignores limit).
    pub fn contains(&self, micros: i64) -> bool {
        micros > self.after && self.until.map_or(true, |until| micros <= until)
    }
}

/// Result of [`CustomerStore::apply_account_payment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountPaymentOutcome {
    /// False when the payment id was already recorded.
    pub inserted: bool,
    pub balance_due_centavos: i64,
}

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find_idempotency(
        &self,
        store_id: &str,
        operation: OperationKind,
        key: &str,
    ) -> DbResult<Option<IdempotencyRecord>>;

    /// Fails with `UniqueViolation` when `(store_id, operation, key)` exists.
    async fn insert_idempotency(&self, record: &IdempotencyRecord) -> DbResult<()>;

    /// Compare-and-set takeover: back to pending with `attempts + 1`, only if
    /// the record is not applied and `updated_at` still equals `observed`.
    async fn restart_idempotency(
        &self,
        id: &str,
        observed_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Stores the result and marks applied. Returns false if it already was.
    async fn complete_idempotency(
        &self,
        id: &str,
        result: &Value,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Marks a pending record failed. An applied record is left untouched.
    async fn fail_idempotency(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_ledger_entry(
        &self,
        store_id: &str,
        mutation_key: &str,
    ) -> DbResult<Option<StockLedgerEntry>>;

    /// Current projected quantity, `None` when the product does not exist.
    async fn product_quantity(&self, store_id: &str, product_id: &str) -> DbResult<Option<i64>>;

    /// Appends `entry` and sets the product projection to
    /// `entry.resulting_qty`, only if the projection still equals
    /// `expected_qty`. Also bumps the product's `updated_at`.
    async fn append_ledger_entry(
        &self,
        entry: &StockLedgerEntry,
        expected_qty: i64,
    ) -> DbResult<AppendOutcome>;

    /// All entries for a product in append order.
    async fn ledger_entries(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>>;

    /// Entries written on behalf of one business record, in append order.
    async fn ledger_entries_for_reference(
        &self,
        store_id: &str,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, store_id: &str, id: &str) -> DbResult<Option<Product>>;
    async fn upsert_product(&self, product: &Product) -> DbResult<()>;
    async fn upsert_category(&self, category: &Category) -> DbResult<()>;
    async fn get_settings(&self, store_id: &str) -> DbResult<Option<StoreSettings>>;
    async fn upsert_settings(&self, settings: &StoreSettings) -> DbResult<()>;

    async fn products_changed(&self, store_id: &str, window: ChangeWindow)
        -> DbResult<Vec<Product>>;
    async fn categories_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Category>>;
    async fn settings_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Option<StoreSettings>>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, store_id: &str, id: &str) -> DbResult<Option<Customer>>;
    async fn upsert_customer(&self, customer: &Customer) -> DbResult<()>;
    async fn customers_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Customer>>;

    /// Inserts `payment` (ignored when its id exists) and, only when it was
    /// new, lowers the customer balance by its amount, floored at 0.
    async fn apply_account_payment(
        &self,
        customer_id: &str,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> DbResult<AccountPaymentOutcome>;
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    async fn find_sale_by_client_tx(
        &self,
        store_id: &str,
        client_tx_id: &str,
    ) -> DbResult<Option<Sale>>;
    async fn get_sale(&self, store_id: &str, id: &str) -> DbResult<Option<Sale>>;

    /// Fails with `UniqueViolation` when `(store_id, client_tx_id)` exists.
    async fn insert_sale(&self, sale: &Sale) -> DbResult<()>;

    /// Re-asserts the submitted fields of a sale whose status is still
    /// `expected_status`. Never touches the receipt number or the balance flag.
    async fn update_sale(&self, sale: &Sale, expected_status: SaleStatus) -> DbResult<bool>;

    async fn replace_line_items(&self, sale_id: &str, items: &[SaleLineItem]) -> DbResult<()>;
    async fn line_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>>;

    /// Insert-or-ignore by payment id. Returns true when newly written.
    async fn insert_payment(&self, payment: &Payment) -> DbResult<bool>;
    async fn payments_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Payment>>;

    /// Insert-or-ignore by refund id. Returns true when newly written.
    async fn insert_refund(&self, refund: &Refund) -> DbResult<bool>;
    async fn refunds_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Refund>>;

    /// Returns the sale's receipt number, assigning `{prefix}{seq:06}` from
    /// the store counter if it has none yet.
    async fn assign_receipt_number(
        &self,
        store_id: &str,
        sale_id: &str,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> DbResult<String>;

    /// Sets `balance_due_applied`, records `amount` as applied and raises the
    /// customer balance by it, all or nothing. Returns false if the flag was
    /// already set.
    async fn apply_sale_balance(
        &self,
        store_id: &str,
        sale_id: &str,
        customer_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Clears `balance_due_applied` and lowers the customer balance by the
    /// recorded applied amount (floored at 0). Returns that amount, or `None`
    /// if the flag was not set.
    async fn reverse_sale_balance(
        &self,
        store_id: &str,
        sale_id: &str,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>>;

    /// Compare-and-set status change; stamps `voided_at` / `refunded_at`.
    async fn transition_sale_status(
        &self,
        store_id: &str,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;
}

#[async_trait]
pub trait SyncEventStore: Send + Sync {
    async fn get_sync_event(
        &self,
        store_id: &str,
        event_id: &str,
    ) -> DbResult<Option<SyncEventRecord>>;

    /// Insert or overwrite by `(store_id, event_id)`.
    async fn save_sync_event(&self, record: &SyncEventRecord) -> DbResult<()>;

    async fn save_checkpoint(&self, checkpoint: &DeviceCheckpoint) -> DbResult<()>;
    async fn get_checkpoint(
        &self,
        store_id: &str,
        device_id: &str,
    ) -> DbResult<Option<DeviceCheckpoint>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditEntry) -> DbResult<()>;

    /// Most recent first.
    async fn audit_entries(&self, store_id: &str, limit: usize) -> DbResult<Vec<AuditEntry>>;
}

/// Combined storage trait.
#[async_trait]
pub trait Storage:
    IdempotencyStore
    + LedgerStore
    + CatalogStore
    + CustomerStore
    + SaleStore
    + SyncEventStore
    + AuditStore
    + Send
    + Sync
{
    /// Check storage connectivity and schema.
    async fn health_check(&self) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_window_bounds() {
        let window = ChangeWindow::after(10).until(20);
        assert!(!window.contains(10));
        assert!(window.contains(11));
        assert!(window.contains(20));
        assert!(!window.contains(21));
        assert!(ChangeWindow::after(0).contains(i64::MAX));
    }
}
