//! # Sale Repository
//!
//! Sales and their children: line items, payments, refunds.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Column / table            Written by                                   │
//! │  ───────────────────────   ───────────────────────────────────────────  │
//! │  sales (fields, totals)    insert_sale, update_sale (status-guarded)    │
//! │  sales.status (terminal)   transition_sale_status (compare-and-set)     │
//! │  sales.receipt_number      assign_receipt_number (once)                 │
//! │  sales.balance_*applied*   apply_sale_balance / reverse_sale_balance    │
//! │  sale_line_items           replace_line_items (deterministic ids)       │
//! │  payments                  insert_payment (insert-or-ignore)            │
//! │  refunds                   insert_refund (insert-or-ignore)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use tindahan_core::{Payment, PaymentMethod, Refund, Sale, SaleLineItem, SaleStatus};

use super::{micros, opt_micros, opt_ts, to_u32, ts};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::store::SaleStore;

// =============================================================================
// Rows
// =============================================================================

const SALE_SELECT: &str = r#"
    SELECT id, store_id, client_tx_id, device_id, cashier_id, customer_id, status,
           subtotal_centavos, discount_centavos, total_centavos, paid_centavos,
           change_centavos, balance_due_centavos, receipt_number, balance_due_applied,
           balance_applied_centavos, note, created_at, updated_at, completed_at,
           voided_at, refunded_at
    FROM sales
"#;

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    store_id: String,
    client_tx_id: String,
    device_id: Option<String>,
    cashier_id: Option<String>,
    customer_id: Option<String>,
    status: SaleStatus,
    subtotal_centavos: i64,
    discount_centavos: i64,
    total_centavos: i64,
    paid_centavos: i64,
    change_centavos: i64,
    balance_due_centavos: i64,
    receipt_number: Option<String>,
    balance_due_applied: bool,
    balance_applied_centavos: i64,
    note: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
    voided_at: Option<i64>,
    refunded_at: Option<i64>,
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale {
            id: row.id,
            store_id: row.store_id,
            client_tx_id: row.client_tx_id,
            device_id: row.device_id,
            cashier_id: row.cashier_id,
            customer_id: row.customer_id,
            status: row.status,
            subtotal_centavos: row.subtotal_centavos,
            discount_centavos: row.discount_centavos,
            total_centavos: row.total_centavos,
            paid_centavos: row.paid_centavos,
            change_centavos: row.change_centavos,
            balance_due_centavos: row.balance_due_centavos,
            receipt_number: row.receipt_number,
            balance_due_applied: row.balance_due_applied,
            balance_applied_centavos: row.balance_applied_centavos,
            note: row.note,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            completed_at: opt_ts(row.completed_at),
            voided_at: opt_ts(row.voided_at),
            refunded_at: opt_ts(row.refunded_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    sale_id: String,
    line_index: i64,
    product_id: String,
    quantity: i64,
    unit_price_centavos: i64,
    line_discount_centavos: i64,
    line_total_centavos: i64,
}

impl TryFrom<LineRow> for SaleLineItem {
    type Error = DbError;

    fn try_from(row: LineRow) -> DbResult<Self> {
        Ok(SaleLineItem {
            id: row.id,
            sale_id: row.sale_id,
            line_index: to_u32("sale_line_items", row.line_index)?,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price_centavos: row.unit_price_centavos,
            line_discount_centavos: row.line_discount_centavos,
            line_total_centavos: row.line_total_centavos,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    store_id: String,
    sale_id: Option<String>,
    customer_id: Option<String>,
    method: PaymentMethod,
    amount_centavos: i64,
    reference: Option<String>,
    created_at: i64,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id,
            store_id: row.store_id,
            sale_id: row.sale_id,
            customer_id: row.customer_id,
            method: row.method,
            amount_centavos: row.amount_centavos,
            reference: row.reference,
            created_at: ts(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: String,
    store_id: String,
    sale_id: String,
    amount_centavos: i64,
    reason: Option<String>,
    created_at: i64,
}

impl From<RefundRow> for Refund {
    fn from(row: RefundRow) -> Self {
        Refund {
            id: row.id,
            store_id: row.store_id,
            sale_id: row.sale_id,
            amount_centavos: row.amount_centavos,
            reason: row.reason,
            created_at: ts(row.created_at),
        }
    }
}

// =============================================================================
// SaleStore
// =============================================================================

#[async_trait]
impl SaleStore for Database {
    async fn find_sale_by_client_tx(
        &self,
        store_id: &str,
        client_tx_id: &str,
    ) -> DbResult<Option<Sale>> {
        let sql = format!("{} WHERE store_id = ?1 AND client_tx_id = ?2", SALE_SELECT);
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(store_id)
            .bind(client_tx_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn get_sale(&self, store_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{} WHERE store_id = ?1 AND id = ?2", SALE_SELECT);
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, client_tx_id = %sale.client_tx_id, status = %sale.status, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, store_id, client_tx_id, device_id, cashier_id, customer_id, status,
                subtotal_centavos, discount_centavos, total_centavos, paid_centavos,
                change_centavos, balance_due_centavos, receipt_number, balance_due_applied,
                balance_applied_centavos, note, created_at, updated_at, completed_at,
                voided_at, refunded_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.store_id)
        .bind(&sale.client_tx_id)
        .bind(&sale.device_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.status)
        .bind(sale.subtotal_centavos)
        .bind(sale.discount_centavos)
        .bind(sale.total_centavos)
        .bind(sale.paid_centavos)
        .bind(sale.change_centavos)
        .bind(sale.balance_due_centavos)
        .bind(&sale.receipt_number)
        .bind(sale.balance_due_applied)
        .bind(sale.balance_applied_centavos)
        .bind(&sale.note)
        .bind(micros(sale.created_at))
        .bind(micros(sale.updated_at))
        .bind(opt_micros(sale.completed_at))
        .bind(opt_micros(sale.voided_at))
        .bind(opt_micros(sale.refunded_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn update_sale(&self, sale: &Sale, expected_status: SaleStatus) -> DbResult<bool> {
        debug!(id = %sale.id, from = %expected_status, to = %sale.status, "Re-asserting sale");

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                device_id = ?3,
                cashier_id = ?4,
                customer_id = ?5,
                status = ?6,
                subtotal_centavos = ?7,
                discount_centavos = ?8,
                total_centavos = ?9,
                paid_centavos = ?10,
                change_centavos = ?11,
                balance_due_centavos = ?12,
                note = ?13,
                updated_at = ?14,
                completed_at = ?15
            WHERE store_id = ?1 AND id = ?2 AND status = ?16
            "#,
        )
        .bind(&sale.store_id)
        .bind(&sale.id)
        .bind(&sale.device_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.status)
        .bind(sale.subtotal_centavos)
        .bind(sale.discount_centavos)
        .bind(sale.total_centavos)
        .bind(sale.paid_centavos)
        .bind(sale.change_centavos)
        .bind(sale.balance_due_centavos)
        .bind(&sale.note)
        .bind(micros(sale.updated_at))
        .bind(opt_micros(sale.completed_at))
        .bind(expected_status)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_line_items(&self, sale_id: &str, items: &[SaleLineItem]) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM sale_line_items WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_line_items (
                    id, sale_id, line_index, product_id, quantity,
                    unit_price_centavos, line_discount_centavos, line_total_centavos
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(i64::from(item.line_index))
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price_centavos)
            .bind(item.line_discount_centavos)
            .bind(item.line_total_centavos)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn line_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>> {
        let rows = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT id, sale_id, line_index, product_id, quantity,
                   unit_price_centavos, line_discount_centavos, line_total_centavos
            FROM sale_line_items
            WHERE sale_id = ?1
            ORDER BY line_index
            "#,
        )
        .bind(sale_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(SaleLineItem::try_from).collect()
    }

    async fn insert_payment(&self, payment: &Payment) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, store_id, sale_id, customer_id, method, amount_centavos, reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.store_id)
        .bind(&payment.sale_id)
        .bind(&payment.customer_id)
        .bind(payment.method)
        .bind(payment.amount_centavos)
        .bind(&payment.reference)
        .bind(micros(payment.created_at))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn payments_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, store_id, sale_id, customer_id, method, amount_centavos, reference, created_at
            FROM payments
            WHERE store_id = ?1 AND sale_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn insert_refund(&self, refund: &Refund) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO refunds (id, store_id, sale_id, amount_centavos, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.store_id)
        .bind(&refund.sale_id)
        .bind(refund.amount_centavos)
        .bind(&refund.reason)
        .bind(micros(refund.created_at))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn refunds_for_sale(&self, store_id: &str, sale_id: &str) -> DbResult<Vec<Refund>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, store_id, sale_id, amount_centavos, reason, created_at
            FROM refunds
            WHERE store_id = ?1 AND sale_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Refund::from).collect())
    }

    async fn assign_receipt_number(
        &self,
        store_id: &str,
        sale_id: &str,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        let mut tx = self.pool().begin().await?;

        let existing: Option<Option<String>> = sqlx::query_scalar(
            "SELECT receipt_number FROM sales WHERE store_id = ?1 AND id = ?2",
        )
        .bind(store_id)
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            None => {
                tx.rollback().await?;
                return Err(DbError::not_found("Sale", sale_id));
            }
            Some(Some(receipt_number)) => {
                tx.rollback().await?;
                return Ok(receipt_number);
            }
            Some(None) => {}
        }

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO receipt_counters (store_id, last_seq) VALUES (?1, 1)
            ON CONFLICT (store_id) DO UPDATE SET last_seq = last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(store_id)
        .fetch_one(&mut *tx)
        .await?;

        let receipt_number = format!("{}{:06}", prefix, seq);

        sqlx::query(
            r#"
            UPDATE sales SET receipt_number = ?3, updated_at = ?4
            WHERE store_id = ?1 AND id = ?2 AND receipt_number IS NULL
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .bind(&receipt_number)
        .bind(micros(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(sale_id, receipt_number = %receipt_number, "Receipt number assigned");
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
        let mut tx = self.pool().begin().await?;

        let flipped = sqlx::query(
            r#"
            UPDATE sales
            SET balance_due_applied = 1, balance_applied_centavos = ?4, updated_at = ?3
            WHERE store_id = ?1 AND id = ?2 AND balance_due_applied = 0
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .bind(micros(now))
        .bind(amount)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !flipped {
            tx.rollback().await?;
            return Ok(false);
        }

        let moved = sqlx::query(
            r#"
            UPDATE customers
            SET balance_due_centavos = balance_due_centavos + ?3, updated_at = ?4
            WHERE store_id = ?1 AND id = ?2
            "#,
        )
        .bind(store_id)
        .bind(customer_id)
        .bind(amount)
        .bind(micros(now))
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DbError::not_found("Customer", customer_id));
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn reverse_sale_balance(
        &self,
        store_id: &str,
        sale_id: &str,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let mut tx = self.pool().begin().await?;

        let applied: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT balance_applied_centavos FROM sales
            WHERE store_id = ?1 AND id = ?2 AND balance_due_applied = 1
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(amount) = applied else {
            tx.rollback().await?;
            return Ok(None);
        };

        let flipped = sqlx::query(
            r#"
            UPDATE sales
            SET balance_due_applied = 0, balance_applied_centavos = 0, updated_at = ?3
            WHERE store_id = ?1 AND id = ?2 AND balance_due_applied = 1
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .bind(micros(now))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !flipped {
            tx.rollback().await?;
            return Ok(None);
        }

        let moved = sqlx::query(
            r#"
            UPDATE customers
            SET balance_due_centavos = MAX(0, balance_due_centavos - ?3), updated_at = ?4
            WHERE store_id = ?1 AND id = ?2
            "#,
        )
        .bind(store_id)
        .bind(customer_id)
        .bind(amount)
        .bind(micros(now))
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DbError::not_found("Customer", customer_id));
        }

        tx.commit().await?;
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
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = ?4,
                updated_at = ?5,
                voided_at = CASE WHEN ?4 = 'voided' THEN ?5 ELSE voided_at END,
                refunded_at = CASE WHEN ?4 = 'refunded' THEN ?5 ELSE refunded_at END,
                completed_at = CASE WHEN ?4 IN ('completed', 'due') THEN ?5 ELSE completed_at END
            WHERE store_id = ?1 AND id = ?2 AND status = ?3
            "#,
        )
        .bind(store_id)
        .bind(sale_id)
        .bind(from)
        .bind(to)
        .bind(micros(now))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CustomerStore;
    use crate::DbConfig;
    use tindahan_core::{clock, Customer};

    fn sale(id: &str, status: SaleStatus) -> Sale {
        let now = clock::now();
        Sale {
            id: id.to_string(),
            store_id: "store-1".to_string(),
            client_tx_id: format!("tx-{}", id),
            device_id: Some("dev-1".to_string()),
            cashier_id: None,
            customer_id: Some("c-1".to_string()),
            status,
            subtotal_centavos: 1000,
            discount_centavos: 100,
            total_centavos: 900,
            paid_centavos: 300,
            change_centavos: 0,
            balance_due_centavos: 600,
            receipt_number: None,
            balance_due_applied: false,
            balance_applied_centavos: 0,
            note: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
            voided_at: None,
            refunded_at: None,
        }
    }

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = clock::now();
        db.upsert_customer(&Customer {
            id: "c-1".to_string(),
            store_id: "store-1".to_string(),
            name: "Mang Tonyo".to_string(),
            phone: None,
            balance_due_centavos: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_client_tx_id_is_unique_per_store() {
        let db = setup().await;
        db.insert_sale(&sale("s-1", SaleStatus::Due)).await.unwrap();

        let mut twin = sale("s-2", SaleStatus::Due);
        twin.client_tx_id = "tx-s-1".to_string();
        assert!(db.insert_sale(&twin).await.unwrap_err().is_unique_violation());

        let found = db.find_sale_by_client_tx("store-1", "tx-s-1").await.unwrap().unwrap();
        assert_eq!(found.id, "s-1");
    }

    #[tokio::test]
    async fn test_receipt_number_assigned_once() {
        let db = setup().await;
        db.insert_sale(&sale("s-1", SaleStatus::Due)).await.unwrap();
        db.insert_sale(&sale("s-2", SaleStatus::Due)).await.unwrap();

        let first = db.assign_receipt_number("store-1", "s-1", "OR-", clock::now()).await.unwrap();
        let again = db.assign_receipt_number("store-1", "s-1", "OR-", clock::now()).await.unwrap();
        let second = db.assign_receipt_number("store-1", "s-2", "OR-", clock::now()).await.unwrap();

        assert_eq!(first, "OR-000001");
        assert_eq!(again, first);
        assert_eq!(second, "OR-000002");
    }

    #[tokio::test]
    async fn test_balance_flag_guards_customer_balance() {
        let db = setup().await;
        db.insert_sale(&sale("s-1", SaleStatus::Due)).await.unwrap();

        assert!(db.apply_sale_balance("store-1", "s-1", "c-1", 600, clock::now()).await.unwrap());
        assert!(!db.apply_sale_balance("store-1", "s-1", "c-1", 600, clock::now()).await.unwrap());
        let c = db.get_customer("store-1", "c-1").await.unwrap().unwrap();
        assert_eq!(c.balance_due_centavos, 600);

        assert_eq!(
            db.get_sale("store-1", "s-1").await.unwrap().unwrap().balance_applied_centavos,
            600
        );

        let reversed = db.reverse_sale_balance("store-1", "s-1", "c-1", clock::now()).await.unwrap();
        assert_eq!(reversed, Some(600));
        assert_eq!(db.reverse_sale_balance("store-1", "s-1", "c-1", clock::now()).await.unwrap(), None);
        let c = db.get_customer("store-1", "c-1").await.unwrap().unwrap();
        assert_eq!(c.balance_due_centavos, 0);
    }

    #[tokio::test]
    async fn test_status_transition_is_compare_and_set() {
        let db = setup().await;
        db.insert_sale(&sale("s-1", SaleStatus::Due)).await.unwrap();

        assert!(db
            .transition_sale_status("store-1", "s-1", SaleStatus::Due, SaleStatus::Voided, clock::now())
            .await
            .unwrap());
        assert!(!db
            .transition_sale_status("store-1", "s-1", SaleStatus::Due, SaleStatus::Voided, clock::now())
            .await
            .unwrap());

        let voided = db.get_sale("store-1", "s-1").await.unwrap().unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);
        assert!(voided.voided_at.is_some());

        // A late resume cannot overwrite a terminal status.
        let resumed = sale("s-1", SaleStatus::Due);
        assert!(!db.update_sale(&resumed, SaleStatus::Due).await.unwrap());
    }

    #[tokio::test]
    async fn test_line_items_replace_is_idempotent() {
        let db = setup().await;
        db.insert_sale(&sale("s-1", SaleStatus::Due)).await.unwrap();
        let line = SaleLineItem {
            id: "s-1:0".to_string(),
            sale_id: "s-1".to_string(),
            line_index: 0,
            product_id: "p-1".to_string(),
            quantity: 2,
            unit_price_centavos: 500,
            line_discount_centavos: 0,
            line_total_centavos: 1000,
        };
        db.replace_line_items("s-1", &[line.clone()]).await.unwrap();
        db.replace_line_items("s-1", &[line.clone()]).await.unwrap();
        assert_eq!(db.line_items("s-1").await.unwrap(), vec![line]);
    }
}
