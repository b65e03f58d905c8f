//! # Stock Ledger Repository
//!
//! ## Append Transaction
//! ```text
//! BEGIN
//!   SELECT ... FROM stock_ledger WHERE store_id = ? AND mutation_key = ?
//!       └── found ──► ROLLBACK, Duplicate(existing)
//!   UPDATE products SET stock_quantity = resulting_qty
//!    WHERE id = ? AND stock_quantity = expected_qty
//!       └── 0 rows ──► ROLLBACK, Conflict
//!   INSERT INTO stock_ledger (...)
//! COMMIT ──► Appended(entry)
//! ```
//!
//! The projection moves only together with its ledger row, so the product
//! quantity always equals the `resulting_qty` of the latest entry.

use async_trait::async_trait;
use sqlx::Sqlite;
use tracing::debug;

use tindahan_core::{StockLedgerEntry, StockReason};

use super::{micros, ts};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::store::{AppendOutcome, LedgerStore};

const LEDGER_COLUMNS: &str = r#"
    id, store_id, product_id, mutation_key, delta_qty, reason, reference_type,
    reference_id, resulting_qty, device_id, client_tx_id, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: String,
    store_id: String,
    product_id: String,
    mutation_key: String,
    delta_qty: i64,
    reason: StockReason,
    reference_type: String,
    reference_id: String,
    resulting_qty: i64,
    device_id: Option<String>,
    client_tx_id: Option<String>,
    created_at: i64,
}

impl From<LedgerRow> for StockLedgerEntry {
    fn from(row: LedgerRow) -> Self {
        StockLedgerEntry {
            id: row.id,
            store_id: row.store_id,
            product_id: row.product_id,
            mutation_key: row.mutation_key,
            delta_qty: row.delta_qty,
            reason: row.reason,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            resulting_qty: row.resulting_qty,
            device_id: row.device_id,
            client_tx_id: row.client_tx_id,
            created_at: ts(row.created_at),
        }
    }
}

async fn find_by_key<'e, E>(
    executor: E,
    store_id: &str,
    mutation_key: &str,
) -> DbResult<Option<StockLedgerEntry>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM stock_ledger WHERE store_id = ?1 AND mutation_key = ?2",
        LEDGER_COLUMNS
    );
    let row = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(store_id)
        .bind(mutation_key)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(StockLedgerEntry::from))
}

#[async_trait]
impl LedgerStore for Database {
    async fn find_ledger_entry(
        &self,
        store_id: &str,
        mutation_key: &str,
    ) -> DbResult<Option<StockLedgerEntry>> {
        find_by_key(self.pool(), store_id, mutation_key).await
    }

    async fn product_quantity(&self, store_id: &str, product_id: &str) -> DbResult<Option<i64>> {
        let qty: Option<i64> = sqlx::query_scalar(
            "SELECT stock_quantity FROM products WHERE store_id = ?1 AND id = ?2",
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(qty)
    }

    async fn append_ledger_entry(
        &self,
        entry: &StockLedgerEntry,
        expected_qty: i64,
    ) -> DbResult<AppendOutcome> {
        let mut tx = self.pool().begin().await?;

        if let Some(existing) = find_by_key(&mut *tx, &entry.store_id, &entry.mutation_key).await? {
            tx.rollback().await?;
            return Ok(AppendOutcome::Duplicate(existing));
        }

        let moved = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = ?3, updated_at = ?4
            WHERE store_id = ?1 AND id = ?2 AND stock_quantity = ?5
            "#,
        )
        .bind(&entry.store_id)
        .bind(&entry.product_id)
        .bind(entry.resulting_qty)
        .bind(micros(entry.created_at))
        .bind(expected_qty)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                product_id = %entry.product_id,
                expected_qty,
                "Stock projection moved underneath append"
            );
            return Ok(AppendOutcome::Conflict);
        }

        let sql = format!(
            "INSERT INTO stock_ledger ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            LEDGER_COLUMNS
        );
        let inserted = sqlx::query(&sql)
            .bind(&entry.id)
            .bind(&entry.store_id)
            .bind(&entry.product_id)
            .bind(&entry.mutation_key)
            .bind(entry.delta_qty)
            .bind(entry.reason)
            .bind(&entry.reference_type)
            .bind(&entry.reference_id)
            .bind(entry.resulting_qty)
            .bind(&entry.device_id)
            .bind(&entry.client_tx_id)
            .bind(micros(entry.created_at))
            .execute(&mut *tx)
            .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(AppendOutcome::Appended(entry.clone()))
            }
            // Lost a race on the mutation key: the winner's row is the answer.
            Err(err) => {
                tx.rollback().await?;
                match DbError::from(err) {
                    DbError::UniqueViolation { .. } => {
                        find_by_key(self.pool(), &entry.store_id, &entry.mutation_key)
                            .await?
                            .map(AppendOutcome::Duplicate)
                            .ok_or_else(|| DbError::not_found("StockLedgerEntry", &entry.mutation_key))
                    }
                    other => Err(other),
                }
            }
        }
    }

    async fn ledger_entries(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_ledger WHERE store_id = ?1 AND product_id = ?2 ORDER BY seq",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(store_id)
            .bind(product_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(StockLedgerEntry::from).collect())
    }

    async fn ledger_entries_for_reference(
        &self,
        store_id: &str,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_ledger \
             WHERE store_id = ?1 AND reference_type = ?2 AND reference_id = ?3 ORDER BY seq",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(store_id)
            .bind(reference_type)
            .bind(reference_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(StockLedgerEntry::from).collect())
    }
}
