//! # Idempotency Records
//!
//! ```text
//!   insert (pending) ──► complete (applied, result frozen)
//!         │
//!         └──► fail (failed) ──► restart (pending, attempts+1) ──► ...
//!   stale pending ────────────► restart
//! ```
//!
//! `restart` and `complete` are single guarded `UPDATE`s, so two attempts
//! racing on the same record cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use tindahan_core::{IdempotencyRecord, IdempotencyStatus, OperationKind};

use super::{from_json, micros, to_u32, ts};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::store::IdempotencyStore;

#[derive(Debug, sqlx::FromRow)]
struct IdempotencyRow {
    id: String,
    store_id: String,
    operation: String,
    key: String,
    status: IdempotencyStatus,
    result: Option<String>,
    context: String,
    last_error: Option<String>,
    attempts: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = DbError;

    fn try_from(row: IdempotencyRow) -> DbResult<Self> {
        let operation: OperationKind = row
            .operation
            .parse()
            .map_err(|e: tindahan_core::ValidationError| {
                DbError::corrupt("idempotency_records", e.to_string())
            })?;
        let result: Option<Value> = match row.result.as_deref() {
            Some(raw) => Some(from_json("idempotency_records", raw)?),
            None => None,
        };

        Ok(IdempotencyRecord {
            id: row.id,
            store_id: row.store_id,
            operation,
            key: row.key,
            status: row.status,
            result,
            context: from_json("idempotency_records", &row.context)?,
            last_error: row.last_error,
            attempts: to_u32("idempotency_records", row.attempts)?,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[async_trait]
impl IdempotencyStore for Database {
    async fn find_idempotency(
        &self,
        store_id: &str,
        operation: OperationKind,
        key: &str,
    ) -> DbResult<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRow>(
            r#"
            SELECT id, store_id, operation, key, status, result, context,
                   last_error, attempts, created_at, updated_at
            FROM idempotency_records
            WHERE store_id = ?1 AND operation = ?2 AND key = ?3
            "#,
        )
        .bind(store_id)
        .bind(operation.as_str())
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        row.map(IdempotencyRecord::try_from).transpose()
    }

    async fn insert_idempotency(&self, record: &IdempotencyRecord) -> DbResult<()> {
        debug!(
            store_id = %record.store_id,
            operation = %record.operation,
            key = %record.key,
            "Inserting idempotency record"
        );

        let result = match &record.result {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO idempotency_records (
                id, store_id, operation, key, status, result, context,
                last_error, attempts, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(&record.store_id)
        .bind(record.operation.as_str())
        .bind(&record.key)
        .bind(record.status)
        .bind(result)
        .bind(serde_json::to_string(&record.context)?)
        .bind(&record.last_error)
        .bind(i64::from(record.attempts))
        .bind(micros(record.created_at))
        .bind(micros(record.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn restart_idempotency(
        &self,
        id: &str,
        observed_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_records
            SET status = 'pending', attempts = attempts + 1, updated_at = ?3
            WHERE id = ?1 AND updated_at = ?2 AND status != 'applied'
            "#,
        )
        .bind(id)
        .bind(micros(observed_updated_at))
        .bind(micros(now))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_idempotency(
        &self,
        id: &str,
        result: &Value,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let outcome = sqlx::query(
            r#"
            UPDATE idempotency_records
            SET status = 'applied', result = ?2, last_error = NULL, updated_at = ?3
            WHERE id = ?1 AND status != 'applied'
            "#,
        )
        .bind(id)
        .bind(serde_json::to_string(result)?)
        .bind(micros(now))
        .execute(self.pool())
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn fail_idempotency(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE idempotency_records
            SET status = 'failed', last_error = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(micros(now))
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use serde_json::json;
    use tindahan_core::clock;

    fn record(key: &str) -> IdempotencyRecord {
        let now = clock::now();
        IdempotencyRecord {
            id: format!("idem-{}", key),
            store_id: "store-1".to_string(),
            operation: OperationKind::AdjustStock,
            key: key.to_string(),
            status: IdempotencyStatus::Pending,
            result: None,
            context: json!({"device_id": "dev-1"}),
            last_error: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.insert_idempotency(&record("k1")).await.unwrap();

        let mut again = record("k1");
        again.id = "other".to_string();
        let err = db.insert_idempotency(&again).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_complete_freezes_result() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let rec = record("k1");
        db.insert_idempotency(&rec).await.unwrap();

        assert!(db
            .complete_idempotency(&rec.id, &json!({"resulting_qty": 7}), clock::now())
            .await
            .unwrap());
        assert!(!db
            .complete_idempotency(&rec.id, &json!({"resulting_qty": 99}), clock::now())
            .await
            .unwrap());

        let stored = db
            .find_idempotency("store-1", OperationKind::AdjustStock, "k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, IdempotencyStatus::Applied);
        assert_eq!(stored.result, Some(json!({"resulting_qty": 7})));
    }

    #[tokio::test]
    async fn test_restart_is_compare_and_set() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let rec = record("k1");
        db.insert_idempotency(&rec).await.unwrap();
        db.fail_idempotency(&rec.id, "boom", clock::now()).await.unwrap();

        let failed = db
            .find_idempotency("store-1", OperationKind::AdjustStock, "k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, IdempotencyStatus::Failed);

        let later = clock::from_micros(clock::to_micros(failed.updated_at) + 1);
        assert!(db.restart_idempotency(&rec.id, failed.updated_at, later).await.unwrap());
        // The observed timestamp is now stale: a second taker loses.
        assert!(!db.restart_idempotency(&rec.id, failed.updated_at, later).await.unwrap());

        let restarted = db
            .find_idempotency("store-1", OperationKind::AdjustStock, "k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restarted.status, IdempotencyStatus::Pending);
        assert_eq!(restarted.attempts, 2);
    }
}
