//! # Sync Event Log, Checkpoints and Audit Trail
//!
//! ## Pushed Event Log
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  push(event) ──► get_sync_event(store, event_id)                        │
//! │                     │                                                   │
//! │                     ├── applied / duplicate_ignored ──► replay result   │
//! │                     └── missing / failed_* ──► apply ──► save (upsert)  │
//! │                                                                         │
//! │  pull(cursor) ──► ... ──► save_checkpoint(store, device, new_cursor)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The audit trail is append-only and read back newest first.

use async_trait::async_trait;
use serde_json::Value;

use tindahan_core::{AuditEntry, DeviceCheckpoint, SyncEventRecord, SyncEventStatus};

use super::{from_json, micros, to_u32, ts};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::store::{AuditStore, Storage, SyncEventStore};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SyncEventRow {
    store_id: String,
    event_id: String,
    device_id: String,
    event_type: String,
    payload: String,
    status: SyncEventStatus,
    attempt_count: i64,
    last_error: Option<String>,
    result: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SyncEventRow> for SyncEventRecord {
    type Error = DbError;

    fn try_from(row: SyncEventRow) -> DbResult<Self> {
        let result: Option<Value> = match row.result.as_deref() {
            Some(raw) => Some(from_json("sync_events", raw)?),
            None => None,
        };
        Ok(SyncEventRecord {
            event_id: row.event_id,
            store_id: row.store_id,
            device_id: row.device_id,
            event_type: row.event_type,
            payload: from_json("sync_events", &row.payload)?,
            status: row.status,
            attempt_count: to_u32("sync_events", row.attempt_count)?,
            last_error: row.last_error,
            result,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    store_id: String,
    device_id: String,
    cursor: String,
    pulled_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    store_id: String,
    actor_id: String,
    device_id: String,
    action: String,
    entity_type: String,
    entity_id: String,
    details: String,
    created_at: i64,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        Ok(AuditEntry {
            id: row.id,
            store_id: row.store_id,
            actor_id: row.actor_id,
            device_id: row.device_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            details: from_json("audit_log", &row.details)?,
            created_at: ts(row.created_at),
        })
    }
}

// =============================================================================
// SyncEventStore
// =============================================================================

#[async_trait]
impl SyncEventStore for Database {
    async fn get_sync_event(
        &self,
        store_id: &str,
        event_id: &str,
    ) -> DbResult<Option<SyncEventRecord>> {
        let row = sqlx::query_as::<_, SyncEventRow>(
            r#"
            SELECT store_id, event_id, device_id, event_type, payload, status,
                   attempt_count, last_error, result, created_at, updated_at
            FROM sync_events
            WHERE store_id = ?1 AND event_id = ?2
            "#,
        )
        .bind(store_id)
        .bind(event_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(SyncEventRecord::try_from).transpose()
    }

    async fn save_sync_event(&self, record: &SyncEventRecord) -> DbResult<()> {
        let result = match &record.result {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO sync_events (
                store_id, event_id, device_id, event_type, payload, status,
                attempt_count, last_error, result, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (store_id, event_id) DO UPDATE SET
                device_id = excluded.device_id,
                event_type = excluded.event_type,
                payload = excluded.payload,
                status = excluded.status,
                attempt_count = excluded.attempt_count,
                last_error = excluded.last_error,
                result = excluded.result,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.store_id)
        .bind(&record.event_id)
        .bind(&record.device_id)
        .bind(&record.event_type)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.status)
        .bind(i64::from(record.attempt_count))
        .bind(&record.last_error)
        .bind(result)
        .bind(micros(record.created_at))
        .bind(micros(record.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &DeviceCheckpoint) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_checkpoints (store_id, device_id, cursor, pulled_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (store_id, device_id) DO UPDATE SET
                cursor = excluded.cursor,
                pulled_at = excluded.pulled_at
            "#,
        )
        .bind(&checkpoint.store_id)
        .bind(&checkpoint.device_id)
        .bind(&checkpoint.cursor)
        .bind(micros(checkpoint.pulled_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get_checkpoint(
        &self,
        store_id: &str,
        device_id: &str,
    ) -> DbResult<Option<DeviceCheckpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT store_id, device_id, cursor, pulled_at
            FROM device_checkpoints
            WHERE store_id = ?1 AND device_id = ?2
            "#,
        )
        .bind(store_id)
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| DeviceCheckpoint {
            store_id: row.store_id,
            device_id: row.device_id,
            cursor: row.cursor,
            pulled_at: ts(row.pulled_at),
        }))
    }
}

// =============================================================================
// AuditStore
// =============================================================================

#[async_trait]
impl AuditStore for Database {
    async fn append_audit(&self, entry: &AuditEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, store_id, actor_id, device_id, action, entity_type, entity_id, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.store_id)
        .bind(&entry.actor_id)
        .bind(&entry.device_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(serde_json::to_string(&entry.details)?)
        .bind(micros(entry.created_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn audit_entries(&self, store_id: &str, limit: usize) -> DbResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, store_id, actor_id, device_id, action, entity_type, entity_id, details, created_at
            FROM audit_log
            WHERE store_id = ?1
            ORDER BY seq DESC
            LIMIT ?2
            "#,
        )
        .bind(store_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

// =============================================================================
// Storage
// =============================================================================

#[async_trait]
impl Storage for Database {
    /// Touches a table so a database without the schema reports
    /// `SchemaMissing` instead of looking healthy.
    async fn health_check(&self) -> DbResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM idempotency_records")
            .fetch_one(self.pool())
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
