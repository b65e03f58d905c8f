//! # Idempotency Guard
//!
//! Records in-flight and completed operations keyed by
//! `(store_id, operation, key)` and short-circuits repeats.
//!
//! ## Begin
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  find(store, operation, key)                                            │
//! │     │                                                                   │
//! │     ├── none ─────────────► insert pending ──► Fresh                    │
//! │     │                          └── lost insert race ──► look again      │
//! │     ├── applied ──────────► Duplicate(stored result, verbatim)          │
//! │     ├── pending, young ───► InProgress (retryable)                      │
//! │     └── pending stale ────► restart (CAS on updated_at) ──► Fresh       │
//! │         or failed              └── CAS lost ──► InProgress              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed record never blocks a retry: the guard prevents double
//! *application*, not double *attempts*.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tindahan_core::{clock, IdempotencyRecord, IdempotencyStatus, OperationKind};
use tindahan_db::{DbError, SharedStore};

use crate::error::{EngineError, EngineResult};

/// Outcome of [`IdempotencyGuard::begin`].
#[derive(Debug, Clone)]
pub struct GuardOutcome {
    pub record: IdempotencyRecord,
    pub is_duplicate: bool,
    /// The stored result when `is_duplicate`; return it without re-executing.
    pub prior_result: Option<Value>,
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: SharedStore,
    pending_ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: SharedStore, pending_ttl: Duration) -> Self {
        IdempotencyGuard { store, pending_ttl }
    }

    /// Opens (or re-opens) the guard for one operation attempt.
    ///
    /// Storage errors propagate: an operation never runs unguarded.
    pub async fn begin(
        &self,
        store_id: &str,
        operation: OperationKind,
        key: &str,
        context: Value,
    ) -> EngineResult<GuardOutcome> {
        // Two passes cover losing the insert race to a concurrent first attempt.
        for _ in 0..2 {
            let existing = self.store.find_idempotency(store_id, operation, key).await?;

            let Some(record) = existing else {
                let now = clock::now();
                let record = IdempotencyRecord {
                    id: Uuid::new_v4().to_string(),
                    store_id: store_id.to_string(),
                    operation,
                    key: key.to_string(),
                    status: IdempotencyStatus::Pending,
                    result: None,
                    context: context.clone(),
                    last_error: None,
                    attempts: 1,
                    created_at: now,
                    updated_at: now,
                };

                match self.store.insert_idempotency(&record).await {
                    Ok(()) => {
                        debug!(store_id, %operation, key, "Guard opened");
                        return Ok(GuardOutcome {
                            record,
                            is_duplicate: false,
                            prior_result: None,
                        });
                    }
                    Err(DbError::UniqueViolation { .. }) => {
                        debug!(store_id, %operation, key, "Guard insert raced; re-reading");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            return self.resolve_existing(record).await;
        }

        Err(EngineError::InProgress {
            operation: operation.to_string(),
            key: key.to_string(),
        })
    }

    async fn resolve_existing(&self, record: IdempotencyRecord) -> EngineResult<GuardOutcome> {
        match record.status {
            IdempotencyStatus::Applied => {
                debug!(
                    store_id = %record.store_id,
                    operation = %record.operation,
                    key = %record.key,
                    "Duplicate operation; replaying stored result"
                );
                let prior_result = record.result.clone();
                Ok(GuardOutcome {
                    record,
                    is_duplicate: true,
                    prior_result,
                })
            }
            IdempotencyStatus::Pending if !self.is_stale(&record) => Err(EngineError::InProgress {
                operation: record.operation.to_string(),
                key: record.key.clone(),
            }),
            IdempotencyStatus::Pending | IdempotencyStatus::Failed => {
                let now = clock::now();
                let taken = self
                    .store
                    .restart_idempotency(&record.id, record.updated_at, now)
                    .await?;

                if !taken {
                    return Err(EngineError::InProgress {
                        operation: record.operation.to_string(),
                        key: record.key.clone(),
                    });
                }

                info!(
                    store_id = %record.store_id,
                    operation = %record.operation,
                    key = %record.key,
                    previous = ?record.status,
                    attempt = record.attempts + 1,
                    "Taking over idempotency record"
                );

                Ok(GuardOutcome {
                    record: IdempotencyRecord {
                        status: IdempotencyStatus::Pending,
                        attempts: record.attempts + 1,
                        updated_at: now,
                        ..record
                    },
                    is_duplicate: false,
                    prior_result: None,
                })
            }
        }
    }

    fn is_stale(&self, record: &IdempotencyRecord) -> bool {
        let ttl = i64::try_from(self.pending_ttl.as_micros()).unwrap_or(i64::MAX);
        let age = clock::to_micros(clock::now()) - clock::to_micros(record.updated_at);
        age >= ttl
    }

    /// Stores `result` and marks the record applied.
    ///
    /// Returns the result that is now authoritative: `result` itself, or the
    /// one a concurrent attempt froze first.
    pub async fn mark_applied(&self, record: &IdempotencyRecord, result: Value) -> EngineResult<Value> {
        if self
            .store
            .complete_idempotency(&record.id, &result, clock::now())
            .await?
        {
            return Ok(result);
        }

        let frozen = self
            .store
            .find_idempotency(&record.store_id, record.operation, &record.key)
            .await?
            .and_then(|r| r.result);
        Ok(frozen.unwrap_or(result))
    }

    /// Marks the attempt failed. Errors are logged, not returned, so the
    /// caller can surface the original failure.
    pub async fn mark_failed(&self, record: &IdempotencyRecord, error: &str) {
        if let Err(e) = self
            .store
            .fail_idempotency(&record.id, error, clock::now())
            .await
        {
            warn!(
                record_id = %record.id,
                error = %e,
                "Failed to mark idempotency record failed; it will expire as stale"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tindahan_db::{IdempotencyStore, MemoryStore};

    fn guard(store: Arc<MemoryStore>, ttl: Duration) -> IdempotencyGuard {
        IdempotencyGuard::new(store, ttl)
    }

    #[tokio::test]
    async fn test_applied_record_replays_result() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone(), Duration::from_secs(120));

        let first = guard
            .begin("s1", OperationKind::Restock, "r-1", json!({}))
            .await
            .unwrap();
        assert!(!first.is_duplicate);
        guard
            .mark_applied(&first.record, json!({"resulting_qty": 12}))
            .await
            .unwrap();

        let second = guard
            .begin("s1", OperationKind::Restock, "r-1", json!({}))
            .await
            .unwrap();
        assert!(second.is_duplicate);
        assert_eq!(second.prior_result, Some(json!({"resulting_qty": 12})));
    }

    #[tokio::test]
    async fn test_fresh_pending_is_in_progress() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store, Duration::from_secs(120));

        guard
            .begin("s1", OperationKind::AdjustStock, "a-1", json!({}))
            .await
            .unwrap();
        let err = guard
            .begin("s1", OperationKind::AdjustStock, "a-1", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InProgress { .. }));
    }

    #[tokio::test]
    async fn test_stale_pending_is_taken_over() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone(), Duration::ZERO);

        let first = guard
            .begin("s1", OperationKind::AdjustStock, "a-1", json!({}))
            .await
            .unwrap();
        let second = guard
            .begin("s1", OperationKind::AdjustStock, "a-1", json!({}))
            .await
            .unwrap();

        assert!(!second.is_duplicate);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.attempts, 2);
    }

    #[tokio::test]
    async fn test_failed_record_allows_retry() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone(), Duration::from_secs(120));

        let first = guard
            .begin("s1", OperationKind::VoidSale, "v-1", json!({}))
            .await
            .unwrap();
        guard.mark_failed(&first.record, "database is locked").await;

        let stored = store
            .find_idempotency("s1", OperationKind::VoidSale, "v-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, IdempotencyStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("database is locked"));

        let retry = guard
            .begin("s1", OperationKind::VoidSale, "v-1", json!({}))
            .await
            .unwrap();
        assert!(!retry.is_duplicate);
        assert_eq!(retry.record.attempts, 2);
    }
}
