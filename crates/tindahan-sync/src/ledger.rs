//! # Stock Ledger
//!
//! Applies signed quantity deltas through the append-only ledger. The
//! product's `stock_quantity` is never incremented blindly: every change is
//! read current → compute next → conditional append.
//!
//! ## apply_delta
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loop (up to ledger_retry_limit)                                        │
//! │    find entry by mutation_key ── found ──► { resulting_qty, duplicate } │
//! │    current = projection(product) ── missing ──► NotFound                │
//! │    next = current + delta                                               │
//! │    next < 0 and negative stock not allowed ──► InsufficientStock        │
//! │    append(entry, expected = current)                                    │
//! │       Appended   ──► { next, duplicate: false }                         │
//! │       Duplicate  ──► { existing.resulting_qty, duplicate: true }        │
//! │       Conflict   ──► someone moved the projection: go again             │
//! │       transient  ──► go again                                           │
//! │  ──► Contention (retryable)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Building a deterministic mutation key is the caller's job
//! (see `tindahan_core::keys`); the ledger only enforces uniqueness.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use tindahan_core::{clock, CoreError, StockLedgerEntry, StockReason};
use tindahan_db::{AppendOutcome, SharedStore};

use crate::error::{EngineError, EngineResult};

/// One requested stock change.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMutation {
    pub store_id: String,
    pub product_id: String,
    pub delta_qty: i64,
    pub reason: StockReason,
    pub reference_type: String,
    pub reference_id: String,
    pub mutation_key: String,
    pub device_id: Option<String>,
    pub client_tx_id: Option<String>,
    /// Store policy: may the projection go below zero?
    pub allow_negative: bool,
}

/// Result of [`StockLedger::apply_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOutcome {
    pub resulting_qty: i64,
    /// True when the mutation key had already been applied.
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct StockLedger {
    store: SharedStore,
    retry_limit: u32,
}

impl StockLedger {
    pub fn new(store: SharedStore, retry_limit: u32) -> Self {
        StockLedger {
            store,
            retry_limit: retry_limit.max(1),
        }
    }

    pub async fn apply_delta(&self, mutation: &StockMutation) -> EngineResult<LedgerOutcome> {
        let mut last_transient = None;

        for attempt in 1..=self.retry_limit {
            if let Some(existing) = self
                .store
                .find_ledger_entry(&mutation.store_id, &mutation.mutation_key)
                .await?
            {
                debug!(mutation_key = %mutation.mutation_key, "Ledger key already applied");
                return Ok(LedgerOutcome {
                    resulting_qty: existing.resulting_qty,
                    duplicate: true,
                });
            }

            let current = self
                .store
                .product_quantity(&mutation.store_id, &mutation.product_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Product", &mutation.product_id))?;

            let resulting_qty = current.checked_add(mutation.delta_qty).ok_or_else(|| {
                EngineError::Internal(format!(
                    "stock quantity overflow for {}",
                    mutation.product_id
                ))
            })?;

            if resulting_qty < 0 && !mutation.allow_negative {
                return Err(CoreError::InsufficientStock {
                    product_id: mutation.product_id.clone(),
                    available: current,
                    requested: -mutation.delta_qty,
                }
                .into());
            }

            let entry = StockLedgerEntry {
                id: Uuid::new_v4().to_string(),
                store_id: mutation.store_id.clone(),
                product_id: mutation.product_id.clone(),
                mutation_key: mutation.mutation_key.clone(),
                delta_qty: mutation.delta_qty,
                reason: mutation.reason,
                reference_type: mutation.reference_type.clone(),
                reference_id: mutation.reference_id.clone(),
                resulting_qty,
                device_id: mutation.device_id.clone(),
                client_tx_id: mutation.client_tx_id.clone(),
                created_at: clock::now(),
            };

            match self.store.append_ledger_entry(&entry, current).await {
                Ok(AppendOutcome::Appended(entry)) => {
                    debug!(
                        product_id = %entry.product_id,
                        delta = entry.delta_qty,
                        resulting_qty = entry.resulting_qty,
                        reason = ?entry.reason,
                        "Ledger entry appended"
                    );
                    return Ok(LedgerOutcome {
                        resulting_qty: entry.resulting_qty,
                        duplicate: false,
                    });
                }
                Ok(AppendOutcome::Duplicate(existing)) => {
                    return Ok(LedgerOutcome {
                        resulting_qty: existing.resulting_qty,
                        duplicate: true,
                    });
                }
                Ok(AppendOutcome::Conflict) => {
                    debug!(
                        product_id = %mutation.product_id,
                        attempt,
                        "Projection moved during append; retrying"
                    );
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        product_id = %mutation.product_id,
                        attempt,
                        error = %err,
                        "Transient ledger append failure; retrying"
                    );
                    last_transient = Some(err);
                }
                Err(err) => return Err(err.into()),
            }

            tokio::task::yield_now().await;
        }

        match last_transient {
            Some(err) => Err(err.into()),
            None => Err(EngineError::Contention {
                resource: format!("product {}", mutation.product_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tindahan_core::Product;
    use tindahan_db::{CatalogStore, LedgerStore, MemoryStore};

    async fn store_with_product(qty: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let now = clock::now();
        store
            .upsert_product(&Product {
                id: "p-1".to_string(),
                store_id: "s1".to_string(),
                sku: "SKU-1".to_string(),
                name: "Sardinas".to_string(),
                price_centavos: 2500,
                stock_quantity: qty,
                category_id: None,
                parent_id: None,
                is_sellable: true,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        store
    }

    fn mutation(key: &str, delta: i64) -> StockMutation {
        StockMutation {
            store_id: "s1".to_string(),
            product_id: "p-1".to_string(),
            delta_qty: delta,
            reason: StockReason::Adjustment,
            reference_type: "adjustment".to_string(),
            reference_id: key.to_string(),
            mutation_key: key.to_string(),
            device_id: None,
            client_tx_id: None,
            allow_negative: false,
        }
    }

    #[tokio::test]
    async fn test_repeated_key_applies_once() {
        let store = store_with_product(10).await;
        let ledger = StockLedger::new(store.clone(), 5);

        let first = ledger.apply_delta(&mutation("k1", -3)).await.unwrap();
        let again = ledger.apply_delta(&mutation("k1", -3)).await.unwrap();

        assert_eq!(first, LedgerOutcome { resulting_qty: 7, duplicate: false });
        assert_eq!(again, LedgerOutcome { resulting_qty: 7, duplicate: true });
        assert_eq!(store.product_quantity("s1", "p-1").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_negative_stock_policy() {
        let store = store_with_product(2).await;
        let ledger = StockLedger::new(store.clone(), 5);

        let err = ledger.apply_delta(&mutation("k1", -3)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rule(CoreError::InsufficientStock { available: 2, requested: 3, .. })
        ));

        let mut allowed = mutation("k2", -3);
        allowed.allow_negative = true;
        let outcome = ledger.apply_delta(&allowed).await.unwrap();
        assert_eq!(outcome.resulting_qty, -1);
    }

    #[tokio::test]
    async fn test_transient_append_failure_is_retried() {
        let store = store_with_product(10).await;
        store.fail_next_appends(2);
        let ledger = StockLedger::new(store.clone(), 5);

        let outcome = ledger.apply_delta(&mutation("k1", 4)).await.unwrap();
        assert_eq!(outcome.resulting_qty, 14);
        assert_eq!(store.ledger_entries("s1", "p-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_surfaces_transient_error() {
        let store = store_with_product(10).await;
        store.fail_next_appends(10);
        let ledger = StockLedger::new(store.clone(), 3);

        let err = ledger.apply_delta(&mutation("k1", 4)).await.unwrap_err();
        assert_eq!(crate::error::classify(&err), crate::error::FailureClass::Retryable);
        assert_eq!(store.product_quantity("s1", "p-1").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let store = Arc::new(MemoryStore::new());
        let ledger = StockLedger::new(store, 5);
        let err = ledger.apply_delta(&mutation("k1", 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
