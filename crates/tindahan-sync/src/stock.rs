//! Manual stock operations: signed adjustments and restocks.
//!
//! Both are thin wrappers over [`StockLedger::apply_delta`] with a mutation
//! key built from the request id, so a replayed request moves stock once.

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use tindahan_core::events::{AdjustStockPayload, RestockPayload};
use tindahan_core::{keys, Actor, StockReason, StoreSettings};
use tindahan_db::SharedStore;

use crate::error::{EngineError, EngineResult};
use crate::ledger::{StockLedger, StockMutation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockOutcome {
    pub product_id: String,
    pub delta_qty: i64,
    pub resulting_qty: i64,
    /// The mutation key had been applied by an earlier request.
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct StockOperations {
    store: SharedStore,
    ledger: StockLedger,
}

impl StockOperations {
    pub fn new(store: SharedStore, ledger: StockLedger) -> Self {
        StockOperations { store, ledger }
    }

    /// Applies a signed correction (count, damage, shrinkage).
    pub async fn adjust(
        &self,
        actor: &Actor,
        payload: &AdjustStockPayload,
        request_id: &str,
        settings: &StoreSettings,
    ) -> EngineResult<StockOutcome> {
        self.ensure_product(&actor.store_id, &payload.product_id).await?;

        let mutation = StockMutation {
            store_id: actor.store_id.clone(),
            product_id: payload.product_id.clone(),
            delta_qty: payload.delta_qty,
            reason: StockReason::Adjustment,
            reference_type: "adjustment".to_string(),
            reference_id: request_id.to_string(),
            mutation_key: keys::adjust_stock_key(&actor.store_id, &payload.product_id, request_id),
            device_id: Some(actor.device_id.clone()),
            client_tx_id: None,
            allow_negative: settings.allow_negative_stock,
        };
        self.apply(mutation).await
    }

    /// Receives delivered goods. Always a positive delta.
    pub async fn restock(
        &self,
        actor: &Actor,
        payload: &RestockPayload,
        request_id: &str,
    ) -> EngineResult<StockOutcome> {
        self.ensure_product(&actor.store_id, &payload.product_id).await?;

        let mutation = StockMutation {
            store_id: actor.store_id.clone(),
            product_id: payload.product_id.clone(),
            delta_qty: payload.quantity,
            reason: StockReason::Restock,
            reference_type: "restock".to_string(),
            reference_id: request_id.to_string(),
            mutation_key: keys::restock_key(&actor.store_id, &payload.product_id, request_id),
            device_id: Some(actor.device_id.clone()),
            client_tx_id: None,
            allow_negative: true,
        };
        self.apply(mutation).await
    }

    async fn apply(&self, mutation: StockMutation) -> EngineResult<StockOutcome> {
        let outcome = self.ledger.apply_delta(&mutation).await?;

        info!(
            store_id = %mutation.store_id,
            product_id = %mutation.product_id,
            reason = ?mutation.reason,
            delta = mutation.delta_qty,
            resulting_qty = outcome.resulting_qty,
            duplicate = outcome.duplicate,
            "Stock mutation"
        );

        Ok(StockOutcome {
            product_id: mutation.product_id,
            delta_qty: mutation.delta_qty,
            resulting_qty: outcome.resulting_qty,
            duplicate: outcome.duplicate,
        })
    }

    async fn ensure_product(&self, store_id: &str, product_id: &str) -> EngineResult<()> {
        match self.store.get_product(store_id, product_id).await? {
            Some(product) if product.is_active => Ok(()),
            _ => Err(EngineError::not_found("Product", product_id)),
        }
    }
}
