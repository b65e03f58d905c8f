//! # Transaction Engine
//!
//! Single entry point for every idempotent operation, whether it arrives
//! through a direct endpoint or inside a pushed batch.
//!
//! ## Execute
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ClientEvent                                                            │
//! │     │ validate (shape)                                                  │
//! │     │ load store settings                                               │
//! │     │ gate (capabilities, step-up PIN)                                  │
//! │     │ resolve key: override ─► natural key ─► Required error            │
//! │     ▼                                                                   │
//! │  guard.begin ── applied ──► stored result, replayed = true              │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  dispatch (exhaustive match)                                            │
//! │     ├── Err ──► guard.mark_failed ──► Err                               │
//! │     └── Ok  ──► guard.mark_applied ──► audit (non-critical) ──► Ok      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use tindahan_core::{Actor, ClientEvent, OperationKind, StoreSettings, ValidationError};
use tindahan_db::SharedStore;

use crate::accounts::AccountOperations;
use crate::config::EngineConfig;
use crate::effects::{SideEffect, SideEffectRunner};
use crate::error::EngineResult;
use crate::gate::Gate;
use crate::guard::IdempotencyGuard;
use crate::ledger::StockLedger;
use crate::sales::SaleEngine;
use crate::stock::StockOperations;

/// Result of one idempotent operation.
///
/// `data` is exactly what was stored on first application; a replay
/// returns the same value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResponse {
    pub data: Value,
    pub replayed: bool,
}

pub struct Engine {
    pub(crate) store: SharedStore,
    pub(crate) config: EngineConfig,
    pub(crate) effects: SideEffectRunner,
    guard: IdempotencyGuard,
    gate: Gate,
    sales: SaleEngine,
    stock: StockOperations,
    accounts: AccountOperations,
}

impl Engine {
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        let ledger = StockLedger::new(store.clone(), config.ledger_retry_limit);

        Engine {
            guard: IdempotencyGuard::new(store.clone(), config.pending_ttl()),
            gate: Gate::default(),
            sales: SaleEngine::new(store.clone(), ledger.clone()),
            stock: StockOperations::new(store.clone(), ledger),
            accounts: AccountOperations::new(store.clone()),
            effects: SideEffectRunner::new(store.clone()),
            store,
            config,
        }
    }

    /// Replaces the default role table / PIN verifier.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stored settings, or the defaults for a store that never saved any.
    pub async fn settings(&self, store_id: &str) -> EngineResult<StoreSettings> {
        Ok(self
            .store
            .get_settings(store_id)
            .await?
            .unwrap_or_else(|| StoreSettings::defaults(store_id)))
    }

    /// Runs `event` at most once per `(store, operation, key)`.
    ///
    /// `key_override` (an `Idempotency-Key` header, or a batch event id)
    /// wins over the key carried in the payload.
    pub async fn execute(
        &self,
        actor: &Actor,
        event: &ClientEvent,
        key_override: Option<&str>,
    ) -> EngineResult<OperationResponse> {
        event.validate()?;

        let settings = self.settings(&actor.store_id).await?;
        self.gate.check(actor, event, &settings)?;

        let operation = event.kind();
        let key = key_override
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| event.natural_key())
            .ok_or_else(|| ValidationError::required("idempotency_key"))?
            .to_string();

        let context = json!({
            "user_id": actor.user_id,
            "device_id": actor.device_id,
        });
        let opened = self
            .guard
            .begin(&actor.store_id, operation, &key, context)
            .await?;

        if opened.is_duplicate {
            debug!(store_id = %actor.store_id, %operation, key = %key, "Replaying stored result");
            return Ok(OperationResponse {
                data: opened.prior_result.unwrap_or(Value::Null),
                replayed: true,
            });
        }

        let data = match self.dispatch(actor, event, &key, &settings).await {
            Ok(data) => data,
            Err(err) => {
                self.guard.mark_failed(&opened.record, &err.to_string()).await;
                return Err(err);
            }
        };

        let data = self.guard.mark_applied(&opened.record, data).await?;

        info!(
            store_id = %actor.store_id,
            user_id = %actor.user_id,
            %operation,
            key = %key,
            "Operation applied"
        );

        let (entity_type, entity_id) = audit_target(event, &data);
        self.effects
            .run(vec![SideEffect::audit(
                actor,
                operation.as_str(),
                entity_type,
                &entity_id,
                json!({ "key": key, "result": data }),
            )])
            .await;

        Ok(OperationResponse {
            data,
            replayed: false,
        })
    }

    async fn dispatch(
        &self,
        actor: &Actor,
        event: &ClientEvent,
        key: &str,
        settings: &StoreSettings,
    ) -> EngineResult<Value> {
        let data = match event {
            ClientEvent::CompleteSale(payload) => serde_json::to_value(
                self.sales
                    .submit(actor, payload, OperationKind::CompleteSale, settings)
                    .await?,
            )?,
            ClientEvent::ParkSale(payload) => serde_json::to_value(
                self.sales
                    .submit(actor, payload, OperationKind::ParkSale, settings)
                    .await?,
            )?,
            ClientEvent::VoidSale(payload) => {
                serde_json::to_value(self.sales.void(actor, payload).await?)?
            }
            ClientEvent::RefundSale(payload) => {
                serde_json::to_value(self.sales.refund(actor, payload, key).await?)?
            }
            ClientEvent::AdjustStock(payload) => {
                serde_json::to_value(self.stock.adjust(actor, payload, key, settings).await?)?
            }
            ClientEvent::Restock(payload) => {
                serde_json::to_value(self.stock.restock(actor, payload, key).await?)?
            }
            ClientEvent::RecordPayment(payload) => {
                serde_json::to_value(self.accounts.record_payment(actor, payload, key).await?)?
            }
        };
        Ok(data)
    }
}

fn audit_target(event: &ClientEvent, data: &Value) -> (&'static str, String) {
    match event {
        ClientEvent::CompleteSale(_) | ClientEvent::ParkSale(_) => (
            "sale",
            data.get("sale_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        ClientEvent::VoidSale(p) => ("sale", p.sale_id.clone()),
        ClientEvent::RefundSale(p) => ("sale", p.sale_id.clone()),
        ClientEvent::AdjustStock(p) => ("product", p.product_id.clone()),
        ClientEvent::Restock(p) => ("product", p.product_id.clone()),
        ClientEvent::RecordPayment(p) => ("customer", p.customer_id.clone()),
    }
}
