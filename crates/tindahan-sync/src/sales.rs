//! # Sale Lifecycle Engine
//!
//! Creates, resumes, voids and refunds sales. No step here is a single
//! transaction; each write is idempotent on its own key so a failed attempt
//! can be re-entered from the top.
//!
//! ## Submit (complete / due / park)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. products exist, are active and sellable; customer exists           │
//! │  2. totals                                                              │
//! │  3. find sale by client_tx_id                                           │
//! │        none ──► insert (lost race ──► treat as resume)                  │
//! │        some ──► plan transition; settled sales must match, parked ones  │
//! │                 are re-asserted (CAS on status)                         │
//! │  4. line items            key {sale}:{line_index}                       │
//! │  ── parked stops here ──                                                │
//! │  5. stock, one delta per product    key sale:{store}:{sale}:{product}   │
//! │  6. payments              key {sale}:pay:{request_id | index}           │
//! │  7. customer balance      guarded by sale.balance_due_applied           │
//! │  8. receipt number        assigned once                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Void / Refund
//! ```text
//! completed|due ──void──► restore stock (void:…) ─► reverse balance ─► voided
//!
//! Restored stock is the negation of the sale's own `sale:` ledger entries,
//! and the reversed balance is the amount recorded when it was applied.
//! completed ──refund──► check refundable ─► restore stock (refund:…)
//!                       ─► refund row ─► refunded
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use tindahan_core::events::{LineInput, RefundPayload, SalePayload, VoidPayload};
use tindahan_core::lifecycle::{
    check_resubmission, check_transition, plan_submission, SubmissionPlan,
};
use tindahan_core::totals::{compute_totals, line_total, refundable, SaleTotals};
use tindahan_core::{
    clock, keys, Actor, CoreError, Money, OperationKind, Payment, Refund, Sale, SaleLineItem,
    SaleStatus, StockReason, StoreSettings,
};
use tindahan_db::{DbError, SharedStore};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{StockLedger, StockMutation};

/// `reference_type` of the ledger entries a sale writes.
const SALE_REFERENCE: &str = "sale";

// =============================================================================
// Outcomes
// =============================================================================

/// One per-product stock movement caused by a sale operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub product_id: String,
    pub delta_qty: i64,
    pub resulting_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleOutcome {
    pub sale_id: String,
    pub client_tx_id: String,
    pub status: SaleStatus,
    pub receipt_number: Option<String>,
    pub subtotal_centavos: i64,
    pub discount_centavos: i64,
    pub total_centavos: i64,
    pub paid_centavos: i64,
    pub change_centavos: i64,
    pub balance_due_centavos: i64,
    pub stock: Vec<StockChange>,
    /// True when an existing sale with this client_tx_id was re-entered.
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoidOutcome {
    pub sale_id: String,
    pub status: SaleStatus,
    /// The sale was already voided when this request arrived; nothing was
    /// written. A request replayed under the key of the void that did the
    /// work echoes that void's response instead.
    pub idempotent: bool,
    pub stock: Vec<StockChange>,
    pub balance_reversed_centavos: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundOutcome {
    pub sale_id: String,
    pub status: SaleStatus,
    pub idempotent: bool,
    pub refund_id: Option<String>,
    pub amount_centavos: i64,
    pub stock: Vec<StockChange>,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Clone)]
pub struct SaleEngine {
    store: SharedStore,
    ledger: StockLedger,
}

impl SaleEngine {
    pub fn new(store: SharedStore, ledger: StockLedger) -> Self {
        SaleEngine { store, ledger }
    }

    /// Creates or resumes the sale identified by `payload.client_tx_id`.
    pub async fn submit(
        &self,
        actor: &Actor,
        payload: &SalePayload,
        kind: OperationKind,
        settings: &StoreSettings,
    ) -> EngineResult<SaleOutcome> {
        let store_id = actor.store_id.as_str();
        let target = payload.target_status(kind)?;

        self.check_references(store_id, payload).await?;

        let totals = compute_totals(
            &payload.items,
            payload.discount_centavos,
            settings.auto_discount_bps,
            &payload.payments,
            target,
        )?;

        let existing = self
            .store
            .find_sale_by_client_tx(store_id, &payload.client_tx_id)
            .await?;

        if target != SaleStatus::Parked {
            if let Some(current) = &existing {
                plan_submission(&current.id, Some(current.status), target)?;
                self.check_settled(current, payload, &totals).await?;
            }
            if !settings.allow_negative_stock {
                let sale_id = existing.as_ref().map(|s| s.id.as_str());
                self.check_stock(store_id, sale_id, &payload.items).await?;
            }
        }

        let (sale, plan) = match existing {
            Some(current) => self.resume(actor, payload, &totals, current, target).await?,
            None => self.create(actor, payload, &totals, target).await?,
        };

        self.write_line_items(&sale.id, &payload.items).await?;

        let mut stock = Vec::new();
        let mut receipt_number = None;

        if plan.run_side_effects {
            stock = self.apply_sale_stock(actor, &sale, &payload.items, settings).await?;
            self.record_payments(&sale, payload).await?;

            if let Some(customer_id) = sale.customer_id.as_deref() {
                if sale.status == SaleStatus::Due && totals.balance_due > Money::zero() {
                    let applied = self
                        .store
                        .apply_sale_balance(
                            store_id,
                            &sale.id,
                            customer_id,
                            totals.balance_due.centavos(),
                            clock::now(),
                        )
                        .await?;
                    debug!(sale_id = %sale.id, customer_id, applied, "Customer balance step");
                }
            }

            receipt_number = Some(
                self.store
                    .assign_receipt_number(store_id, &sale.id, &settings.receipt_prefix, clock::now())
                    .await?,
            );
        }

        info!(
            store_id,
            sale_id = %sale.id,
            client_tx_id = %sale.client_tx_id,
            status = %sale.status,
            total = totals.total.centavos(),
            resumed = plan.is_resume(),
            "Sale submitted"
        );

        Ok(SaleOutcome {
            sale_id: sale.id,
            client_tx_id: sale.client_tx_id,
            status: sale.status,
            receipt_number,
            subtotal_centavos: totals.subtotal.centavos(),
            discount_centavos: totals.discount.centavos(),
            total_centavos: totals.total.centavos(),
            paid_centavos: totals.paid.centavos(),
            change_centavos: totals.change.centavos(),
            balance_due_centavos: totals.balance_due.centavos(),
            stock,
            resumed: plan.is_resume(),
        })
    }

    /// Voids a completed or due sale. Voiding a voided sale is a no-op.
    pub async fn void(&self, actor: &Actor, payload: &VoidPayload) -> EngineResult<VoidOutcome> {
        let store_id = actor.store_id.as_str();
        let sale = self.load_sale(store_id, &payload.sale_id).await?;

        if sale.status == SaleStatus::Voided {
            debug!(sale_id = %sale.id, "Sale already voided");
            return Ok(VoidOutcome::already_voided(sale.id));
        }
        check_transition(&sale.id, sale.status, SaleStatus::Voided)?;

        let stock = self
            .restore_stock(actor, &sale, StockReason::Void, keys::void_stock_key)
            .await?;

        let mut balance_reversed_centavos = 0;
        if sale.balance_due_applied {
            if let Some(customer_id) = sale.customer_id.as_deref() {
                if let Some(amount) = self
                    .store
                    .reverse_sale_balance(store_id, &sale.id, customer_id, clock::now())
                    .await?
                {
                    balance_reversed_centavos = amount;
                }
            }
        }

        if !self
            .store
            .transition_sale_status(store_id, &sale.id, sale.status, SaleStatus::Voided, clock::now())
            .await?
        {
            let now = self.load_sale(store_id, &sale.id).await?;
            if now.status == SaleStatus::Voided {
                return Ok(VoidOutcome::already_voided(now.id));
            }
            return Err(EngineError::Contention {
                resource: format!("sale {}", sale.id),
            });
        }

        info!(store_id, sale_id = %sale.id, from = %sale.status, "Sale voided");

        Ok(VoidOutcome {
            sale_id: sale.id,
            status: SaleStatus::Voided,
            idempotent: false,
            stock,
            balance_reversed_centavos,
        })
    }

    /// Refunds a completed sale: all stock comes back, money up to the
    /// refundable amount. `request_id` keys the refund row.
    pub async fn refund(
        &self,
        actor: &Actor,
        payload: &RefundPayload,
        request_id: &str,
    ) -> EngineResult<RefundOutcome> {
        let store_id = actor.store_id.as_str();
        let sale = self.load_sale(store_id, &payload.sale_id).await?;

        if sale.status == SaleStatus::Refunded {
            debug!(sale_id = %sale.id, "Sale already refunded");
            return Ok(RefundOutcome::already_refunded(sale.id));
        }
        check_transition(&sale.id, sale.status, SaleStatus::Refunded)?;

        let refund_id = keys::refund_id(&sale.id, request_id);

        let payments = self.store.payments_for_sale(store_id, &sale.id).await?;
        let refunds = self.store.refunds_for_sale(store_id, &sale.id).await?;

        // A row left by an earlier partial attempt is reused as-is.
        let amount = match refunds.iter().find(|r| r.id == refund_id) {
            Some(prior) => prior.amount_centavos,
            None => {
                let paid: Money = payments
                    .iter()
                    .map(|p| Money::from_centavos(p.amount_centavos))
                    .sum();
                let refunded: Money = refunds
                    .iter()
                    .map(|r| Money::from_centavos(r.amount_centavos))
                    .sum();
                let available =
                    refundable(Money::from_centavos(sale.total_centavos), paid, refunded);

                let requested = payload
                    .amount_centavos
                    .map(Money::from_centavos)
                    .unwrap_or(available);
                if requested > available {
                    return Err(CoreError::RefundExceedsRefundable {
                        requested: requested.centavos(),
                        refundable: available.centavos(),
                    }
                    .into());
                }
                requested.centavos()
            }
        };

        let stock = self
            .restore_stock(actor, &sale, StockReason::Refund, keys::refund_stock_key)
            .await?;

        let inserted = self
            .store
            .insert_refund(&Refund {
                id: refund_id.clone(),
                store_id: store_id.to_string(),
                sale_id: sale.id.clone(),
                amount_centavos: amount,
                reason: payload.reason.clone(),
                created_at: clock::now(),
            })
            .await?;
        debug!(sale_id = %sale.id, refund_id = %refund_id, inserted, "Refund row");

        if !self
            .store
            .transition_sale_status(
                store_id,
                &sale.id,
                sale.status,
                SaleStatus::Refunded,
                clock::now(),
            )
            .await?
        {
            let now = self.load_sale(store_id, &sale.id).await?;
            if now.status == SaleStatus::Refunded {
                return Ok(RefundOutcome::already_refunded(now.id));
            }
            return Err(EngineError::Contention {
                resource: format!("sale {}", sale.id),
            });
        }

        info!(store_id, sale_id = %sale.id, amount, "Sale refunded");

        Ok(RefundOutcome {
            sale_id: sale.id,
            status: SaleStatus::Refunded,
            idempotent: false,
            refund_id: Some(refund_id),
            amount_centavos: amount,
            stock,
        })
    }

    // =========================================================================
    // Submit steps
    // =========================================================================

    async fn check_references(&self, store_id: &str, payload: &SalePayload) -> EngineResult<()> {
        for item in &payload.items {
            let product = self
                .store
                .get_product(store_id, &item.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| EngineError::not_found("Product", &item.product_id))?;
            if !product.is_sellable {
                return Err(CoreError::NotSellable {
                    product_id: product.id,
                }
                .into());
            }
        }

        if let Some(customer_id) = payload.customer_id.as_deref() {
            self.store
                .get_customer(store_id, customer_id)
                .await?
                .filter(|c| c.is_active)
                .ok_or_else(|| EngineError::not_found("Customer", customer_id))?;
        }

        Ok(())
    }

    async fn create(
        &self,
        actor: &Actor,
        payload: &SalePayload,
        totals: &SaleTotals,
        target: SaleStatus,
    ) -> EngineResult<(Sale, SubmissionPlan)> {
        let now = clock::now();
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            store_id: actor.store_id.clone(),
            client_tx_id: payload.client_tx_id.clone(),
            device_id: Some(actor.device_id.clone()),
            cashier_id: payload.cashier_id.clone().or_else(|| Some(actor.user_id.clone())),
            customer_id: payload.customer_id.clone(),
            status: target,
            subtotal_centavos: totals.subtotal.centavos(),
            discount_centavos: totals.discount.centavos(),
            total_centavos: totals.total.centavos(),
            paid_centavos: totals.paid.centavos(),
            change_centavos: totals.change.centavos(),
            balance_due_centavos: totals.balance_due.centavos(),
            receipt_number: None,
            balance_due_applied: false,
            balance_applied_centavos: 0,
            note: payload.note.clone(),
            created_at: now,
            updated_at: now,
            completed_at: (target != SaleStatus::Parked).then_some(now),
            voided_at: None,
            refunded_at: None,
        };

        match self.store.insert_sale(&sale).await {
            Ok(()) => {
                let plan = plan_submission(&sale.id, None, target)?;
                Ok((sale, plan))
            }
            Err(DbError::UniqueViolation { .. }) => {
                debug!(client_tx_id = %payload.client_tx_id, "Sale insert raced; resuming");
                let current = self
                    .store
                    .find_sale_by_client_tx(&actor.store_id, &payload.client_tx_id)
                    .await?
                    .ok_or_else(|| EngineError::Contention {
                        resource: format!("sale {}", payload.client_tx_id),
                    })?;
                self.check_settled(&current, payload, totals).await?;
                self.resume(actor, payload, totals, current, target).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn resume(
        &self,
        actor: &Actor,
        payload: &SalePayload,
        totals: &SaleTotals,
        current: Sale,
        target: SaleStatus,
    ) -> EngineResult<(Sale, SubmissionPlan)> {
        let plan = plan_submission(&current.id, Some(current.status), target)?;

        // Settled sales keep the row their effects were applied from.
        if current.status != SaleStatus::Parked {
            debug!(sale_id = %current.id, status = %current.status, "Resuming settled sale");
            return Ok((current, plan));
        }

        let now = clock::now();

        let sale = Sale {
            device_id: Some(actor.device_id.clone()),
            cashier_id: payload.cashier_id.clone().or(current.cashier_id.clone()),
            customer_id: payload.customer_id.clone(),
            status: target,
            subtotal_centavos: totals.subtotal.centavos(),
            discount_centavos: totals.discount.centavos(),
            total_centavos: totals.total.centavos(),
            paid_centavos: totals.paid.centavos(),
            change_centavos: totals.change.centavos(),
            balance_due_centavos: totals.balance_due.centavos(),
            note: payload.note.clone(),
            updated_at: now,
            completed_at: current
                .completed_at
                .or((target != SaleStatus::Parked).then_some(now)),
            ..current.clone()
        };

        if !self.store.update_sale(&sale, current.status).await? {
            return Err(EngineError::Contention {
                resource: format!("sale {}", current.id),
            });
        }

        debug!(
            sale_id = %sale.id,
            from = %current.status,
            to = %target,
            "Resumed existing sale"
        );
        Ok((sale, plan))
    }

    /// Fails when a sale that already left `parked` comes back different.
    async fn check_settled(
        &self,
        current: &Sale,
        payload: &SalePayload,
        totals: &SaleTotals,
    ) -> EngineResult<()> {
        if current.status == SaleStatus::Parked {
            return Ok(());
        }
        let stored = self.store.line_items(&current.id).await?;
        check_resubmission(
            current,
            &stored,
            &payload.items,
            payload.customer_id.as_deref(),
            totals,
        )?;
        Ok(())
    }

    async fn write_line_items(&self, sale_id: &str, items: &[LineInput]) -> EngineResult<()> {
        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let line_index = u32::try_from(index)
                .map_err(|_| EngineError::Internal(format!("line index {} overflows", index)))?;
            rows.push(SaleLineItem {
                id: keys::line_item_id(sale_id, line_index),
                sale_id: sale_id.to_string(),
                line_index,
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price_centavos: item.unit_price_centavos,
                line_discount_centavos: item.line_discount_centavos,
                line_total_centavos: line_total(item)?.centavos(),
            });
        }
        self.store.replace_line_items(sale_id, &rows).await?;
        Ok(())
    }

    /// Rejects a sale the shelf cannot cover before anything is written.
    ///
    /// Products already moved by an earlier attempt of the same sale are
    /// skipped. The ledger still enforces the policy on every append.
    async fn check_stock(
        &self,
        store_id: &str,
        sale_id: Option<&str>,
        items: &[LineInput],
    ) -> EngineResult<()> {
        let per_product = aggregate(items.iter().map(|i| (i.product_id.as_str(), i.quantity)));

        for (product_id, qty) in &per_product {
            if let Some(sale_id) = sale_id {
                let key = keys::sale_stock_key(store_id, sale_id, product_id);
                if self.store.find_ledger_entry(store_id, &key).await?.is_some() {
                    continue;
                }
            }
            let available = self
                .store
                .product_quantity(store_id, product_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Product", product_id.as_str()))?;
            if available < *qty {
                return Err(CoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    available,
                    requested: *qty,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn apply_sale_stock(
        &self,
        actor: &Actor,
        sale: &Sale,
        items: &[LineInput],
        settings: &StoreSettings,
    ) -> EngineResult<Vec<StockChange>> {
        let per_product = aggregate(items.iter().map(|i| (i.product_id.as_str(), i.quantity)));

        let mut changes = Vec::with_capacity(per_product.len());
        for (product_id, qty) in per_product {
            let mutation = StockMutation {
                store_id: sale.store_id.clone(),
                product_id: product_id.clone(),
                delta_qty: -qty,
                reason: StockReason::Sale,
                reference_type: SALE_REFERENCE.to_string(),
                reference_id: sale.id.clone(),
                mutation_key: keys::sale_stock_key(&sale.store_id, &sale.id, &product_id),
                device_id: Some(actor.device_id.clone()),
                client_tx_id: Some(sale.client_tx_id.clone()),
                allow_negative: settings.allow_negative_stock,
            };
            let outcome = self.ledger.apply_delta(&mutation).await?;
            changes.push(StockChange {
                product_id,
                delta_qty: -qty,
                resulting_qty: outcome.resulting_qty,
            });
        }
        Ok(changes)
    }

    async fn record_payments(&self, sale: &Sale, payload: &SalePayload) -> EngineResult<()> {
        for (index, input) in payload.payments.iter().enumerate() {
            let payment = Payment {
                id: keys::sale_payment_id(&sale.id, input.request_id.as_deref(), index),
                store_id: sale.store_id.clone(),
                sale_id: Some(sale.id.clone()),
                customer_id: sale.customer_id.clone(),
                method: input.method,
                amount_centavos: input.amount_centavos,
                reference: input.reference.clone(),
                created_at: clock::now(),
            };
            if !self.store.insert_payment(&payment).await? {
                debug!(payment_id = %payment.id, "Payment already recorded");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Compensation
    // =========================================================================

    /// Puts back every unit the sale took out, one delta per product.
    ///
    /// Read from the ledger rather than the line items, so a product whose
    /// stock step never ran is not restored.
    async fn restore_stock(
        &self,
        actor: &Actor,
        sale: &Sale,
        reason: StockReason,
        key: fn(&str, &str, &str) -> String,
    ) -> EngineResult<Vec<StockChange>> {
        let taken = self
            .store
            .ledger_entries_for_reference(&sale.store_id, SALE_REFERENCE, &sale.id)
            .await?;
        let per_product = aggregate(
            taken
                .iter()
                .filter(|e| e.reason == StockReason::Sale)
                .map(|e| (e.product_id.as_str(), -e.delta_qty)),
        );
        let reference_type = match reason {
            StockReason::Refund => "refund",
            _ => "void",
        };

        let mut changes = Vec::with_capacity(per_product.len());
        for (product_id, qty) in per_product {
            let mutation = StockMutation {
                store_id: sale.store_id.clone(),
                product_id: product_id.clone(),
                delta_qty: qty,
                reason,
                reference_type: reference_type.to_string(),
                reference_id: sale.id.clone(),
                mutation_key: key(&sale.store_id, &sale.id, &product_id),
                device_id: Some(actor.device_id.clone()),
                client_tx_id: Some(sale.client_tx_id.clone()),
                allow_negative: true,
            };
            let outcome = self.ledger.apply_delta(&mutation).await?;
            changes.push(StockChange {
                product_id,
                delta_qty: qty,
                resulting_qty: outcome.resulting_qty,
            });
        }
        Ok(changes)
    }

    async fn load_sale(&self, store_id: &str, sale_id: &str) -> EngineResult<Sale> {
        self.store
            .get_sale(store_id, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))
    }
}

impl VoidOutcome {
    fn already_voided(sale_id: String) -> Self {
        VoidOutcome {
            sale_id,
            status: SaleStatus::Voided,
            idempotent: true,
            stock: Vec::new(),
            balance_reversed_centavos: 0,
        }
    }
}

impl RefundOutcome {
    fn already_refunded(sale_id: String) -> Self {
        RefundOutcome {
            sale_id,
            status: SaleStatus::Refunded,
            idempotent: true,
            refund_id: None,
            amount_centavos: 0,
            stock: Vec::new(),
        }
    }
}

/// Sums quantities per product so each product moves once per sale.
fn aggregate<'a>(lines: impl Iterator<Item = (&'a str, i64)>) -> BTreeMap<String, i64> {
    let mut per_product = BTreeMap::new();
    for (product_id, qty) in lines {
        *per_product.entry(product_id.to_string()).or_insert(0) += qty;
    }
    per_product
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_merges_duplicate_lines() {
        let lines = [("p-1", 2), ("p-2", 1), ("p-1", 3)];
        let per_product = aggregate(lines.into_iter());
        assert_eq!(per_product.len(), 2);
        assert_eq!(per_product["p-1"], 5);
        assert_eq!(per_product["p-2"], 1);
    }

    #[test]
    fn test_already_voided_marker() {
        let outcome = VoidOutcome::already_voided("s-1".to_string());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "voided");
        assert_eq!(json["idempotent"], true);
    }
}
