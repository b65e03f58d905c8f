//! Customer account payments ("bayad sa utang").
//!
//! A payment lowers the customer's outstanding balance, floored at zero.
//! The payment row id is derived from the request id; the storage layer
//! inserts the row and moves the balance together, and only once.

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use tindahan_core::events::RecordPaymentPayload;
use tindahan_core::{clock, keys, Actor, Payment};
use tindahan_db::SharedStore;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountPaymentResult {
    pub payment_id: String,
    pub customer_id: String,
    pub amount_centavos: i64,
    /// Customer balance after this payment.
    pub balance_due_centavos: i64,
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct AccountOperations {
    store: SharedStore,
}

impl AccountOperations {
    pub fn new(store: SharedStore) -> Self {
        AccountOperations { store }
    }

    pub async fn record_payment(
        &self,
        actor: &Actor,
        payload: &RecordPaymentPayload,
        request_id: &str,
    ) -> EngineResult<AccountPaymentResult> {
        let store_id = actor.store_id.as_str();

        self.store
            .get_customer(store_id, &payload.customer_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| EngineError::not_found("Customer", &payload.customer_id))?;

        if let Some(sale_id) = payload.sale_id.as_deref() {
            self.store
                .get_sale(store_id, sale_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;
        }

        let payment = Payment {
            id: keys::account_payment_id(store_id, request_id),
            store_id: store_id.to_string(),
            sale_id: payload.sale_id.clone(),
            customer_id: Some(payload.customer_id.clone()),
            method: payload.method,
            amount_centavos: payload.amount_centavos,
            reference: payload.reference.clone(),
            created_at: clock::now(),
        };

        let outcome = self
            .store
            .apply_account_payment(&payload.customer_id, &payment, clock::now())
            .await?;

        info!(
            store_id,
            customer_id = %payload.customer_id,
            amount = payment.amount_centavos,
            balance = outcome.balance_due_centavos,
            inserted = outcome.inserted,
            "Account payment"
        );

        Ok(AccountPaymentResult {
            payment_id: payment.id,
            customer_id: payload.customer_id.clone(),
            amount_centavos: payment.amount_centavos,
            balance_due_centavos: outcome.balance_due_centavos,
            duplicate: !outcome.inserted,
        })
    }
}
