//! # Client Events
//!
//! Typed payloads for every action a device can queue while offline.
//!
//! ## From Envelope to Typed Event
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Device queue entry (JSON)                                              │
//! │  { event_id, device_id, event_type: "complete_sale", payload: {...} }  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OperationKind::from_str(event_type)  ── unknown ──► permanent failure │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  serde_json::from_value::<SalePayload>(payload)                        │
//! │       │                          └── missing / ill-typed field ──►     │
//! │       ▼                                       permanent failure        │
//! │  ClientEvent::CompleteSale(SalePayload)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  exhaustive `match` in the engine                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same payload structs are used as request bodies for the direct
//! (non-batched) endpoints.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{Capability, OperationKind, PaymentMethod, SaleStatus};
use crate::validation::{self, ValidationResult};

// =============================================================================
// Envelope
// =============================================================================

/// A queued client action as pushed by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncEventEnvelope {
    /// Globally unique per device; the batch dedup key.
    pub event_id: String,
    #[serde(default)]
    pub device_id: String,
    pub event_type: String,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub payload: Value,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub created_at_device: Option<DateTime<Utc>>,
}

// =============================================================================
// Shared Pieces
// =============================================================================

/// Manager PIN supplied for a step-up protected action.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct StepUpProof {
    pub pin: String,
}

impl fmt::Debug for StepUpProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepUpProof").field("pin", &"***").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct LineInput {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_centavos: i64,
    #[serde(default)]
    pub line_discount_centavos: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct PaymentInput {
    /// Stable id for this tender; falls back to its index in the list.
    #[serde(default)]
    pub request_id: Option<String>,
    pub method: PaymentMethod,
    pub amount_centavos: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

// =============================================================================
// Payloads
// =============================================================================

/// Body of `complete_sale` and `park_sale`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct SalePayload {
    pub client_tx_id: String,
    /// `completed` (default) or `due` for complete_sale; ignored for park.
    #[serde(default)]
    pub status: Option<SaleStatus>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub cashier_id: Option<String>,
    #[serde(default)]
    pub items: Vec<LineInput>,
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
    /// Manual sale-level discount.
    #[serde(default)]
    pub discount_centavos: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

impl SalePayload {
    /// Status the sale should end up in for the given operation.
    pub fn target_status(&self, kind: OperationKind) -> ValidationResult<SaleStatus> {
        if kind == OperationKind::ParkSale {
            return Ok(SaleStatus::Parked);
        }

        match self.status.unwrap_or(SaleStatus::Completed) {
            status @ (SaleStatus::Completed | SaleStatus::Due) => Ok(status),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec!["completed".to_string(), "due".to_string()],
            }),
        }
    }

    pub fn has_discount(&self) -> bool {
        self.discount_centavos > 0 || self.items.iter().any(|i| i.line_discount_centavos > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct VoidPayload {
    #[serde(default)]
    pub sale_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct RefundPayload {
    #[serde(default)]
    pub sale_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    /// Defaults to everything still refundable.
    #[serde(default)]
    pub amount_centavos: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct AdjustStockPayload {
    #[serde(default)]
    pub request_id: Option<String>,
    pub product_id: String,
    pub delta_qty: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct RestockPayload {
    #[serde(default)]
    pub request_id: Option<String>,
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

/// Payment against a customer's outstanding balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct RecordPaymentPayload {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub customer_id: String,
    pub amount_centavos: i64,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    #[serde(default)]
    pub sale_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub step_up: Option<StepUpProof>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

// =============================================================================
// Client Event
// =============================================================================

/// A parsed, strongly-typed client action.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CompleteSale(SalePayload),
    ParkSale(SalePayload),
    VoidSale(VoidPayload),
    RefundSale(RefundPayload),
    AdjustStock(AdjustStockPayload),
    Restock(RestockPayload),
    RecordPayment(RecordPaymentPayload),
}

impl ClientEvent {
    /// Parses an `event_type` string and its payload.
    ///
    /// ## Example
    /// ```rust
    /// use tindahan_core::events::ClientEvent;
    /// use serde_json::json;
    ///
    /// let event = ClientEvent::parse(
    ///     "restock",
    ///     json!({"request_id": "r-1", "product_id": "p-1", "quantity": 12}),
    /// ).unwrap();
    /// assert_eq!(event.natural_key(), Some("r-1"));
    /// ```
    pub fn parse(event_type: &str, payload: Value) -> ValidationResult<Self> {
        let kind: OperationKind = event_type.parse()?;

        let event = match kind {
            OperationKind::CompleteSale => ClientEvent::CompleteSale(decode(payload)?),
            OperationKind::ParkSale => ClientEvent::ParkSale(decode(payload)?),
            OperationKind::VoidSale => ClientEvent::VoidSale(decode(payload)?),
            OperationKind::RefundSale => ClientEvent::RefundSale(decode(payload)?),
            OperationKind::AdjustStock => ClientEvent::AdjustStock(decode(payload)?),
            OperationKind::Restock => ClientEvent::Restock(decode(payload)?),
            OperationKind::RecordPayment => ClientEvent::RecordPayment(decode(payload)?),
        };

        event.validate()?;
        Ok(event)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            ClientEvent::CompleteSale(_) => OperationKind::CompleteSale,
            ClientEvent::ParkSale(_) => OperationKind::ParkSale,
            ClientEvent::VoidSale(_) => OperationKind::VoidSale,
            ClientEvent::RefundSale(_) => OperationKind::RefundSale,
            ClientEvent::AdjustStock(_) => OperationKind::AdjustStock,
            ClientEvent::Restock(_) => OperationKind::Restock,
            ClientEvent::RecordPayment(_) => OperationKind::RecordPayment,
        }
    }

    /// Shape checks that need no storage.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            ClientEvent::CompleteSale(p) | ClientEvent::ParkSale(p) => {
                let target = p.target_status(self.kind())?;
                validation::validate_sale(p, target)
            }
            ClientEvent::VoidSale(p) => validation::validate_void(p),
            ClientEvent::RefundSale(p) => validation::validate_refund(p),
            ClientEvent::AdjustStock(p) => validation::validate_adjust_stock(p),
            ClientEvent::Restock(p) => validation::validate_restock(p),
            ClientEvent::RecordPayment(p) => validation::validate_record_payment(p),
        }
    }

    /// Idempotency key carried by the payload itself.
    ///
    /// Parking has none: the same cart may be parked many times with
    /// different contents, so each park needs its own key.
    pub fn natural_key(&self) -> Option<&str> {
        let key = match self {
            ClientEvent::CompleteSale(p) => Some(p.client_tx_id.as_str()),
            ClientEvent::ParkSale(_) => None,
            ClientEvent::VoidSale(p) => p.request_id.as_deref().or(Some(p.sale_id.as_str())),
            ClientEvent::RefundSale(p) => p.request_id.as_deref().or(Some(p.sale_id.as_str())),
            ClientEvent::AdjustStock(p) => p.request_id.as_deref(),
            ClientEvent::Restock(p) => p.request_id.as_deref(),
            ClientEvent::RecordPayment(p) => p.request_id.as_deref(),
        };
        key.filter(|key| !key.trim().is_empty())
    }

    pub fn step_up(&self) -> Option<&StepUpProof> {
        match self {
            ClientEvent::CompleteSale(p) | ClientEvent::ParkSale(p) => p.step_up.as_ref(),
            ClientEvent::VoidSale(p) => p.step_up.as_ref(),
            ClientEvent::RefundSale(p) => p.step_up.as_ref(),
            ClientEvent::AdjustStock(p) => p.step_up.as_ref(),
            ClientEvent::Restock(p) => p.step_up.as_ref(),
            ClientEvent::RecordPayment(p) => p.step_up.as_ref(),
        }
    }

    /// Capabilities the caller needs before this event may run.
    pub fn required_capabilities(&self) -> Vec<Capability> {
        match self {
            ClientEvent::CompleteSale(p) | ClientEvent::ParkSale(p) => {
                let mut caps = vec![Capability::SaleCreate];
                if p.has_discount() {
                    caps.push(Capability::DiscountApply);
                }
                caps
            }
            ClientEvent::VoidSale(_) => vec![Capability::SaleVoid],
            ClientEvent::RefundSale(_) => vec![Capability::SaleRefund],
            ClientEvent::AdjustStock(_) => vec![Capability::StockAdjust],
            ClientEvent::Restock(_) => vec![Capability::StockRestock],
            ClientEvent::RecordPayment(_) => vec![Capability::PaymentRecord],
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> ValidationResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_complete_sale() {
        let event = ClientEvent::parse(
            "complete_sale",
            json!({
                "client_tx_id": "tx-9",
                "items": [{"product_id": "p-1", "quantity": 2, "unit_price_centavos": 500}],
                "payments": [{"method": "cash", "amount_centavos": 1000}],
            }),
        )
        .unwrap();

        assert_eq!(event.kind(), OperationKind::CompleteSale);
        assert_eq!(event.natural_key(), Some("tx-9"));
        assert_eq!(event.required_capabilities(), vec![Capability::SaleCreate]);
    }

    #[test]
    fn test_fractional_money_is_rejected() {
        let err = ClientEvent::parse(
            "complete_sale",
            json!({
                "client_tx_id": "tx-1",
                "items": [{"product_id": "p-1", "quantity": 1, "unit_price_centavos": 10.5}],
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let err = ClientEvent::parse("restock", json!({"product_id": "p-1"})).unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ClientEvent::parse(
            "restock",
            json!({"product_id": "p-1", "quantity": 2, "qty": 2}),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_unknown_event_type() {
        let err = ClientEvent::parse("teleport", json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));
    }

    #[test]
    fn test_discount_requires_capability() {
        let event = ClientEvent::parse(
            "park-sale",
            json!({"client_tx_id": "tx-2", "discount_centavos": 100}),
        )
        .unwrap();
        assert_eq!(event.natural_key(), None);
        assert_eq!(
            event.required_capabilities(),
            vec![Capability::SaleCreate, Capability::DiscountApply]
        );
    }

    #[test]
    fn test_complete_sale_cannot_target_voided() {
        let result = ClientEvent::parse(
            "complete_sale",
            json!({
                "client_tx_id": "tx-3",
                "status": "voided",
                "items": [{"product_id": "p-1", "quantity": 1, "unit_price_centavos": 100}],
            }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_step_up_pin_is_redacted_in_debug() {
        let proof = StepUpProof {
            pin: "1234".to_string(),
        };
        assert!(!format!("{:?}", proof).contains("1234"));
    }
}
