//! # Validation Module
//!
//! Input validation for device-submitted payloads.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Missing required fields                                           │
//! │  └── Fractional money, unknown enum values                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Non-negative integer money                                        │
//! │  ├── Quantity and delta ranges                                         │
//! │  └── Shape rules per event type                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine (needs storage)                                       │
//! │  ├── Product / customer existence                                      │
//! │  └── Status transitions, stock policy                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Anything rejected here is permanent: the device must fix the input.

use crate::error::ValidationError;
use crate::events::{
    AdjustStockPayload, RecordPaymentPayload, RefundPayload, RestockPayload, SalePayload,
    VoidPayload,
};
use crate::types::SaleStatus;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES, MAX_STOCK_DELTA};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Rejects empty or whitespace-only strings.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates a line quantity (1..=MAX_ITEM_QUANTITY).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Money must be a non-negative integer number of centavos.
///
/// ## Example
/// ```rust
/// use tindahan_core::validation::validate_centavos;
///
/// assert!(validate_centavos("price", 0).is_ok());
/// assert!(validate_centavos("price", -100).is_err());
/// ```
pub fn validate_centavos(field: &str, centavos: i64) -> ValidationResult<()> {
    if centavos < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Payment amounts must be strictly positive.
pub fn validate_payment_amount(centavos: i64) -> ValidationResult<()> {
    if centavos <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount_centavos".to_string(),
        });
    }
    Ok(())
}

/// Manual stock adjustments: non-zero, bounded magnitude.
pub fn validate_stock_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta_qty".to_string(),
            reason: "must not be zero".to_string(),
        });
    }

    if delta.unsigned_abs() > MAX_STOCK_DELTA as u64 {
        return Err(ValidationError::OutOfRange {
            field: "delta_qty".to_string(),
            min: -MAX_STOCK_DELTA,
            max: MAX_STOCK_DELTA,
        });
    }

    Ok(())
}

// =============================================================================
// Payload Validators
// =============================================================================

/// Validates a sale submission headed for `target`.
pub fn validate_sale(payload: &SalePayload, target: SaleStatus) -> ValidationResult<()> {
    validate_required("client_tx_id", &payload.client_tx_id)?;
    validate_centavos("discount_centavos", payload.discount_centavos)?;

    if target != SaleStatus::Parked && payload.items.is_empty() {
        return Err(ValidationError::required("items"));
    }

    if payload.items.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 0,
            max: MAX_SALE_LINES as i64,
        });
    }

    for item in &payload.items {
        validate_required("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;
        validate_centavos("unit_price_centavos", item.unit_price_centavos)?;
        validate_centavos("line_discount_centavos", item.line_discount_centavos)?;
    }

    for payment in &payload.payments {
        validate_payment_amount(payment.amount_centavos)?;
        if let Some(request_id) = &payment.request_id {
            validate_required("payments.request_id", request_id)?;
        }
    }

    if let Some(customer_id) = &payload.customer_id {
        validate_required("customer_id", customer_id)?;
    }

    Ok(())
}

pub fn validate_void(payload: &VoidPayload) -> ValidationResult<()> {
    validate_required("sale_id", &payload.sale_id)
}

pub fn validate_refund(payload: &RefundPayload) -> ValidationResult<()> {
    validate_required("sale_id", &payload.sale_id)?;
    if let Some(amount) = payload.amount_centavos {
        validate_centavos("amount_centavos", amount)?;
    }
    Ok(())
}

pub fn validate_adjust_stock(payload: &AdjustStockPayload) -> ValidationResult<()> {
    validate_required("product_id", &payload.product_id)?;
    validate_stock_delta(payload.delta_qty)
}

pub fn validate_restock(payload: &RestockPayload) -> ValidationResult<()> {
    validate_required("product_id", &payload.product_id)?;
    if payload.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    validate_stock_delta(payload.quantity)
}

pub fn validate_record_payment(payload: &RecordPaymentPayload) -> ValidationResult<()> {
    validate_required("customer_id", &payload.customer_id)?;
    validate_payment_amount(payload.amount_centavos)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LineInput;

    fn sale(items: Vec<LineInput>) -> SalePayload {
        SalePayload {
            client_tx_id: "tx-1".to_string(),
            items,
            ..SalePayload::default()
        }
    }

    fn line(qty: i64, price: i64) -> LineInput {
        LineInput {
            product_id: "p-1".to_string(),
            quantity: qty,
            unit_price_centavos: price,
            line_discount_centavos: 0,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_centavos() {
        assert!(validate_centavos("price", 0).is_ok());
        assert!(validate_centavos("price", 1099).is_ok());
        assert!(matches!(
            validate_centavos("price", -1),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
    }

    #[test]
    fn test_validate_stock_delta() {
        assert!(validate_stock_delta(-3).is_ok());
        assert!(validate_stock_delta(12).is_ok());
        assert!(validate_stock_delta(0).is_err());
        assert!(validate_stock_delta(MAX_STOCK_DELTA + 1).is_err());
    }

    #[test]
    fn test_completed_sale_needs_items_but_parked_does_not() {
        let empty = sale(vec![]);
        assert!(validate_sale(&empty, SaleStatus::Completed).is_err());
        assert!(validate_sale(&empty, SaleStatus::Parked).is_ok());
    }

    #[test]
    fn test_sale_rejects_negative_money_and_missing_tx() {
        assert!(validate_sale(&sale(vec![line(1, -5)]), SaleStatus::Completed).is_err());

        let mut missing_tx = sale(vec![line(1, 500)]);
        missing_tx.client_tx_id = "  ".to_string();
        assert!(matches!(
            validate_sale(&missing_tx, SaleStatus::Completed),
            Err(ValidationError::Required { .. })
        ));
    }
}
