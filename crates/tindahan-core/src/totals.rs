//! # Sale Totals
//!
//! ```text
//! subtotal     = Σ (qty × unit_price − line_discount)
//! auto_disc    = floor(subtotal × auto_discount_bps / 10000)
//! discount     = manual_discount + auto_disc
//! total        = subtotal − discount
//! paid         = Σ payments
//!
//! completed:   change      = max(0, paid − total)     (paid must cover total)
//! due:         balance_due = max(0, total − min(paid, total))
//! parked:      change = balance_due = 0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::{LineInput, PaymentInput};
use crate::money::Money;
use crate::types::SaleStatus;
use crate::validation::ValidationResult;

/// Computed money fields of a sale, all in centavos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub manual_discount: Money,
    pub auto_discount: Money,
    pub discount: Money,
    pub total: Money,
    pub paid: Money,
    pub change: Money,
    pub balance_due: Money,
}

/// `qty × unit_price − line_discount`; the discount may not exceed the line.
pub fn line_total(item: &LineInput) -> ValidationResult<Money> {
    let gross = Money::from_centavos(item.unit_price_centavos)
        .checked_mul_qty(item.quantity, "line_total")?;
    let discount = Money::from_centavos(item.line_discount_centavos);

    if discount > gross {
        return Err(ValidationError::OutOfRange {
            field: "line_discount_centavos".to_string(),
            min: 0,
            max: gross.centavos(),
        });
    }

    gross.checked_sub(discount, "line_total")
}

/// Computes every money field of a sale headed for `status`.
pub fn compute_totals(
    items: &[LineInput],
    manual_discount_centavos: i64,
    auto_discount_bps: u32,
    payments: &[PaymentInput],
    status: SaleStatus,
) -> ValidationResult<SaleTotals> {
    let mut subtotal = Money::zero();
    for item in items {
        subtotal = subtotal.checked_add(line_total(item)?, "subtotal")?;
    }

    let manual_discount = Money::from_centavos(manual_discount_centavos);
    let auto_discount = subtotal.percentage_floor(auto_discount_bps);
    let discount = manual_discount.checked_add(auto_discount, "discount_centavos")?;

    if discount > subtotal {
        return Err(ValidationError::OutOfRange {
            field: "discount_centavos".to_string(),
            min: 0,
            max: subtotal.centavos(),
        });
    }
    let total = subtotal - discount;

    let mut paid = Money::zero();
    for payment in payments {
        paid = paid.checked_add(Money::from_centavos(payment.amount_centavos), "paid")?;
    }

    let (change, balance_due) = match status {
        SaleStatus::Completed => {
            if paid < total {
                return Err(ValidationError::Underpaid {
                    total: total.centavos(),
                    paid: paid.centavos(),
                });
            }
            (paid.saturating_sub_floor(total), Money::zero())
        }
        SaleStatus::Due => (Money::zero(), total.saturating_sub_floor(paid.min(total))),
        _ => (Money::zero(), Money::zero()),
    };

    Ok(SaleTotals {
        subtotal,
        manual_discount,
        auto_discount,
        discount,
        total,
        paid,
        change,
        balance_due,
    })
}

/// What is still refundable on a sale.
///
/// Derived from the payment and refund rows, never stored on the sale.
pub fn refundable(total: Money, paid: Money, already_refunded: Money) -> Money {
    total.min(paid).saturating_sub_floor(already_refunded)
}

// =============================================================================
// Unit Tests
// =============================================================================
