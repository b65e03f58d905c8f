//! # Sale Lifecycle
//!
//! ## State Machine
//! ```text
//!                 ┌────────────┐
//!   create ──────►│   parked   │
//!     │           └─────┬──────┘
//!     │          ┌──────┴───────┐
//!     │          ▼              ▼
//!     │    ┌───────────┐   ┌─────────┐
//!     ├───►│ completed │   │   due   │◄──── create
//!     │    └──┬─────┬──┘   └────┬────┘
//!     │       │     │           │
//!     │       ▼     ▼           ▼
//!     │  refunded  voided ◄─────┘
//!     │  (terminal) (terminal)
//! ```
//!
//! Submitting a sale whose `client_tx_id` already exists is a *resume*: the
//! same status again (or parked → completed/due) is accepted and the keyed
//! side effects are re-run, which dedup themselves. Once a sale has left
//! `parked` its content is frozen; see [`check_resubmission`].

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::events::LineInput;
use crate::totals::SaleTotals;
use crate::types::{Sale, SaleLineItem, SaleStatus};

/// Whether `from → to` is an edge of the state machine.
pub const fn can_transition(from: SaleStatus, to: SaleStatus) -> bool {
    matches!(
        (from, to),
        (SaleStatus::Parked, SaleStatus::Completed)
            | (SaleStatus::Parked, SaleStatus::Due)
            | (SaleStatus::Completed, SaleStatus::Voided)
            | (SaleStatus::Completed, SaleStatus::Refunded)
            | (SaleStatus::Due, SaleStatus::Voided)
    )
}

pub const fn is_terminal(status: SaleStatus) -> bool {
    matches!(status, SaleStatus::Voided | SaleStatus::Refunded)
}

/// Fails with `InvalidTransition` unless `from → to` is allowed.
pub fn check_transition(sale_id: &str, from: SaleStatus, to: SaleStatus) -> CoreResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            sale_id: sale_id.to_string(),
            from,
            to,
        })
    }
}

/// What a sale submission has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPlan {
    /// Status the sale had before, `None` when it is new.
    pub previous: Option<SaleStatus>,
    pub target: SaleStatus,
    /// Stock, payments, balance and receipt effects (never for parked).
    pub run_side_effects: bool,
}

impl SubmissionPlan {
    pub fn is_resume(&self) -> bool {
        self.previous.is_some()
    }

    pub fn status_changes(&self) -> bool {
        self.previous != Some(self.target)
    }
}

/// Decides how a submission for `target` treats a sale currently in
/// `existing` (or absent).
///
/// ## Example
/// ```rust
/// use tindahan_core::lifecycle::plan_submission;
/// use tindahan_core::SaleStatus;
///
/// let plan = plan_submission("s-1", Some(SaleStatus::Parked), SaleStatus::Due).unwrap();
/// assert!(plan.run_side_effects);
/// assert!(plan_submission("s-1", Some(SaleStatus::Voided), SaleStatus::Completed).is_err());
/// ```
pub fn plan_submission(
    sale_id: &str,
    existing: Option<SaleStatus>,
    target: SaleStatus,
) -> CoreResult<SubmissionPlan> {
    if !matches!(
        target,
        SaleStatus::Parked | SaleStatus::Completed | SaleStatus::Due
    ) {
        return Err(ValidationError::NotAllowed {
            field: "status".to_string(),
            allowed: vec![
                "parked".to_string(),
                "completed".to_string(),
                "due".to_string(),
            ],
        }
        .into());
    }

    if let Some(current) = existing {
        if current != target {
            check_transition(sale_id, current, target)?;
        }
    }

    Ok(SubmissionPlan {
        previous: existing,
        target,
        run_side_effects: target != SaleStatus::Parked,
    })
}

/// Rejects a resubmission that would change a sale whose effects may
/// already be applied.
///
/// A parked sale may change freely. A completed or due sale must arrive with
/// the same customer, the same totals and, when lines were already stored,
/// the same lines.
pub fn check_resubmission(
    sale: &Sale,
    stored_lines: &[SaleLineItem],
    items: &[LineInput],
    customer_id: Option<&str>,
    totals: &SaleTotals,
) -> CoreResult<()> {
    if sale.status == SaleStatus::Parked {
        return Ok(());
    }

    let mismatch = |field: &str| CoreError::SubmissionMismatch {
        sale_id: sale.id.clone(),
        field: field.to_string(),
    };

    if sale.customer_id.as_deref() != customer_id {
        return Err(mismatch("customer_id"));
    }

    let amounts = [
        ("subtotal_centavos", sale.subtotal_centavos, totals.subtotal),
        ("discount_centavos", sale.discount_centavos, totals.discount),
        ("total_centavos", sale.total_centavos, totals.total),
        ("paid_centavos", sale.paid_centavos, totals.paid),
        ("balance_due_centavos", sale.balance_due_centavos, totals.balance_due),
    ];
    for (field, stored, submitted) in amounts {
        if stored != submitted.centavos() {
            return Err(mismatch(field));
        }
    }

    // Empty when the first attempt failed before writing its lines.
    if stored_lines.is_empty() {
        return Ok(());
    }
    let same_lines = stored_lines.len() == items.len()
        && stored_lines.iter().zip(items).all(|(stored, item)| {
            stored.product_id == item.product_id
                && stored.quantity == item.quantity
                && stored.unit_price_centavos == item.unit_price_centavos
                && stored.line_discount_centavos == item.line_discount_centavos
        });
    if !same_lines {
        return Err(mismatch("items"));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use SaleStatus::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(can_transition(Parked, Completed));
        assert!(can_transition(Parked, Due));
        assert!(can_transition(Completed, Voided));
        assert!(can_transition(Completed, Refunded));
        assert!(can_transition(Due, Voided));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!can_transition(Due, Refunded));
        assert!(!can_transition(Completed, Due));
        assert!(!can_transition(Completed, Parked));
        for next in [Parked, Completed, Due, Voided, Refunded] {
            assert!(!can_transition(Voided, next));
            assert!(!can_transition(Refunded, next));
        }
    }

    #[test]
    fn test_new_sale_plan() {
        let plan = plan_submission("s", None, Completed).unwrap();
        assert!(!plan.is_resume());
        assert!(plan.run_side_effects);

        let parked = plan_submission("s", None, Parked).unwrap();
        assert!(!parked.run_side_effects);
    }

    #[test]
    fn test_resume_same_status_reruns_effects() {
        let plan = plan_submission("s", Some(Completed), Completed).unwrap();
        assert!(plan.is_resume());
        assert!(!plan.status_changes());
        assert!(plan.run_side_effects);
    }

    #[test]
    fn test_resume_cannot_reopen_voided_sale() {
        let err = plan_submission("s", Some(Voided), Completed).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(plan_submission("s", Some(Completed), Parked).is_err());
    }

    #[test]
    fn test_cannot_create_into_terminal_status() {
        assert!(plan_submission("s", None, Voided).is_err());
    }

    mod resubmission {
        use super::*;
        use crate::clock;
        use crate::money::Money;

        fn item(qty: i64) -> LineInput {
            LineInput {
                product_id: "p-1".to_string(),
                quantity: qty,
                unit_price_centavos: 500,
                line_discount_centavos: 0,
            }
        }

        fn stored(qty: i64) -> SaleLineItem {
            SaleLineItem {
                id: "s:0".to_string(),
                sale_id: "s".to_string(),
                line_index: 0,
                product_id: "p-1".to_string(),
                quantity: qty,
                unit_price_centavos: 500,
                line_discount_centavos: 0,
                line_total_centavos: qty * 500,
            }
        }

        fn totals(total: i64) -> SaleTotals {
            let total = Money::from_centavos(total);
            SaleTotals {
                subtotal: total,
                manual_discount: Money::zero(),
                auto_discount: Money::zero(),
                discount: Money::zero(),
                total,
                paid: Money::zero(),
                change: Money::zero(),
                balance_due: total,
            }
        }

        fn due_sale(total: i64) -> Sale {
            let now = clock::now();
            Sale {
                id: "s".to_string(),
                store_id: "store".to_string(),
                client_tx_id: "tx".to_string(),
                device_id: None,
                cashier_id: None,
                customer_id: Some("c-1".to_string()),
                status: Due,
                subtotal_centavos: total,
                discount_centavos: 0,
                total_centavos: total,
                paid_centavos: 0,
                change_centavos: 0,
                balance_due_centavos: total,
                receipt_number: None,
                balance_due_applied: true,
                balance_applied_centavos: total,
                note: None,
                created_at: now,
                updated_at: now,
                completed_at: Some(now),
                voided_at: None,
                refunded_at: None,
            }
        }

        #[test]
        fn test_same_content_is_accepted() {
            let sale = due_sale(1000);
            check_resubmission(&sale, &[stored(2)], &[item(2)], Some("c-1"), &totals(1000)).unwrap();
            // Lines not yet written: totals alone decide.
            check_resubmission(&sale, &[], &[item(2)], Some("c-1"), &totals(1000)).unwrap();
        }

        #[test]
        fn test_changed_content_is_rejected() {
            let sale = due_sale(1000);

            let err = check_resubmission(&sale, &[stored(2)], &[item(5)], Some("c-1"), &totals(2500))
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::SubmissionMismatch { ref field, .. } if field == "subtotal_centavos"
            ));

            let err = check_resubmission(&sale, &[stored(2)], &[item(2)], Some("c-2"), &totals(1000))
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::SubmissionMismatch { ref field, .. } if field == "customer_id"
            ));

            let mut swapped = stored(2);
            swapped.product_id = "p-2".to_string();
            let err = check_resubmission(&sale, &[swapped], &[item(2)], Some("c-1"), &totals(1000))
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::SubmissionMismatch { ref field, .. } if field == "items"
            ));
        }

        #[test]
        fn test_parked_sale_may_change() {
            let mut sale = due_sale(1000);
            sale.status = Parked;
            check_resubmission(&sale, &[stored(2)], &[item(5)], None, &totals(2500)).unwrap();
        }
    }
}
