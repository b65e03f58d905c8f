//! # Error Types
//!
//! Domain-specific error types for tindahan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tindahan-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed or out-of-range input                │
//! │                                                                         │
//! │  tindahan-db errors                                                    │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  tindahan-sync errors                                                  │
//! │  └── EngineError      - Classified retryable / permanent               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → Device   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is permanent from a device's point of view: resending
//! the same payload produces the same error.

use thiserror::Error;

use crate::types::SaleStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by pure domain logic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist in this store (or was soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The sale cannot move from its current status to the requested one.
    ///
    /// ## Allowed Moves
    /// ```text
    /// parked ──► completed ──► voided
    ///    │           └───────► refunded
    ///    └─────► due ────────► voided
    /// ```
    #[error("Sale {sale_id} cannot move from {from} to {to}")]
    InvalidTransition {
        sale_id: String,
        from: SaleStatus,
        to: SaleStatus,
    },

    /// A parent (non-sellable) product was used as a line item.
    #[error("Product {product_id} is not sellable")]
    NotSellable { product_id: String },

    /// Stock would go below zero and the store forbids negative stock.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// A sale that already left `parked` was resubmitted with different
    /// content. Its stock and balance effects follow the first submission.
    #[error("Sale {sale_id} was already submitted with a different {field}")]
    SubmissionMismatch { sale_id: String, field: String },

    /// Refund amount is larger than what is left to refund.
    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsRefundable { requested: i64, refundable: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any storage is touched, so a request failing here has no
/// side effects at all.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., bad cursor, malformed payload).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A completed sale whose payments do not reach the total.
    #[error("payments of {paid} do not cover total {total}; submit as due instead")]
    Underpaid { total: i64, paid: i64 },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "rice-5kg".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for rice-5kg: available 3, requested 5"
        );

        let err = CoreError::InvalidTransition {
            sale_id: "s-1".to_string(),
            from: SaleStatus::Voided,
            to: SaleStatus::Completed,
        };
        assert_eq!(err.to_string(), "Sale s-1 cannot move from voided to completed");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("client_tx_id");
        assert_eq!(err.to_string(), "client_tx_id is required");

        let err = ValidationError::MustNotBeNegative {
            field: "discount_centavos".to_string(),
        };
        assert_eq!(err.to_string(), "discount_centavos must not be negative");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("items").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
