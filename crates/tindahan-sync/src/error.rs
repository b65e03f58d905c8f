//! # Engine Error Types
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │  Authorization  │  │       Not Found         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Unauthorized   │  │  NotFound               │ │
//! │  │  BatchTooLarge  │  │  Forbidden      │  │                         │ │
//! │  │                 │  │  StepUpRequired │  │                         │ │
//! │  │                 │  │  StepUpRejected │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Business Rule  │  │              Transient                      │  │
//! │  │                 │  │                                             │  │
//! │  │  Rule           │  │  InProgress  Contention  Storage(transient) │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Everything except the transient box is permanent: resubmitting the     │
//! │  same event unchanged fails the same way.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use tindahan_core::{Capability, CoreError, ValidationError};
use tindahan_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Validation
    // =========================================================================
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Batch of {size} events exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    // =========================================================================
    // Authorization
    // =========================================================================
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing capability: {capability}")]
    Forbidden { capability: Capability },

    #[error("Manager PIN required for {capability}")]
    StepUpRequired { capability: Capability },

    #[error("Manager PIN rejected for {capability}")]
    StepUpRejected { capability: Capability },

    // =========================================================================
    // Domain
    // =========================================================================
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Business-rule violation (invalid transition, non-sellable product,
    /// negative stock, refund over refundable).
    #[error(transparent)]
    Rule(CoreError),

    // =========================================================================
    // Transient
    // =========================================================================
    /// Another attempt holds a fresh pending guard record for this key.
    #[error("Operation {operation} with key {key} is already in progress")]
    InProgress { operation: String, key: String },

    /// Lost an optimistic write too many times in a row.
    #[error("Contention on {resource}; retry later")]
    Contention { resource: String },

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    // =========================================================================
    // Internal
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            CoreError::Validation(v) => EngineError::Validation(v),
            other => EngineError::Rule(other),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("serialization failed: {}", err))
    }
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Wire-level error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) | EngineError::BatchTooLarge { .. } | EngineError::Rule(_) => {
                ErrorCode::BadRequest
            }
            EngineError::Unauthorized(_) => ErrorCode::Unauthorized,
            EngineError::Forbidden { .. }
            | EngineError::StepUpRequired { .. }
            | EngineError::StepUpRejected { .. } => ErrorCode::Forbidden,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Storage(DbError::NotFound { .. }) => ErrorCode::NotFound,
            EngineError::Storage(DbError::SchemaMissing(_)) => ErrorCode::SchemaMissing,
            EngineError::Storage(_)
            | EngineError::InProgress { .. }
            | EngineError::Contention { .. }
            | EngineError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Optional structured details for the error envelope.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::Forbidden { capability }
            | EngineError::StepUpRequired { capability }
            | EngineError::StepUpRejected { capability } => {
                Some(serde_json::json!({ "capability": capability }))
            }
            EngineError::InProgress { .. } | EngineError::Contention { .. } => {
                Some(serde_json::json!({ "retryable": true }))
            }
            EngineError::Rule(CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            }) => Some(serde_json::json!({
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
            EngineError::Rule(CoreError::SubmissionMismatch { sale_id, field }) => {
                Some(serde_json::json!({ "sale_id": sale_id, "field": field }))
            }
            EngineError::Rule(CoreError::RefundExceedsRefundable {
                requested,
                refundable,
            }) => Some(serde_json::json!({
                "requested_centavos": requested,
                "refundable_centavos": refundable,
            })),
            _ => None,
        }
    }
}

// =============================================================================
// Wire Codes & Classification
// =============================================================================

/// The fixed set of error codes a client can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    SchemaMissing,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::SchemaMissing => "SCHEMA_MISSING",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a queued client event should ever be resubmitted unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

/// Classifies an error for the retry/permanent decision.
///
/// Depends only on the error, never on the event type that produced it.
pub fn classify(err: &EngineError) -> FailureClass {
    match err {
        EngineError::InProgress { .. } | EngineError::Contention { .. } => FailureClass::Retryable,
        EngineError::Storage(db) if db.is_transient() => FailureClass::Retryable,
        // A schema that is missing now may be migrated later.
        EngineError::Storage(DbError::SchemaMissing(_)) => FailureClass::Retryable,
        EngineError::Storage(DbError::QueryFailed(_)) => FailureClass::Retryable,
        EngineError::Internal(_) => FailureClass::Retryable,
        EngineError::Storage(_)
        | EngineError::Validation(_)
        | EngineError::BatchTooLarge { .. }
        | EngineError::Unauthorized(_)
        | EngineError::Forbidden { .. }
        | EngineError::StepUpRequired { .. }
        | EngineError::StepUpRejected { .. }
        | EngineError::NotFound { .. }
        | EngineError::Rule(_) => FailureClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tindahan_core::SaleStatus;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert_eq!(
            classify(&EngineError::Storage(DbError::Busy("locked".into()))),
            FailureClass::Retryable
        );
        assert_eq!(
            classify(&EngineError::Storage(DbError::PoolExhausted)),
            FailureClass::Retryable
        );
        assert_eq!(
            classify(&EngineError::Contention {
                resource: "product p-1".into()
            }),
            FailureClass::Retryable
        );
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let cases = [
            EngineError::Validation(ValidationError::required("client_tx_id")),
            EngineError::Forbidden {
                capability: Capability::SaleVoid,
            },
            EngineError::StepUpRejected {
                capability: Capability::SaleRefund,
            },
            EngineError::not_found("Sale", "s-1"),
            EngineError::from(CoreError::InvalidTransition {
                sale_id: "s-1".into(),
                from: SaleStatus::Voided,
                to: SaleStatus::Completed,
            }),
            EngineError::from(CoreError::SubmissionMismatch {
                sale_id: "s-1".into(),
                field: "items".into(),
            }),
        ];
        for err in &cases {
            assert_eq!(classify(err), FailureClass::Permanent, "{}", err);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            EngineError::Validation(ValidationError::required("items")).code(),
            ErrorCode::BadRequest
        );
        assert_eq!(
            EngineError::from(CoreError::not_found("Product", "p-9")).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            EngineError::Storage(DbError::SchemaMissing("no such table: sales".into())).code(),
            ErrorCode::SchemaMissing
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::SchemaMissing).unwrap(),
            "\"SCHEMA_MISSING\""
        );
    }
}
