//! # API Error Type
//!
//! Every failure leaves the server in the same envelope:
//!
//! ```json
//! {
//!   "ok": false,
//!   "error": { "code": "NOT_FOUND", "message": "Sale not found: s-1" }
//! }
//! ```
//!
//! ## Status Mapping
//! ```text
//! ┌──────────────────┬────────┐
//! │ BAD_REQUEST      │ 400    │
//! │ UNAUTHORIZED     │ 401    │
//! │ FORBIDDEN        │ 403    │
//! │ NOT_FOUND        │ 404    │
//! │ SCHEMA_MISSING   │ 500    │
//! │ INTERNAL         │ 500    │  503 when the failure is retryable
//! └──────────────────┴────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tindahan_sync::{classify, EngineError, ErrorCode, EventError, FailureClass};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: EventError,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Engine(err) => err.code(),
            ApiError::Unauthorized(_) => ErrorCode::Unauthorized,
            ApiError::BadRequest(_) => ErrorCode::BadRequest,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        if let ApiError::Engine(err) = self {
            if classify(err) == FailureClass::Retryable {
                return StatusCode::SERVICE_UNAVAILABLE;
            }
        }
        match self.code() {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::SchemaMissing | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> EventError {
        match self {
            ApiError::Engine(err) => EventError::from_engine(err),
            other => EventError {
                code: other.code(),
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = %self.code().as_str(), error = %self, "Request failed");
        }
        let body = ErrorEnvelope {
            ok: false,
            error: self.body(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tindahan_core::{Capability, ValidationError};
    use tindahan_db::DbError;

    #[test]
    fn test_status_follows_code() {
        let forbidden = ApiError::from(EngineError::Forbidden {
            capability: Capability::SaleVoid,
        });
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let invalid = ApiError::from(EngineError::Validation(ValidationError::required("items")));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        assert_eq!(ApiError::unauthorized("no token").status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_retryable_maps_to_unavailable() {
        let busy = ApiError::from(EngineError::Storage(DbError::Busy("database is locked".to_string())));
        assert_eq!(busy.code(), ErrorCode::Internal);
        assert_eq!(busy.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_envelope_shape() {
        let err = ApiError::from(EngineError::Forbidden {
            capability: Capability::SaleRefund,
        });
        let value = serde_json::to_value(ErrorEnvelope {
            ok: false,
            error: err.body(),
        })
        .unwrap();

        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "FORBIDDEN");
        assert_eq!(value["error"]["details"]["capability"], "sale_refund");
    }
}
