//! # API Boundary Types
//!
//! What the routing layer needs to turn a service result into an HTTP
//! response.
//!
//! ## Envelope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service call                                                           │
//! │       │                                                                 │
//! │       ├── Ok(data)  ──► ApiResponse::ok("Sale committed", data)         │
//! │       │                 { "success": true,  "message": ..., "data": .. }│
//! │       │                 HTTP 200                                        │
//! │       │                                                                 │
//! │       └── Err(e)    ──► ApiError::from(e)                               │
//! │                         { "success": false, "message": ..., "code": .. }│
//! │                         HTTP e.http_status()                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use clinic_core::{CoreError, ErrorKind};

use crate::error::{DbError, LedgerError};

// =============================================================================
// Error Code
// =============================================================================

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,
    /// Missing authentication (401)
    Unauthorized,
    /// Wrong role (403)
    Forbidden,
    /// Resource not found (404)
    NotFound,
    /// Second OPEN period, already closed, already reversed (409)
    Conflict,
    /// Sale exceeds available stock (422)
    InsufficientStock,
    /// Write against a CLOSED period (422)
    PeriodClosed,
    /// Reversal of a non-SALE/PURCHASE entry (422)
    UnsupportedReversal,
    /// Commit of an empty draft (422)
    EmptyDraft,
    /// Database operation failed (500)
    DatabaseError,
}

impl ErrorCode {
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::InsufficientStock
            | ErrorCode::PeriodClosed
            | ErrorCode::UnsupportedReversal
            | ErrorCode::EmptyDraft => 422,
            ErrorCode::DatabaseError => 500,
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::ValidationError,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::InsufficientStock => ErrorCode::InsufficientStock,
            ErrorKind::PeriodClosed => ErrorCode::PeriodClosed,
            ErrorKind::UnsupportedReversal => ErrorCode::UnsupportedReversal,
            ErrorKind::EmptyDraft => ErrorCode::EmptyDraft,
            ErrorKind::Unauthorized => ErrorCode::Unauthorized,
            ErrorKind::Forbidden => ErrorCode::Forbidden,
        }
    }
}

// =============================================================================
// Api Error
// =============================================================================

/// Serialized failure.
///
/// ```json
/// {
///   "success": false,
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for Paracetamol 500mg. Available: 3, Requested: 5",
///   "data": { "available": 3, "requested": 5 }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub code: ErrorCode,
    pub message: String,
    /// Structured detail for errors that carry figures the UI shows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            success: false,
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[inline]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", entity, id))
            }
            DbError::UniqueViolation { field, .. } => {
                tracing::warn!(field = %field, "Unique constraint rejected write");
                ApiError::new(ErrorCode::Conflict, "Conflicting record already exists")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            other => {
                // Log the actual error but return a generic message
                tracing::error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = ErrorCode::from(err.kind());
        let message = err.to_string();
        match err {
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            } => ApiError::new(code, message).with_data(serde_json::json!({
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
            _ => ApiError::new(code, message),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Core(e) => e.into(),
            LedgerError::Db(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Api Response
// =============================================================================

/// Success envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Wraps a service result for the routing layer.
pub fn respond<T: Serialize>(
    message: &str,
    result: Result<T, LedgerError>,
) -> Result<ApiResponse<T>, ApiError> {
    result.map(|data| ApiResponse::ok(message, data)).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (CoreError::Unauthenticated, 401),
            (
                CoreError::Forbidden {
                    action: "close period".into(),
                    role: "cashier".into(),
                },
                403,
            ),
            (CoreError::ProductNotFound("p".into()), 404),
            (
                CoreError::PeriodAlreadyOpen {
                    period_name: "March".into(),
                },
                409,
            ),
            (CoreError::PeriodClosed("per".into()), 422),
            (CoreError::EmptyDraft("d".into()), 422),
            (CoreError::InvalidTransactionType("X".into()), 400),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).http_status(), status);
        }
        assert_eq!(ApiError::from(DbError::PoolExhausted).http_status(), 500);
    }

    #[test]
    fn test_insufficient_stock_carries_figures() {
        let api = ApiError::from(CoreError::InsufficientStock {
            product_id: "p-1".into(),
            product_name: "Gauze".into(),
            available: 2,
            requested: 9,
        });
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "INSUFFICIENT_STOCK");
        assert_eq!(json["data"]["available"], 2);
        assert_eq!(json["data"]["requested"], 9);
    }

    #[test]
    fn test_envelope() {
        let ok = respond("Done", Ok::<_, LedgerError>(vec!["t-1"])).unwrap();
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Done");
        assert_eq!(json["data"][0], "t-1");

        let err = respond::<()>("Done", Err(CoreError::EmptyDraft("d".into()).into())).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyDraft);
    }
}
