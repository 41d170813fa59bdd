//! # Error Types
//!
//! Domain error taxonomy for the ledger.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  clinic-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  clinic-db errors                                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  ├── LedgerError      - CoreError | DbError (what services return)     │
//! │  └── ApiError         - What the routing layer serializes              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → ApiError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a failure, used by the boundary to choose a
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientStock,
    PeriodClosed,
    UnsupportedReversal,
    EmptyDraft,
    Unauthorized,
    Forbidden,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by ledger operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Transaction type string is not one of the five ledger kinds.
    #[error("Invalid transaction type: {0}")]
    InvalidTransactionType(String),

    /// A backdated `transaction_date` could not be parsed.
    #[error("Invalid transaction_date '{value}'. Use: YYYY-MM-DD HH:MM:SS")]
    InvalidDate { value: String },

    /// No authenticated actor.
    #[error("User not authenticated")]
    Unauthenticated,

    /// Actor lacks the role required for the operation.
    #[error("{role} may not {action}")]
    Forbidden { action: String, role: String },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Period not found: {0}")]
    PeriodNotFound(String),

    /// Also returned when the draft exists but belongs to someone else.
    #[error("Draft sale not found: {0}")]
    DraftNotFound(String),

    #[error("Item {item_id} not found in draft {draft_id}")]
    DraftItemNotFound { draft_id: String, item_id: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// A second OPEN period was requested.
    ///
    /// ## User Workflow
    /// ```text
    /// Admin clicks "New period"
    ///      │
    ///      ▼
    /// Period 'March' is still OPEN
    ///      │
    ///      ▼
    /// PeriodAlreadyOpen { period_name: "March" }
    ///      │
    ///      ▼
    /// UI shows: "Close 'March' before opening a new period"
    /// ```
    #[error("Cannot create new period. Period '{period_name}' is still OPEN. Please close it first.")]
    PeriodAlreadyOpen { period_name: String },

    #[error("Period is already closed: {0}")]
    PeriodAlreadyClosed(String),

    #[error("Transaction {0} has already been reversed")]
    AlreadyReversed(String),

    /// A SALE would take stock below zero.
    #[error("Insufficient stock for {product_name}. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product_id: String,
        product_name: String,
        available: i64,
        requested: i64,
    },

    /// Write attempted against a CLOSED period.
    #[error("Cannot create transactions in closed period {0}")]
    PeriodClosed(String),

    /// Only SALE and PURCHASE entries can be reversed.
    #[error("Cannot reverse {transaction_type} transaction {transaction_id}: only SALE and PURCHASE can be reversed")]
    UnsupportedReversal {
        transaction_id: String,
        transaction_type: String,
    },

    #[error("Cannot commit draft {0} with no items")]
    EmptyDraft(String),

    #[error("Draft cannot have more than {max} items")]
    DraftTooLarge { max: usize },
}

impl CoreError {
    /// Classifies the error for the routing layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::InvalidTransactionType(_)
            | CoreError::InvalidDate { .. }
            | CoreError::DraftTooLarge { .. } => ErrorKind::Validation,
            CoreError::Unauthenticated => ErrorKind::Unauthorized,
            CoreError::Forbidden { .. } => ErrorKind::Forbidden,
            CoreError::ProductNotFound(_)
            | CoreError::PeriodNotFound(_)
            | CoreError::DraftNotFound(_)
            | CoreError::DraftItemNotFound { .. }
            | CoreError::TransactionNotFound(_) => ErrorKind::NotFound,
            CoreError::PeriodAlreadyOpen { .. }
            | CoreError::PeriodAlreadyClosed(_)
            | CoreError::AlreadyReversed(_) => ErrorKind::Conflict,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::PeriodClosed(_) => ErrorKind::PeriodClosed,
            CoreError::UnsupportedReversal { .. } => ErrorKind::UnsupportedReversal,
            CoreError::EmptyDraft(_) => ErrorKind::EmptyDraft,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must be non-negative")]
    MustBeNonNegative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value is outside the allowed range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, date range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_carries_both_figures() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            product_name: "Paracetamol 500mg".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Paracetamol 500mg. Available: 3, Requested: 5"
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            CoreError::PeriodAlreadyOpen {
                period_name: "Jan".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::DraftNotFound("d".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CoreError::Unauthenticated.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            CoreError::InvalidDate {
                value: "yesterday".into()
            }
            .kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: name is required");
    }
}
