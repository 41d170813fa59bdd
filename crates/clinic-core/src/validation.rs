//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Routing layer                                                │
//! │  └── Deserialization (is quantity a number at all?)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: clinic-db services                                           │
//! │  └── THIS MODULE: field rules, before any row is read                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK / NOT NULL constraints                                      │
//! │  ├── Partial UNIQUE index (one OPEN period)                            │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clinic_core::validation::{validate_product_name, validate_physical_count};
//!
//! validate_product_name("Amoxicillin 250mg").unwrap();
//! assert!(validate_physical_count(-1).is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::NewProduct;
use crate::{MAX_ENTRY_QUANTITY, MAX_HISTORY_ROWS, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Product names: required, at most 100 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required_text("name", name, 100)
}

/// Period names: required, at most 50 characters.
pub fn validate_period_name(name: &str) -> ValidationResult<()> {
    required_text("period_name", name, 50)
}

/// A reversal must say why. At most 500 characters.
pub fn validate_reversal_reason(reason: &str) -> ValidationResult<()> {
    required_text("reason", reason, 500)
}

/// Supplier names on purchases: required, at most 100 characters.
pub fn validate_supplier(supplier: &str) -> ValidationResult<()> {
    required_text("supplier", supplier, 100)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Selling price must be positive.
pub fn validate_selling_price(price: Money) -> ValidationResult<()> {
    if !price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "selling_price".to_string(),
        });
    }
    validate_price_ceiling("selling_price", price)
}

/// Unit price of an entry, or cost price of a product. Zero is allowed.
pub fn validate_non_negative_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
        });
    }
    validate_price_ceiling(field, price)
}

fn validate_price_ceiling(field: &str, price: Money) -> ValidationResult<()> {
    if price.cents() > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Stock figures entered by a person (opening stock, physical count).
fn validate_stock_figure(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: field.to_string(),
        });
    }
    if value > MAX_ENTRY_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_ENTRY_QUANTITY,
        });
    }
    Ok(())
}

pub fn validate_physical_count(count: i64) -> ValidationResult<()> {
    validate_stock_figure("physical_count", count)
}

/// Clamps a history limit into `1..=MAX_HISTORY_ROWS`. Missing means the
/// maximum.
pub fn clamp_history_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(MAX_HISTORY_ROWS).clamp(1, MAX_HISTORY_ROWS)
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Checks a whole new product.
///
/// ## Rules
/// - name required
/// - selling price > 0
/// - cost price ≥ 0
/// - opening stock ≥ 0
/// - reorder level ≥ 0 when given
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_product_name(&product.name)?;
    validate_selling_price(product.selling_price)?;
    validate_non_negative_price("cost_price", product.cost_price)?;
    validate_stock_figure("opening_stock", product.opening_stock)?;
    if let Some(level) = product.reorder_level {
        validate_stock_figure("reorder_level", level)?;
    }
    Ok(())
}

/// `end` may be absent; when present it must not precede `start`.
pub fn validate_period_range(start: NaiveDate, end: Option<NaiveDate>) -> ValidationResult<()> {
    if let Some(end) = end {
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "end_date".to_string(),
                reason: "must not be before start_date".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
