//! # Ledger Rules
//!
//! Pure functions over ledger rows: the stock fold, the sale gate, the
//! reversal quantity and business-date parsing.
//!
//! ## Stock Projection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  opening_stock ─┐                                                       │
//! │                 │                                                       │
//! │  PURCHASE  +50 ─┤                                                       │
//! │  SALE      -30 ─┼──► Σ stock_effect ──► current_stock                   │
//! │  ADJUST     -5 ─┤                                                       │
//! │  REVERSAL  +30 ─┘                                                       │
//! │                                                                         │
//! │  Summation is commutative: any order of rows gives the same stock.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{LedgerEntry, Product, TransactionType};
use crate::MAX_ENTRY_QUANTITY;

// =============================================================================
// Stock Movement
// =============================================================================

/// The two columns the projector needs from a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub transaction_type: TransactionType,
    pub quantity: i64,
}

impl StockMovement {
    pub const fn new(transaction_type: TransactionType, quantity: i64) -> Self {
        StockMovement {
            transaction_type,
            quantity,
        }
    }

    #[inline]
    pub const fn effect(&self) -> i64 {
        self.transaction_type.stock_effect(self.quantity)
    }
}

impl From<&LedgerEntry> for StockMovement {
    fn from(entry: &LedgerEntry) -> Self {
        StockMovement::new(entry.transaction_type, entry.quantity)
    }
}

/// Net signed effect of a set of movements.
pub fn net_effect(movements: &[StockMovement]) -> i64 {
    movements.iter().map(StockMovement::effect).sum()
}

/// Folds movements over an opening stock.
///
/// ## Example
/// ```rust
/// use clinic_core::ledger::{project_stock, StockMovement};
/// use clinic_core::TransactionType;
///
/// let rows = [
///     StockMovement::new(TransactionType::Sale, 30),
///     StockMovement::new(TransactionType::Reversal, 30),
/// ];
/// assert_eq!(project_stock(100, &rows), 100);
/// ```
pub fn project_stock(opening_stock: i64, movements: &[StockMovement]) -> i64 {
    opening_stock + net_effect(movements)
}

/// Applies one movement to a running stock figure.
///
/// Folding with this function and calling [`project_stock`] give the same
/// answer for the same rows.
#[inline]
pub fn apply_movement(stock: i64, movement: StockMovement) -> i64 {
    stock + movement.effect()
}

// =============================================================================
// Sale Gate
// =============================================================================

/// Fails with `InsufficientStock` when a SALE of `requested` would take
/// the product below zero.
pub fn check_sale_stock(product: &Product, requested: i64) -> CoreResult<()> {
    if product.current_stock < requested {
        return Err(CoreError::InsufficientStock {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            available: product.current_stock,
            requested,
        });
    }
    Ok(())
}

// =============================================================================
// Reversal
// =============================================================================

/// Quantity of the REVERSAL row that exactly cancels `original`.
///
/// `stock_effect(REVERSAL, q) == q`, so the reversal quantity is the
/// negated effect of the original:
///
/// ```text
/// SALE     5  (effect -5)  →  REVERSAL +5
/// PURCHASE 20 (effect +20) →  REVERSAL -20
/// ```
pub fn reversal_quantity(original: &LedgerEntry) -> CoreResult<i64> {
    if !original.transaction_type.is_reversible() {
        return Err(CoreError::UnsupportedReversal {
            transaction_id: original.id.clone(),
            transaction_type: original.transaction_type.to_string(),
        });
    }
    Ok(-original.stock_effect())
}

/// `quantity × unit_price`, computed here and never taken from the caller.
///
/// Fails with `OutOfRange` when the product does not fit in cents.
pub fn transaction_total(quantity: i64, unit_price: Money) -> Result<Money, ValidationError> {
    unit_price
        .checked_multiply_quantity(quantity)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "total_amount".to_string(),
            min: i64::MIN,
            max: i64::MAX,
        })
}

// =============================================================================
// Quantity Rules
// =============================================================================

/// Checks the quantity of a new entry against its type.
///
/// SALE and PURCHASE need a positive quantity, ADJUSTMENT a non-zero one.
/// REVERSAL quantities are derived from the original and VOID carries none.
/// No entry may exceed [`MAX_ENTRY_QUANTITY`] in either direction.
pub fn validate_entry_quantity(
    transaction_type: TransactionType,
    quantity: i64,
) -> Result<(), ValidationError> {
    if !(-MAX_ENTRY_QUANTITY..=MAX_ENTRY_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_ENTRY_QUANTITY,
            max: MAX_ENTRY_QUANTITY,
        });
    }
    match transaction_type {
        TransactionType::Sale | TransactionType::Purchase if quantity <= 0 => {
            Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            })
        }
        TransactionType::Adjustment | TransactionType::Reversal if quantity == 0 => {
            Err(ValidationError::MustBeNonZero {
                field: "quantity".to_string(),
            })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Business Dates
// =============================================================================

/// Resolves the business date of a new entry.
///
/// `None` (or blank) means `now`. Otherwise accepts RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` (taken as UTC) or `YYYY-MM-DD` (midnight UTC).
/// Anything else fails with `InvalidDate`.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use clinic_core::ledger::parse_transaction_date;
///
/// let now = Utc::now();
/// assert_eq!(parse_transaction_date(None, now).unwrap(), now);
/// assert!(parse_transaction_date(Some("2024-03-08 17:30:00"), now).is_ok());
/// assert!(parse_transaction_date(Some("last tuesday"), now).is_err());
/// ```
pub fn parse_transaction_date(input: Option<&str>, now: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    let raw = match input.map(str::trim) {
        None | Some("") => return Ok(now),
        Some(raw) => raw,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(CoreError::InvalidDate {
        value: raw.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
