//! # Draft Sale Rules
//!
//! Line totals, the draft total and the limits checked before an item is
//! added or a draft is committed.
//!
//! ```text
//! addItem ──► check_item ──► line_total ──► insert ──► draft_total
//!                                                         │
//! removeItem ─────────────────────────────► delete ──────►┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::DraftSaleItem;
use crate::validation::validate_non_negative_price;
use crate::{MAX_DRAFT_ITEMS, MAX_ENTRY_QUANTITY};

/// `quantity × unit_price` for one draft line.
#[inline]
pub fn line_total(quantity: i64, unit_price: Money) -> Money {
    unit_price.multiply_quantity(quantity)
}

/// Sum of every line total in the draft.
pub fn draft_total(items: &[DraftSaleItem]) -> Money {
    items.iter().map(|i| i.line_total).sum()
}

/// Validates a line before it is added.
///
/// ## Rules
/// - 0 < quantity ≤ [`MAX_ENTRY_QUANTITY`]
/// - 0 ≤ unit price ≤ [`MAX_PRICE_CENTS`]
/// - fewer than [`MAX_DRAFT_ITEMS`] lines already present
pub fn check_item(quantity: i64, unit_price: Money, existing_items: usize) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if quantity > MAX_ENTRY_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ENTRY_QUANTITY,
        }
        .into());
    }
    validate_non_negative_price("unit_price", unit_price)?;
    if existing_items >= MAX_DRAFT_ITEMS {
        return Err(CoreError::DraftTooLarge {
            max: MAX_DRAFT_ITEMS,
        });
    }
    Ok(())
}

/// `EmptyDraft` when there is nothing to commit.
pub fn ensure_committable(draft_id: &str, items: &[DraftSaleItem]) -> CoreResult<()> {
    if items.is_empty() {
        return Err(CoreError::EmptyDraft(draft_id.to_string()));
    }
    Ok(())
}
