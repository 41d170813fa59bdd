//! # Period Reconciliation
//!
//! Math behind period close and the period summary.
//!
//! ## Reconciliation per Product
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  opening_stock (snapshot)                                               │
//! │    + purchased                                                          │
//! │    - sold                                                               │
//! │    + adjusted          (signed)                                         │
//! │    + reversed          (signed)                                         │
//! │  ───────────────────                                                    │
//! │  = calculated_closing                                                   │
//! │                                                                         │
//! │  variance = frozen closing_stock - calculated_closing                   │
//! │  (zero for a healthy closed period, None while OPEN)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Opening Stock of a New Period
//! ```text
//! prior CLOSED period's closing_stock         (or product.opening_stock)
//!   + effects of period-less entries posted after that close
//! ```
//! Period-less entries are reversals posted while no period was open.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ledger::{net_effect, project_stock, StockMovement};
use crate::money::Money;
use crate::types::{Period, TransactionType};

// =============================================================================
// Row Shapes
// =============================================================================

/// A period ledger row reduced to what reconciliation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PeriodLine {
    pub product_id: String,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub total_amount: Money,
}

impl PeriodLine {
    #[inline]
    pub fn movement(&self) -> StockMovement {
        StockMovement::new(self.transaction_type, self.quantity)
    }
}

/// A snapshot row joined with the product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SnapshotLine {
    pub product_id: String,
    pub product_name: String,
    pub opening_stock: i64,
    pub closing_stock: Option<i64>,
}

// =============================================================================
// Closing & Opening
// =============================================================================

/// Closing stock frozen at close.
#[inline]
pub fn closing_stock(opening_stock: i64, movements: &[StockMovement]) -> i64 {
    project_stock(opening_stock, movements)
}

/// Opening stock for a product in a newly created period.
///
/// ## Arguments
/// * `prior_closing` - The product's frozen closing stock in the most
///   recently closed period, if it had a row there
/// * `product_opening` - The product's immutable opening stock
/// * `carried` - Period-less movements that the prior closing does not
///   include (all of them when there is no prior row)
pub fn carried_opening_stock(
    prior_closing: Option<i64>,
    product_opening: i64,
    carried: &[StockMovement],
) -> i64 {
    prior_closing.unwrap_or(product_opening) + net_effect(carried)
}

// =============================================================================
// Summary Types
// =============================================================================

/// Count and sums of one transaction type within a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionTotals {
    pub transaction_type: TransactionType,
    pub count: i64,
    pub total_quantity: i64,
    pub total_amount: Money,
}

/// Opening → closing walk for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductMovement {
    pub product_id: String,
    pub product_name: String,
    pub opening_stock: i64,
    pub purchased: i64,
    pub sold: i64,
    /// Net signed adjustments.
    pub adjusted: i64,
    /// Net signed reversals.
    pub reversed: i64,
    pub calculated_closing: i64,
    /// Frozen at close; `None` while the period is open.
    pub frozen_closing: Option<i64>,
    /// `frozen_closing - calculated_closing`.
    pub variance: Option<i64>,
}

impl ProductMovement {
    /// Builds the walk for one product from its period lines.
    pub fn reconcile(snapshot: &SnapshotLine, lines: &[&PeriodLine]) -> Self {
        let mut purchased = 0;
        let mut sold = 0;
        let mut adjusted = 0;
        let mut reversed = 0;

        for line in lines {
            match line.transaction_type {
                TransactionType::Purchase => purchased += line.quantity,
                TransactionType::Sale => sold += line.quantity,
                TransactionType::Adjustment => adjusted += line.quantity,
                TransactionType::Reversal => reversed += line.quantity,
                TransactionType::Void => {}
            }
        }

        let movements: Vec<StockMovement> = lines.iter().map(|l| l.movement()).collect();
        let calculated_closing = closing_stock(snapshot.opening_stock, &movements);

        ProductMovement {
            product_id: snapshot.product_id.clone(),
            product_name: snapshot.product_name.clone(),
            opening_stock: snapshot.opening_stock,
            purchased,
            sold,
            adjusted,
            reversed,
            calculated_closing,
            frozen_closing: snapshot.closing_stock,
            variance: snapshot.closing_stock.map(|c| c - calculated_closing),
        }
    }
}

/// Read-only aggregate for pre-close preview and post-close reporting.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodSummary {
    pub period: Period,
    pub transaction_count: i64,
    pub totals: Vec<TransactionTotals>,
    pub products: Vec<ProductMovement>,
}

impl PeriodSummary {
    /// Sum of SALE amounts.
    pub fn sales_amount(&self) -> Money {
        self.totals
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Sale)
            .map(|t| t.total_amount)
            .sum()
    }

    /// Products whose frozen closing disagrees with the ledger.
    pub fn discrepancies(&self) -> impl Iterator<Item = &ProductMovement> {
        self.products
            .iter()
            .filter(|p| p.variance.map_or(false, |v| v != 0))
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Groups lines by type, in [`TransactionType::ALL`] order. Types with no
/// lines are omitted.
pub fn totals_by_type(lines: &[PeriodLine]) -> Vec<TransactionTotals> {
    TransactionType::ALL
        .iter()
        .filter_map(|ty| {
            let of_type: Vec<&PeriodLine> =
                lines.iter().filter(|l| l.transaction_type == *ty).collect();
            if of_type.is_empty() {
                return None;
            }
            Some(TransactionTotals {
                transaction_type: *ty,
                count: of_type.len() as i64,
                total_quantity: of_type.iter().map(|l| l.quantity).sum(),
                total_amount: of_type.iter().map(|l| l.total_amount).sum(),
            })
        })
        .collect()
}

/// Builds the full summary of a period.
///
/// Lines for products without a snapshot row are still reconciled, from an
/// opening of zero, so nothing posted in the period goes unreported.
pub fn summarize(period: Period, snapshots: &[SnapshotLine], lines: &[PeriodLine]) -> PeriodSummary {
    let mut by_product: BTreeMap<&str, Vec<&PeriodLine>> = BTreeMap::new();
    for line in lines {
        by_product.entry(line.product_id.as_str()).or_default().push(line);
    }

    let mut products: Vec<ProductMovement> = snapshots
        .iter()
        .map(|s| {
            let rows = by_product.remove(s.product_id.as_str()).unwrap_or_default();
            ProductMovement::reconcile(s, &rows)
        })
        .collect();

    for (product_id, rows) in by_product {
        let orphan = SnapshotLine {
            product_id: product_id.to_string(),
            product_name: product_id.to_string(),
            opening_stock: 0,
            closing_stock: None,
        };
        products.push(ProductMovement::reconcile(&orphan, &rows));
    }

    PeriodSummary {
        period,
        transaction_count: lines.len() as i64,
        totals: totals_by_type(lines),
        products,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
