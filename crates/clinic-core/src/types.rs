//! # Domain Types
//!
//! Core domain types used throughout the clinic ledger.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   LedgerEntry   │   │     Period      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  opening_stock  │◄──│  product_id     │──►│  status         │       │
//! │  │  (immutable)    │   │  type, quantity │   │  OPEN | CLOSED  │       │
//! │  │  current_stock  │   │  period_id?     │   └────────┬────────┘       │
//! │  │  (derived)      │   │  reference_id?  │            │                 │
//! │  └─────────────────┘   └─────────────────┘   ┌────────▼────────┐       │
//! │                                              │ PeriodStock-    │       │
//! │  ┌─────────────────┐   ┌─────────────────┐   │ Snapshot        │       │
//! │  │   DraftSale     │   │ StockAdjustment │   │ opening/closing │       │
//! │  │  + items        │   │ system/physical │   └─────────────────┘       │
//! │  │  (staging only) │   │ variance        │                              │
//! │  └─────────────────┘   └─────────────────┘   AuditEntry, Actor, Role   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity id is a UUID v4 string.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Transaction Type
// =============================================================================

/// The five kinds of ledger entry.
///
/// ## Stock Effect Table
/// ```text
/// ┌──────────────┬────────────────────────────────────────────┐
/// │ Type         │ Effect on stock                            │
/// ├──────────────┼────────────────────────────────────────────┤
/// │ PURCHASE     │ +quantity                                  │
/// │ SALE         │ -quantity  (checked against stock first)   │
/// │ ADJUSTMENT   │ +quantity  (quantity is signed)            │
/// │ REVERSAL     │ +quantity  (signed to cancel the original) │
/// │ VOID         │ 0          (marker only)                   │
/// └──────────────┴────────────────────────────────────────────┘
/// ```
///
/// [`TransactionType::stock_effect`] is the only place this table lives.
/// The projector, period close and the sale check all call it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Purchase,
    Sale,
    Adjustment,
    Reversal,
    Void,
}

impl TransactionType {
    /// All variants, in display order.
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Purchase,
        TransactionType::Sale,
        TransactionType::Adjustment,
        TransactionType::Reversal,
        TransactionType::Void,
    ];

    /// Signed change in stock caused by an entry of this type.
    ///
    /// ## Example
    /// ```rust
    /// use clinic_core::TransactionType;
    ///
    /// assert_eq!(TransactionType::Sale.stock_effect(5), -5);
    /// assert_eq!(TransactionType::Adjustment.stock_effect(-3), -3);
    /// assert_eq!(TransactionType::Void.stock_effect(7), 0);
    /// ```
    pub const fn stock_effect(&self, quantity: i64) -> i64 {
        match self {
            TransactionType::Purchase => quantity,
            TransactionType::Sale => -quantity,
            TransactionType::Adjustment => quantity,
            TransactionType::Reversal => quantity,
            TransactionType::Void => 0,
        }
    }

    /// Whether posting this type needs an OPEN period.
    ///
    /// REVERSAL is exempt so closed periods can still be corrected.
    pub const fn requires_open_period(&self) -> bool {
        !matches!(self, TransactionType::Reversal)
    }

    /// Only SALE and PURCHASE entries can be reversed.
    pub const fn is_reversible(&self) -> bool {
        matches!(self, TransactionType::Sale | TransactionType::Purchase)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Sale => "SALE",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::Reversal => "REVERSAL",
            TransactionType::Void => "VOID",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the wire form. Case-insensitive, surrounding whitespace ignored.
impl FromStr for TransactionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PURCHASE" => Ok(TransactionType::Purchase),
            "SALE" => Ok(TransactionType::Sale),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            "REVERSAL" => Ok(TransactionType::Reversal),
            "VOID" => Ok(TransactionType::Void),
            _ => Err(CoreError::InvalidTransactionType(s.to_string())),
        }
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

/// Ledger rows are committed on insert. There is no draft or pending
/// state at ledger level; staging happens in [`DraftSale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    #[default]
    Committed,
}

// =============================================================================
// Product
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

impl ProductStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

/// A stocked item.
///
/// `opening_stock` is fixed at creation. `current_stock` is written only by
/// the stock projector and always equals
/// `opening_stock + Σ stock_effect(committed entries)`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub selling_price: Money,
    pub cost_price: Money,
    /// Stock on the day the product entered the system. Never edited.
    pub opening_stock: i64,
    /// Derived from the ledger.
    pub current_stock: i64,
    pub reorder_level: i64,
    pub status: ProductStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub selling_price: Money,
    pub cost_price: Money,
    pub opening_stock: i64,
    pub reorder_level: Option<i64>,
}

/// Reorder level used when a new product does not specify one.
pub const DEFAULT_REORDER_LEVEL: i64 = 50;

// =============================================================================
// Ledger Entry
// =============================================================================

/// One row of the append-only transaction ledger.
///
/// Rows are never updated or deleted. Corrections are new rows of type
/// REVERSAL that point back through `reference_transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub transaction_type: TransactionType,
    pub product_id: String,
    /// Signed for ADJUSTMENT and REVERSAL; positive for SALE and PURCHASE.
    pub quantity: i64,
    pub unit_price: Money,
    /// Always `quantity × unit_price`.
    pub total_amount: Money,
    /// Business date. May be backdated.
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    /// Wall-clock insert time.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// `None` for a reversal posted while no period was open.
    pub period_id: Option<String>,
    pub created_by: String,
    pub status: TransactionStatus,
    pub reference_transaction_id: Option<String>,
    pub reversal_reason: Option<String>,
    pub notes: Option<String>,
}

impl LedgerEntry {
    /// Signed effect of this row on the product's stock.
    #[inline]
    pub fn stock_effect(&self) -> i64 {
        self.transaction_type.stock_effect(self.quantity)
    }

    /// Business date falls on a different calendar day than the insert.
    pub fn is_backdated(&self) -> bool {
        self.transaction_date.date_naive() != self.created_at.date_naive()
    }
}

/// Optional fields of a new ledger entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionOptions {
    /// Backdated business date. Defaults to now.
    pub transaction_date: Option<String>,
    pub reference_transaction_id: Option<String>,
    pub reversal_reason: Option<String>,
    pub notes: Option<String>,
}

/// Everything `create_transaction` needs apart from the actor.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub period_id: Option<String>,
    #[serde(default)]
    pub options: TransactionOptions,
}

impl NewTransaction {
    pub fn new(
        transaction_type: TransactionType,
        product_id: impl Into<String>,
        quantity: i64,
        unit_price: Money,
        period_id: Option<String>,
    ) -> Self {
        NewTransaction {
            transaction_type,
            product_id: product_id.into(),
            quantity,
            unit_price,
            period_id,
            options: TransactionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Filter for ledger history queries. Empty filter means "everything".
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionFilter {
    pub product_id: Option<String>,
    pub period_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub created_by: Option<String>,
    pub limit: Option<u32>,
}

// =============================================================================
// Period
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    Open,
    Closed,
}

/// An accounting period. OPEN → CLOSED exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Period {
    pub id: String,
    pub period_name: String,
    pub status: PeriodStatus,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    /// Defaults to the close date when left unset.
    #[ts(as = "Option<String>")]
    pub end_date: Option<NaiveDate>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub closed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Period {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    /// Whether `date` falls in `[start_date, end_date]`. An open-ended
    /// period covers every date from its start.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }
}

/// Per-period, per-product stock figures.
///
/// `closing_stock` stays `None` until the period is closed, then never
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PeriodStockSnapshot {
    pub id: String,
    pub period_id: String,
    pub product_id: String,
    pub opening_stock: i64,
    pub closing_stock: Option<i64>,
}

// =============================================================================
// Draft Sale
// =============================================================================

/// A cashier's cart. Does not touch stock until committed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DraftSale {
    pub id: String,
    /// Owner. Nobody else can see or touch the draft.
    pub user_id: String,
    pub total_amount: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DraftSaleItem {
    pub id: String,
    pub draft_sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A draft together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DraftSaleWithItems {
    #[serde(flatten)]
    pub draft: DraftSale,
    pub items: Vec<DraftSaleItem>,
}

// =============================================================================
// Stock Taking
// =============================================================================

/// Outcome of a physical count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum VarianceStatus {
    /// Count equals system stock.
    Match,
    /// More on the shelf than the system says.
    Surplus,
    /// Less on the shelf than the system says.
    Shortage,
}

impl VarianceStatus {
    pub fn from_variance(variance: i64) -> Self {
        match variance {
            0 => VarianceStatus::Match,
            v if v > 0 => VarianceStatus::Surplus,
            _ => VarianceStatus::Shortage,
        }
    }
}

/// A recorded physical count. Written for every count, including ones that
/// match.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub product_id: String,
    pub period_id: String,
    pub system_quantity: i64,
    pub physical_quantity: i64,
    /// `physical_quantity - system_quantity`.
    pub variance: i64,
    /// The ADJUSTMENT entry, when the variance was non-zero.
    pub adjustment_transaction_id: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn variance_status(&self) -> VarianceStatus {
        VarianceStatus::from_variance(self.variance)
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateTransaction,
    CreateProduct,
    ActivateProduct,
    DeactivateProduct,
    CreatePeriod,
    ClosePeriod,
    CreateDraftSale,
    AddDraftItem,
    RemoveDraftItem,
    CommitSale,
    ReverseSale,
    ReversePurchase,
    RecordPhysicalCount,
    RecordPurchase,
    RecalculateStock,
}

impl AuditAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateTransaction => "CREATE_TRANSACTION",
            AuditAction::CreateProduct => "CREATE_PRODUCT",
            AuditAction::ActivateProduct => "ACTIVATE_PRODUCT",
            AuditAction::DeactivateProduct => "DEACTIVATE_PRODUCT",
            AuditAction::CreatePeriod => "CREATE_PERIOD",
            AuditAction::ClosePeriod => "CLOSE_PERIOD",
            AuditAction::CreateDraftSale => "CREATE_DRAFT_SALE",
            AuditAction::AddDraftItem => "ADD_DRAFT_ITEM",
            AuditAction::RemoveDraftItem => "REMOVE_DRAFT_ITEM",
            AuditAction::CommitSale => "COMMIT_SALE",
            AuditAction::ReverseSale => "REVERSE_SALE",
            AuditAction::ReversePurchase => "REVERSE_PURCHASE",
            AuditAction::RecordPhysicalCount => "RECORD_PHYSICAL_COUNT",
            AuditAction::RecordPurchase => "RECORD_PURCHASE",
            AuditAction::RecalculateStock => "RECALCULATE_STOCK",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit-log row. Old and new values are JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Actor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Cashier,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
        }
    }
}

/// The authenticated caller of a ledger operation.
///
/// Supplied by the routing layer and passed explicitly into every
/// operation; it becomes `created_by` / `recorded_by` / the audit user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn cashier(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role: Role::Cashier,
        }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns the user id, or `Unauthenticated` when it is blank.
    pub fn require_authenticated(&self) -> CoreResult<&str> {
        let id = self.user_id.trim();
        if id.is_empty() {
            return Err(CoreError::Unauthenticated);
        }
        Ok(id)
    }

    /// Authenticated and admin, or the matching error.
    pub fn require_admin(&self, action: &str) -> CoreResult<&str> {
        let id = self.require_authenticated()?;
        if !self.is_admin() {
            return Err(CoreError::Forbidden {
                action: action.to_string(),
                role: self.role.as_str().to_string(),
            });
        }
        Ok(id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
