//! # clinic-core: Pure Bookkeeping Logic for the Clinic Ledger
//!
//! This crate holds the rules of the inventory ledger as pure functions.
//! Nothing in here performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Clinic Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Routing layer (HTTP, auth) - outside this workspace    │   │
//! │  │    supplies Actor + request body, maps errors to ApiResponse    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  clinic-db (units of work)                      │   │
//! │  │   ledger · periods · drafts · reversals · stock taking · audit  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ clinic-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  types   │ │  ledger  │ │  period  │ │ money/validation │  │   │
//! │  │   │ Product  │ │ sign tbl │ │ summary  │ │ Money, checks    │  │   │
//! │  │   │ Entry    │ │ fold     │ │ closing  │ │                  │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, LedgerEntry, Period, DraftSale, ...)
//! - [`ledger`] - The type → stock-effect table and the stock fold
//! - [`period`] - Period reconciliation (closing stock, summaries)
//! - [`draft`] - Draft sale totals and item limits
//! - [`money`] - Integer-cent money
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example
//!
//! ```rust
//! use clinic_core::ledger::{project_stock, StockMovement};
//! use clinic_core::TransactionType;
//!
//! let movements = [
//!     StockMovement::new(TransactionType::Purchase, 50),
//!     StockMovement::new(TransactionType::Sale, 30),
//!     StockMovement::new(TransactionType::Adjustment, -5),
//! ];
//! assert_eq!(project_stock(100, &movements), 115);
//! ```

pub mod draft;
pub mod error;
pub mod ledger;
pub mod money;
pub mod period;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single draft sale.
pub const MAX_DRAFT_ITEMS: usize = 100;

/// Upper bound on rows returned by ledger history queries.
pub const MAX_HISTORY_ROWS: u32 = 1000;

/// Largest quantity (in either direction) a single entry, draft line or
/// stock figure may carry.
pub const MAX_ENTRY_QUANTITY: i64 = 1_000_000;

/// Largest unit price, in cents, accepted anywhere.
///
/// `MAX_ENTRY_QUANTITY × MAX_PRICE_CENTS` stays inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;
