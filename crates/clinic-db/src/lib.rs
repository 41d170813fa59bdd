//! # clinic-db: Ledger Store and Services
//!
//! SQLite persistence for the clinic ledger and every operation that
//! changes it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Clinic Ledger Data Flow                          │
//! │                                                                         │
//! │  Routing layer (Actor + request)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    clinic-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │   Services    │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ ledger        │    │  (embedded)  │  │   │
//! │  │   │               │    │ periods       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ drafts        │    │ 001_ledger_  │  │   │
//! │  │   │ begin_write() │    │ reversals ... │    │  schema.sql  │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ SQL via                        │   │
//! │  │                        ┌───────▼───────┐                        │   │
//! │  │                        │ Repositories  │                        │   │
//! │  │                        └───────────────┘                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  api::respond() → { success, message, data } / ApiError + HTTP status  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, configuration, write lock
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - `DbError` and the `LedgerError` every service returns
//! - [`repository`] - SQL, one module per table group
//! - [`service`] - Units of work: ledger, periods, drafts, reversals,
//!   stock taking, purchases, products
//! - [`api`] - Error codes and the response envelope for the routing layer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clinic_core::{Actor, Money, TransactionOptions};
//! use clinic_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::from_env()).await?;
//! let cashier = Actor::cashier(user_id);
//!
//! let draft = db.drafts().create(&cashier).await?;
//! db.drafts().add_item(&cashier, &draft.id, &product_id, 2, Money::from_cents(450)).await?;
//! let sale_ids = db
//!     .drafts()
//!     .commit(&cashier, &draft.id, &period_id, TransactionOptions::default())
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{respond, ApiError, ApiResponse, ErrorCode};
pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};

// Service re-exports for convenience
pub use repository::audit::AuditRepository;
pub use service::draft::DraftService;
pub use service::ledger::{LedgerService, StockDrift};
pub use service::period::PeriodService;
pub use service::product::ProductService;
pub use service::purchase::PurchaseService;
pub use service::reversal::ReversalService;
pub use service::stock_take::{CountResult, StockTakeService};
