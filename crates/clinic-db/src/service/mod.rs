//! # Ledger Services
//!
//! Units of work over the repositories. Every write operation:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  begin_write()            write lock taken by the first statement       │
//! │    ├── actor + input checks                                             │
//! │    ├── repository reads / appends                                       │
//! │    ├── stock projector     (current_stock recomputed from the ledger)   │
//! │    ├── audit               (savepoint, best effort)                     │
//! │    └── COMMIT              any `?` before this rolls everything back    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A service never acquires a second pool connection while it holds a
//! write transaction; everything inside the unit of work goes through the
//! transaction's own connection.

pub mod draft;
pub mod ledger;
pub mod period;
pub mod product;
pub mod purchase;
pub mod reversal;
pub mod stock_take;
