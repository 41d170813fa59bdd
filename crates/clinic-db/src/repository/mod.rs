//! # Repository Module
//!
//! SQL for every table, isolated in one place.
//!
//! ## Connection-Scoped Functions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service (unit of work)                                                │
//! │       │                                                                 │
//! │       │  let mut tx = begin_write(&pool).await?;                       │
//! │       │                                                                 │
//! │       ├── product::fetch(&mut tx, id)                                  │
//! │       ├── transaction::insert(&mut tx, &entry)                         │
//! │       ├── product::set_current_stock(&mut tx, id, stock)               │
//! │       └── audit::record(&mut tx, ...)   (savepoint, best effort)       │
//! │       │                                                                 │
//! │       │  tx.commit().await?;                                           │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Repository functions take `&mut SqliteConnection`, so the same SQL    │
//! │  runs inside a write transaction or on a plain pooled connection.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tables
//!
//! - [`product`] - `products`
//! - [`transaction`] - `transactions` (insert and read only)
//! - [`period`] - `periods`, `period_product_stock`
//! - [`draft`] - `draft_sales`, `draft_sale_items`
//! - [`stock_take`] - `stock_adjustments`
//! - [`audit`] - `audit_logs`, plus [`AuditRepository`](audit::AuditRepository)

pub mod audit;
pub mod draft;
pub mod period;
pub mod product;
pub mod stock_take;
pub mod transaction;
