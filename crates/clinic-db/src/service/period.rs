//! # Period Manager
//!
//! Opens and closes accounting periods and keeps their per-product stock
//! snapshots.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (none) ──create_period──► OPEN ──close_period──► CLOSED (terminal)     │
//! │                              │                                          │
//! │   create: one snapshot row per active product, opening =                │
//! │     last closed period's closing_stock                                  │
//! │     + period-less rows posted after that close                          │
//! │     (product without a prior row: derived from its whole ledger)        │
//! │                              │                                          │
//! │   close: rows added for active products missing one,                    │
//! │     closing_stock = opening + Σ effects of this period's rows,          │
//! │     frozen, then status flipped. One unit of work.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, LedgerResult};
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::{period as period_repo, product as product_repo, transaction as tx_repo};
use clinic_core::ledger::StockMovement;
use clinic_core::period::{carried_opening_stock, closing_stock, summarize, PeriodSummary};
use clinic_core::validation::{validate_period_name, validate_period_range};
use clinic_core::{
    Actor, AuditAction, CoreError, LedgerEntry, Period, PeriodStatus, Product, ProductStatus,
};

// =============================================================================
// Opening Stock
// =============================================================================

/// What the last close left behind, for computing new opening figures.
struct PriorClose {
    closed_at: Option<DateTime<Utc>>,
    closings: HashMap<String, i64>,
    periodless: Vec<LedgerEntry>,
}

impl PriorClose {
    async fn load(conn: &mut SqliteConnection) -> LedgerResult<Self> {
        let mut prior = PriorClose {
            closed_at: None,
            closings: HashMap::new(),
            periodless: tx_repo::periodless(conn).await?,
        };

        if let Some(last) = period_repo::fetch_last_closed(conn).await? {
            prior.closed_at = last.closed_at;
            prior.closings = period_repo::snapshots(conn, &last.id)
                .await?
                .into_iter()
                .filter_map(|s| s.closing_stock.map(|c| (s.product_id, c)))
                .collect();
        }

        Ok(prior)
    }

    /// Opening stock of `product` in a period that starts now.
    ///
    /// `current_period` is the period the row is for, whose own rows never
    /// count toward its opening.
    async fn opening_for(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
        current_period: &str,
    ) -> LedgerResult<i64> {
        match self.closings.get(&product.id) {
            Some(&closing) => {
                let carried: Vec<StockMovement> = self
                    .periodless
                    .iter()
                    .filter(|e| e.product_id == product.id)
                    .filter(|e| self.closed_at.map_or(true, |closed| e.created_at > closed))
                    .map(StockMovement::from)
                    .collect();
                Ok(carried_opening_stock(Some(closing), product.opening_stock, &carried))
            }
            None => {
                let history =
                    tx_repo::movements_outside_period(conn, &product.id, current_period).await?;
                Ok(carried_opening_stock(None, product.opening_stock, &history))
            }
        }
    }
}

/// One product's frozen figures at close.
#[derive(Debug, Clone, Serialize)]
struct FrozenStock {
    product_id: String,
    opening_stock: i64,
    closing_stock: i64,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct PeriodService {
    pool: SqlitePool,
}

impl PeriodService {
    pub fn new(pool: SqlitePool) -> Self {
        PeriodService { pool }
    }

    /// Opens a new period. Admin only.
    ///
    /// Fails with `PeriodAlreadyOpen` while another period is OPEN.
    pub async fn create_period(
        &self,
        actor: &Actor,
        period_name: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Period> {
        let user_id = actor.require_admin("create periods")?.to_string();
        validate_period_name(period_name)?;
        validate_period_range(start_date, end_date)?;

        let mut tx = begin_write(&self.pool).await?;

        if let Some(open) = period_repo::fetch_open(&mut tx).await? {
            warn!(open = %open.period_name, "Refused second open period");
            return Err(CoreError::PeriodAlreadyOpen {
                period_name: open.period_name,
            }
            .into());
        }

        let period = Period {
            id: Uuid::new_v4().to_string(),
            period_name: period_name.trim().to_string(),
            status: PeriodStatus::Open,
            start_date,
            end_date,
            created_by: user_id.clone(),
            created_at: Utc::now(),
            closed_by: None,
            closed_at: None,
        };

        match period_repo::insert(&mut tx, &period).await {
            Ok(()) => {}
            Err(DbError::UniqueViolation { .. }) => {
                return Err(CoreError::PeriodAlreadyOpen {
                    period_name: period.period_name,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        let prior = PriorClose::load(&mut tx).await?;
        let products = product_repo::list(&mut tx, Some(ProductStatus::Active)).await?;
        for product in &products {
            let opening = prior.opening_for(&mut tx, product, &period.id).await?;
            period_repo::insert_snapshot(&mut tx, &period.id, &product.id, opening).await?;
        }

        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::CreatePeriod, "period", &period.id)
                .new_value(&period),
        )
        .await;
        tx.commit().await?;

        info!(
            id = %period.id,
            name = %period.period_name,
            snapshots = products.len(),
            "Period opened"
        );
        Ok(period)
    }

    /// Freezes every snapshot of an OPEN period and closes it. Admin only.
    ///
    /// Snapshots and the status flip commit together or not at all. An
    /// unset `end_date` becomes the close date.
    pub async fn close_period(&self, actor: &Actor, period_id: &str) -> LedgerResult<Period> {
        let user_id = actor.require_admin("close periods")?.to_string();

        let mut tx = begin_write(&self.pool).await?;

        let period = period_repo::fetch(&mut tx, period_id)
            .await?
            .ok_or_else(|| CoreError::PeriodNotFound(period_id.to_string()))?;
        if !period.is_open() {
            return Err(CoreError::PeriodAlreadyClosed(period.period_name).into());
        }

        let existing = period_repo::snapshots(&mut tx, period_id).await?;
        let missing: Vec<Product> = product_repo::list(&mut tx, Some(ProductStatus::Active))
            .await?
            .into_iter()
            .filter(|p| !existing.iter().any(|s| s.product_id == p.id))
            .collect();

        if !missing.is_empty() {
            let prior = PriorClose::load(&mut tx).await?;
            for product in &missing {
                let opening = prior.opening_for(&mut tx, product, period_id).await?;
                period_repo::insert_snapshot(&mut tx, period_id, &product.id, opening).await?;
                debug!(product_id = %product.id, opening, "Added snapshot at close");
            }
        }

        let mut frozen = Vec::new();
        for snapshot in period_repo::snapshots(&mut tx, period_id).await? {
            let movements =
                tx_repo::movements_in_period(&mut tx, period_id, &snapshot.product_id).await?;
            let closing = closing_stock(snapshot.opening_stock, &movements);
            period_repo::freeze_snapshot(&mut tx, &snapshot.id, closing).await?;

            frozen.push(FrozenStock {
                product_id: snapshot.product_id,
                opening_stock: snapshot.opening_stock,
                closing_stock: closing,
            });
        }

        let closed_at = Utc::now();
        let end_date = period.end_date.unwrap_or_else(|| closed_at.date_naive());
        period_repo::mark_closed(&mut tx, period_id, &user_id, closed_at, end_date).await?;

        audit::record(
            &mut tx,
            AuditRecord::new(&user_id, AuditAction::ClosePeriod, "period", period_id)
                .old_value(&serde_json::json!({ "status": PeriodStatus::Open }))
                .new_value(&serde_json::json!({
                    "status": PeriodStatus::Closed,
                    "end_date": end_date,
                    "closing_stock": frozen,
                })),
        )
        .await;
        tx.commit().await?;

        info!(
            id = %period_id,
            name = %period.period_name,
            products = frozen.len(),
            "Period closed"
        );
        Ok(Period {
            status: PeriodStatus::Closed,
            end_date: Some(end_date),
            closed_by: Some(user_id),
            closed_at: Some(closed_at),
            ..period
        })
    }

    /// Counts and sums by type plus the opening → closing walk of every
    /// product. Works on OPEN periods (preview) and CLOSED ones.
    pub async fn get_period_summary(&self, period_id: &str) -> LedgerResult<PeriodSummary> {
        let mut conn = self.pool.acquire().await?;

        let period = period_repo::fetch(&mut conn, period_id)
            .await?
            .ok_or_else(|| CoreError::PeriodNotFound(period_id.to_string()))?;
        let snapshots = period_repo::snapshot_lines(&mut conn, period_id).await?;
        let lines = tx_repo::period_lines(&mut conn, period_id).await?;

        let summary = summarize(period, &snapshots, &lines);
        debug!(
            period_id = %period_id,
            transactions = summary.transaction_count,
            discrepancies = summary.discrepancies().count(),
            "Built period summary"
        );
        Ok(summary)
    }

    /// All periods, newest first.
    pub async fn list_periods(&self) -> LedgerResult<Vec<Period>> {
        let mut conn = self.pool.acquire().await?;
        Ok(period_repo::list(&mut conn).await?)
    }

    pub async fn get_period(&self, period_id: &str) -> LedgerResult<Period> {
        let mut conn = self.pool.acquire().await?;
        let period = period_repo::fetch(&mut conn, period_id)
            .await?
            .ok_or_else(|| CoreError::PeriodNotFound(period_id.to_string()))?;
        Ok(period)
    }

    /// The OPEN period, if any.
    pub async fn current_period(&self) -> LedgerResult<Option<Period>> {
        let mut conn = self.pool.acquire().await?;
        Ok(period_repo::fetch_open(&mut conn).await?)
    }

    /// A product's opening stock in a period. Without a snapshot row this
    /// is the product's own opening stock.
    pub async fn period_opening_stock(&self, product_id: &str, period_id: &str) -> LedgerResult<i64> {
        let mut conn = self.pool.acquire().await?;
        let product = product_repo::fetch(&mut conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let snapshot = period_repo::fetch_snapshot(&mut conn, period_id, product_id).await?;
        Ok(snapshot.map_or(product.opening_stock, |s| s.opening_stock))
    }

    /// A product's frozen closing stock, `None` until the period closes.
    pub async fn period_closing_stock(
        &self,
        product_id: &str,
        period_id: &str,
    ) -> LedgerResult<Option<i64>> {
        let mut conn = self.pool.acquire().await?;
        let snapshot = period_repo::fetch_snapshot(&mut conn, period_id, product_id).await?;
        Ok(snapshot.and_then(|s| s.closing_stock))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::test_support::{admin, cashier, memory_db, open_period, product};
    use clinic_core::{Money, NewTransaction, TransactionType};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_single_open_period() {
        let db = memory_db().await;
        let periods = db.periods();

        let march = periods.create_period(&admin(), "March", day("2024-03-01"), None).await.unwrap();
        assert!(march.is_open());

        let err = periods
            .create_period(&admin(), "April", day("2024-04-01"), None)
            .await
            .unwrap_err();
        match err {
            LedgerError::Core(CoreError::PeriodAlreadyOpen { period_name }) => {
                assert_eq!(period_name, "March")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        periods.close_period(&admin(), &march.id).await.unwrap();
        let april = periods.create_period(&admin(), "April", day("2024-04-01"), None).await.unwrap();
        assert_eq!(periods.current_period().await.unwrap().unwrap().id, april.id);
        assert_eq!(periods.list_periods().await.unwrap()[0].id, april.id);
    }

    #[tokio::test]
    async fn test_open_period_index_backs_up_the_check() {
        let db = memory_db().await;
        open_period(&db, "March").await;

        let second = sqlx::query(
            "INSERT INTO periods (id, period_name, status, start_date, created_by, created_at)
             VALUES ('x', 'Rogue', 'OPEN', '2024-04-01', 'admin-1', '2024-04-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let db = memory_db().await;
        let periods = db.periods();
        let period = open_period(&db, "March").await;

        let closed = periods.close_period(&admin(), &period.id).await.unwrap();
        assert_eq!(closed.status, PeriodStatus::Closed);
        assert_eq!(closed.closed_by.as_deref(), Some("admin-1"));
        assert_eq!(closed.end_date, Some(Utc::now().date_naive()));

        let err = periods.close_period(&admin(), &period.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodAlreadyClosed(_))));

        let err = periods.close_period(&admin(), "missing").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodNotFound(_))));

        let stored = periods.get_period(&period.id).await.unwrap();
        assert_eq!(stored.status, PeriodStatus::Closed);
        assert!(stored.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_explicit_end_date_is_kept() {
        let db = memory_db().await;
        let period = db
            .periods()
            .create_period(&admin(), "Q1", day("2024-01-01"), Some(day("2024-03-31")))
            .await
            .unwrap();
        let closed = db.periods().close_period(&admin(), &period.id).await.unwrap();
        assert_eq!(closed.end_date, Some(day("2024-03-31")));
    }

    #[tokio::test]
    async fn test_period_admin_only() {
        let db = memory_db().await;
        let err = db
            .periods()
            .create_period(&cashier("c-1"), "March", day("2024-03-01"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Forbidden { .. })));

        let period = open_period(&db, "March").await;
        let err = db.periods().close_period(&cashier("c-1"), &period.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Forbidden { .. })));
        assert!(db.periods().get_period(&period.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_closing_stock_frozen_and_carried() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let march = open_period(&db, "March").await;
        let price = Money::from_cents(120);

        for (ty, qty) in [
            (TransactionType::Purchase, 40),
            (TransactionType::Sale, 15),
            (TransactionType::Adjustment, -3),
        ] {
            db.ledger()
                .create_transaction(
                    &admin(),
                    NewTransaction::new(ty, &p.id, qty, price, Some(march.id.clone())),
                )
                .await
                .unwrap();
        }

        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), None);
        db.periods().close_period(&admin(), &march.id).await.unwrap();
        assert_eq!(db.periods().period_opening_stock(&p.id, &march.id).await.unwrap(), 100);
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(122));

        let april = open_period(&db, "April").await;
        assert_eq!(db.periods().period_opening_stock(&p.id, &april.id).await.unwrap(), 122);
    }

    #[tokio::test]
    async fn test_close_adds_missing_rows() {
        let db = memory_db().await;
        let p = product(&db, "Ibuprofen", 30).await;
        let march = open_period(&db, "March").await;

        // Reactivated after the period opened: no snapshot row yet
        db.products().set_status(&admin(), &p.id, ProductStatus::Inactive).await.unwrap();
        sqlx::query("DELETE FROM period_product_stock WHERE product_id = ?1")
            .bind(&p.id)
            .execute(db.pool())
            .await
            .unwrap();
        db.products().set_status(&admin(), &p.id, ProductStatus::Active).await.unwrap();

        db.periods().close_period(&admin(), &march.id).await.unwrap();
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(30));
    }

    #[tokio::test]
    async fn test_summary_reconciles() {
        let db = memory_db().await;
        let p = product(&db, "Amoxicillin", 50).await;
        let q = product(&db, "Bandage", 20).await;
        let period = open_period(&db, "March").await;
        let price = Money::from_cents(200);

        let post = |ty: TransactionType, id: &str, qty: i64| {
            NewTransaction::new(ty, id, qty, price, Some(period.id.clone()))
        };
        db.ledger().create_transaction(&admin(), post(TransactionType::Purchase, &p.id, 10)).await.unwrap();
        db.ledger().create_transaction(&cashier("c-1"), post(TransactionType::Sale, &p.id, 4)).await.unwrap();
        db.ledger().create_transaction(&cashier("c-1"), post(TransactionType::Sale, &q.id, 5)).await.unwrap();

        let preview = db.periods().get_period_summary(&period.id).await.unwrap();
        assert_eq!(preview.transaction_count, 3);
        assert_eq!(preview.sales_amount(), Money::from_cents(1800));
        let amox = preview.products.iter().find(|m| m.product_id == p.id).unwrap();
        assert_eq!(amox.purchased, 10);
        assert_eq!(amox.sold, 4);
        assert_eq!(amox.calculated_closing, 56);
        assert_eq!(amox.frozen_closing, None);

        db.periods().close_period(&admin(), &period.id).await.unwrap();
        let report = db.periods().get_period_summary(&period.id).await.unwrap();
        assert_eq!(report.discrepancies().count(), 0);
        let bandage = report.products.iter().find(|m| m.product_id == q.id).unwrap();
        assert_eq!(bandage.frozen_closing, Some(15));
        assert_eq!(bandage.variance, Some(0));
    }
}
