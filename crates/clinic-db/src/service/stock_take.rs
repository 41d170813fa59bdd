//! # Stock Taking
//!
//! Physical counts. Every count is recorded, matching or not; a non-zero
//! variance also posts one ADJUSTMENT so that derived stock equals the
//! counted figure afterwards.
//!
//! ```text
//! system 120, counted 115  →  variance -5  SHORTAGE  →  ADJUSTMENT -5
//! system 120, counted 120  →  variance  0  MATCH     →  (no ledger row)
//! system 120, counted 124  →  variance +4  SURPLUS   →  ADJUSTMENT +4
//! ```

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::{period as period_repo, product as product_repo, stock_take as count_repo};
use crate::service::ledger::{post, recalculate_in};
use clinic_core::validation::validate_physical_count;
use clinic_core::{
    Actor, AuditAction, CoreError, NewTransaction, StockAdjustment, TransactionOptions,
    TransactionType, VarianceStatus,
};

/// A recorded count with its classification.
#[derive(Debug, Clone, Serialize)]
pub struct CountResult {
    #[serde(flatten)]
    pub adjustment: StockAdjustment,
    pub variance_status: VarianceStatus,
}

impl From<StockAdjustment> for CountResult {
    fn from(adjustment: StockAdjustment) -> Self {
        CountResult {
            variance_status: adjustment.variance_status(),
            adjustment,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockTakeService {
    pool: SqlitePool,
}

impl StockTakeService {
    pub fn new(pool: SqlitePool) -> Self {
        StockTakeService { pool }
    }

    /// Records a physical count of one product in an OPEN period. Admin only.
    pub async fn record_physical_count(
        &self,
        actor: &Actor,
        product_id: &str,
        physical_count: i64,
        period_id: &str,
        notes: Option<String>,
    ) -> LedgerResult<CountResult> {
        let user_id = actor.require_admin("record physical counts")?.to_string();
        validate_physical_count(physical_count)?;

        let mut tx = begin_write(&self.pool).await?;

        let period = period_repo::fetch(&mut tx, period_id)
            .await?
            .ok_or_else(|| CoreError::PeriodNotFound(period_id.to_string()))?;
        if !period.is_open() {
            return Err(CoreError::PeriodClosed(period.period_name).into());
        }
        let product = product_repo::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let system_quantity = recalculate_in(&mut tx, product_id).await?;
        let variance = physical_count - system_quantity;

        let adjustment_transaction_id = if variance != 0 {
            let adjustment = NewTransaction::new(
                TransactionType::Adjustment,
                product_id,
                variance,
                product.cost_price,
                Some(period.id.clone()),
            )
            .with_options(TransactionOptions {
                notes: Some(format!(
                    "Physical count: system {}, counted {}",
                    system_quantity, physical_count
                )),
                ..Default::default()
            });
            Some(post(&mut tx, actor, adjustment).await?.id)
        } else {
            None
        };

        let record = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            period_id: period.id.clone(),
            system_quantity,
            physical_quantity: physical_count,
            variance,
            adjustment_transaction_id,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            recorded_by: user_id.clone(),
            created_at: Utc::now(),
        };
        count_repo::insert(&mut tx, &record).await?;

        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::RecordPhysicalCount, "stock_adjustment", &record.id)
                .new_value(&record),
        )
        .await;
        tx.commit().await?;

        let result = CountResult::from(record);
        info!(
            product_id = %product.id,
            system = system_quantity,
            counted = physical_count,
            status = ?result.variance_status,
            "Physical count recorded"
        );
        Ok(result)
    }

    /// Counts, newest first, optionally for one period.
    pub async fn list_adjustments(&self, period_id: Option<&str>) -> LedgerResult<Vec<CountResult>> {
        let mut conn = self.pool.acquire().await?;
        let rows = count_repo::list(&mut conn, period_id).await?;
        Ok(rows.into_iter().map(CountResult::from).collect())
    }

    /// A period's counts, largest absolute variance first.
    pub async fn period_variance_report(&self, period_id: &str) -> LedgerResult<Vec<CountResult>> {
        let mut conn = self.pool.acquire().await?;
        if period_repo::fetch(&mut conn, period_id).await?.is_none() {
            return Err(CoreError::PeriodNotFound(period_id.to_string()).into());
        }
        let rows = count_repo::by_variance(&mut conn, period_id).await?;
        Ok(rows.into_iter().map(CountResult::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::test_support::{admin, cashier, memory_db, open_period, product};

    #[tokio::test]
    async fn test_shortage_posts_signed_adjustment() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 120).await;
        let period = open_period(&db, "March").await;

        let count = db
            .stock_take()
            .record_physical_count(&admin(), &p.id, 115, &period.id, Some("Shelf B".into()))
            .await
            .unwrap();

        assert_eq!(count.adjustment.system_quantity, 120);
        assert_eq!(count.adjustment.variance, -5);
        assert_eq!(count.variance_status, VarianceStatus::Shortage);

        let tx_id = count.adjustment.adjustment_transaction_id.clone().unwrap();
        let entry = db.ledger().get_transaction(&tx_id).await.unwrap();
        assert_eq!(entry.transaction_type, TransactionType::Adjustment);
        assert_eq!(entry.quantity, -5);
        assert_eq!(entry.unit_price, p.cost_price);
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 115);
    }

    #[tokio::test]
    async fn test_match_and_surplus() {
        let db = memory_db().await;
        let p = product(&db, "Gauze", 40).await;
        let period = open_period(&db, "March").await;
        let stock_take = db.stock_take();

        let matched = stock_take.record_physical_count(&admin(), &p.id, 40, &period.id, None).await.unwrap();
        assert_eq!(matched.variance_status, VarianceStatus::Match);
        assert!(matched.adjustment.adjustment_transaction_id.is_none());

        let surplus = stock_take.record_physical_count(&admin(), &p.id, 44, &period.id, None).await.unwrap();
        assert_eq!(surplus.variance_status, VarianceStatus::Surplus);
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 44);

        let all = stock_take.list_adjustments(Some(&period.id)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].adjustment.id, surplus.adjustment.id, "newest first");
    }

    #[tokio::test]
    async fn test_count_rules() {
        let db = memory_db().await;
        let p = product(&db, "Gauze", 40).await;
        let period = open_period(&db, "March").await;
        let stock_take = db.stock_take();

        let err = stock_take
            .record_physical_count(&cashier("c-1"), &p.id, 39, &period.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Forbidden { .. })));

        let err = stock_take.record_physical_count(&admin(), &p.id, -1, &period.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));

        db.periods().close_period(&admin(), &period.id).await.unwrap();
        let err = stock_take.record_physical_count(&admin(), &p.id, 39, &period.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodClosed(_))));
        assert!(stock_take.list_adjustments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_variance_report_order() {
        let db = memory_db().await;
        let a = product(&db, "A", 100).await;
        let b = product(&db, "B", 100).await;
        let c = product(&db, "C", 100).await;
        let period = open_period(&db, "March").await;
        let stock_take = db.stock_take();

        stock_take.record_physical_count(&admin(), &a.id, 98, &period.id, None).await.unwrap();
        stock_take.record_physical_count(&admin(), &b.id, 110, &period.id, None).await.unwrap();
        stock_take.record_physical_count(&admin(), &c.id, 100, &period.id, None).await.unwrap();

        let report = stock_take.period_variance_report(&period.id).await.unwrap();
        let variances: Vec<i64> = report.iter().map(|r| r.adjustment.variance).collect();
        assert_eq!(variances, vec![10, -2, 0]);

        let err = stock_take.period_variance_report("missing").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodNotFound(_))));
    }
}
