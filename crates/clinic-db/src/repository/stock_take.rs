//! # Stock Adjustment Repository
//!
//! SQL for `stock_adjustments`, the record of every physical count.

use sqlx::SqliteConnection;

use crate::error::DbResult;
use clinic_core::StockAdjustment;

const ADJUSTMENT_COLUMNS: &str = r#"
    id, product_id, period_id, system_quantity, physical_quantity, variance,
    adjustment_transaction_id, notes, recorded_by, created_at
"#;

pub async fn insert(conn: &mut SqliteConnection, adjustment: &StockAdjustment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_adjustments (
            id, product_id, period_id, system_quantity, physical_quantity, variance,
            adjustment_transaction_id, notes, recorded_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&adjustment.id)
    .bind(&adjustment.product_id)
    .bind(&adjustment.period_id)
    .bind(adjustment.system_quantity)
    .bind(adjustment.physical_quantity)
    .bind(adjustment.variance)
    .bind(&adjustment.adjustment_transaction_id)
    .bind(&adjustment.notes)
    .bind(&adjustment.recorded_by)
    .bind(adjustment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Counts, newest first, optionally limited to one period.
pub async fn list(
    conn: &mut SqliteConnection,
    period_id: Option<&str>,
) -> DbResult<Vec<StockAdjustment>> {
    let rows = match period_id {
        Some(period_id) => {
            sqlx::query_as::<_, StockAdjustment>(&format!(
                "SELECT {} FROM stock_adjustments WHERE period_id = ?1 ORDER BY created_at DESC, rowid DESC",
                ADJUSTMENT_COLUMNS
            ))
            .bind(period_id)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, StockAdjustment>(&format!(
                "SELECT {} FROM stock_adjustments ORDER BY created_at DESC, rowid DESC",
                ADJUSTMENT_COLUMNS
            ))
            .fetch_all(&mut *conn)
            .await?
        }
    };

    Ok(rows)
}

/// Counts of a period ordered by absolute variance, largest first.
pub async fn by_variance(
    conn: &mut SqliteConnection,
    period_id: &str,
) -> DbResult<Vec<StockAdjustment>> {
    let rows = sqlx::query_as::<_, StockAdjustment>(&format!(
        "SELECT {} FROM stock_adjustments WHERE period_id = ?1 ORDER BY ABS(variance) DESC, created_at DESC",
        ADJUSTMENT_COLUMNS
    ))
    .bind(period_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}
