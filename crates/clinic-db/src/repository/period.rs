//! # Period Repository
//!
//! SQL for `periods` and `period_product_stock`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use clinic_core::period::SnapshotLine;
use clinic_core::{Period, PeriodStockSnapshot};

const PERIOD_COLUMNS: &str = r#"
    id, period_name, status, start_date, end_date,
    created_by, created_at, closed_by, closed_at
"#;

// =============================================================================
// Periods
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Period>> {
    let period = sqlx::query_as::<_, Period>(&format!(
        "SELECT {} FROM periods WHERE id = ?1",
        PERIOD_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(period)
}

/// The OPEN period, if there is one. The unique index guarantees at most
/// one row.
pub async fn fetch_open(conn: &mut SqliteConnection) -> DbResult<Option<Period>> {
    let period = sqlx::query_as::<_, Period>(&format!(
        "SELECT {} FROM periods WHERE status = 'OPEN' LIMIT 1",
        PERIOD_COLUMNS
    ))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(period)
}

/// The most recently closed period.
pub async fn fetch_last_closed(conn: &mut SqliteConnection) -> DbResult<Option<Period>> {
    let period = sqlx::query_as::<_, Period>(&format!(
        r#"
        SELECT {} FROM periods
        WHERE status = 'CLOSED'
        ORDER BY closed_at DESC, rowid DESC
        LIMIT 1
        "#,
        PERIOD_COLUMNS
    ))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(period)
}

/// The latest-starting period whose `[start_date, end_date]` contains
/// `date`. Open-ended periods contain every date from their start.
pub async fn fetch_containing(
    conn: &mut SqliteConnection,
    date: NaiveDate,
) -> DbResult<Option<Period>> {
    let period = sqlx::query_as::<_, Period>(&format!(
        r#"
        SELECT {} FROM periods
        WHERE start_date <= ?1 AND (end_date IS NULL OR end_date >= ?1)
        ORDER BY start_date DESC, rowid DESC
        LIMIT 1
        "#,
        PERIOD_COLUMNS
    ))
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(period)
}

/// All periods, newest first.
pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Period>> {
    let periods = sqlx::query_as::<_, Period>(&format!(
        "SELECT {} FROM periods ORDER BY start_date DESC, rowid DESC",
        PERIOD_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(periods)
}

pub async fn insert(conn: &mut SqliteConnection, period: &Period) -> DbResult<()> {
    debug!(id = %period.id, name = %period.period_name, "Inserting period");

    sqlx::query(
        r#"
        INSERT INTO periods (
            id, period_name, status, start_date, end_date,
            created_by, created_at, closed_by, closed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&period.id)
    .bind(&period.period_name)
    .bind(period.status)
    .bind(period.start_date)
    .bind(period.end_date)
    .bind(&period.created_by)
    .bind(period.created_at)
    .bind(&period.closed_by)
    .bind(period.closed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flips an OPEN period to CLOSED.
///
/// Guarded by `status = 'OPEN'`: a row that is not OPEN is left alone and
/// the call returns `DbError::NotFound`. `PeriodService::close_period`
/// rejects a CLOSED period with `PeriodAlreadyClosed` before reaching here.
pub async fn mark_closed(
    conn: &mut SqliteConnection,
    id: &str,
    closed_by: &str,
    closed_at: DateTime<Utc>,
    end_date: NaiveDate,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE periods
        SET status = 'CLOSED', closed_by = ?2, closed_at = ?3, end_date = ?4
        WHERE id = ?1 AND status = 'OPEN'
        "#,
    )
    .bind(id)
    .bind(closed_by)
    .bind(closed_at)
    .bind(end_date)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Open period", id));
    }

    Ok(())
}

// =============================================================================
// Snapshots
// =============================================================================

/// Inserts an opening snapshot row. `closing_stock` starts NULL.
pub async fn insert_snapshot(
    conn: &mut SqliteConnection,
    period_id: &str,
    product_id: &str,
    opening_stock: i64,
) -> DbResult<PeriodStockSnapshot> {
    let snapshot = PeriodStockSnapshot {
        id: Uuid::new_v4().to_string(),
        period_id: period_id.to_string(),
        product_id: product_id.to_string(),
        opening_stock,
        closing_stock: None,
    };

    sqlx::query(
        r#"
        INSERT INTO period_product_stock (
            id, period_id, product_id, opening_stock, closing_stock, created_at
        ) VALUES (?1, ?2, ?3, ?4, NULL, ?5)
        "#,
    )
    .bind(&snapshot.id)
    .bind(&snapshot.period_id)
    .bind(&snapshot.product_id)
    .bind(snapshot.opening_stock)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(snapshot)
}

pub async fn fetch_snapshot(
    conn: &mut SqliteConnection,
    period_id: &str,
    product_id: &str,
) -> DbResult<Option<PeriodStockSnapshot>> {
    let snapshot = sqlx::query_as::<_, PeriodStockSnapshot>(
        r#"
        SELECT id, period_id, product_id, opening_stock, closing_stock
        FROM period_product_stock
        WHERE period_id = ?1 AND product_id = ?2
        "#,
    )
    .bind(period_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(snapshot)
}

pub async fn snapshots(
    conn: &mut SqliteConnection,
    period_id: &str,
) -> DbResult<Vec<PeriodStockSnapshot>> {
    let rows = sqlx::query_as::<_, PeriodStockSnapshot>(
        r#"
        SELECT id, period_id, product_id, opening_stock, closing_stock
        FROM period_product_stock
        WHERE period_id = ?1
        "#,
    )
    .bind(period_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Snapshot rows joined with product names, ordered by name.
pub async fn snapshot_lines(
    conn: &mut SqliteConnection,
    period_id: &str,
) -> DbResult<Vec<SnapshotLine>> {
    let rows = sqlx::query_as::<_, SnapshotLine>(
        r#"
        SELECT s.product_id, p.name AS product_name, s.opening_stock, s.closing_stock
        FROM period_product_stock s
        INNER JOIN products p ON p.id = s.product_id
        WHERE s.period_id = ?1
        ORDER BY p.name ASC
        "#,
    )
    .bind(period_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Writes the frozen closing stock. Refuses rows already frozen.
pub async fn freeze_snapshot(
    conn: &mut SqliteConnection,
    snapshot_id: &str,
    closing_stock: i64,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE period_product_stock
        SET closing_stock = ?2
        WHERE id = ?1 AND closing_stock IS NULL
        "#,
    )
    .bind(snapshot_id)
    .bind(closing_stock)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Unfrozen snapshot", snapshot_id));
    }

    Ok(())
}
