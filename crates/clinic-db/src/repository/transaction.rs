//! # Transaction Repository
//!
//! SQL for the append-only `transactions` table.
//!
//! ## Append-Only
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert()  ✅                                                           │
//! │  fetch / movements / history  ✅                                        │
//! │  UPDATE / DELETE  ❌  not exposed here, and refused by triggers         │
//! │                                                                         │
//! │  A correction is a new REVERSAL row pointing at the original.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use crate::error::DbResult;
use clinic_core::ledger::StockMovement;
use clinic_core::period::PeriodLine;
use clinic_core::validation::clamp_history_limit;
use clinic_core::{LedgerEntry, TransactionFilter};

const ENTRY_COLUMNS: &str = r#"
    id, transaction_type, product_id, quantity, unit_price, total_amount,
    transaction_date, created_at, period_id, created_by, status,
    reference_transaction_id, reversal_reason, notes
"#;

/// Appends one ledger row.
pub async fn insert(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<()> {
    debug!(
        id = %entry.id,
        transaction_type = %entry.transaction_type,
        product_id = %entry.product_id,
        quantity = entry.quantity,
        "Inserting ledger entry"
    );

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, transaction_type, product_id, quantity, unit_price, total_amount,
            transaction_date, created_at, period_id, created_by, status,
            reference_transaction_id, reversal_reason, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.transaction_type)
    .bind(&entry.product_id)
    .bind(entry.quantity)
    .bind(entry.unit_price)
    .bind(entry.total_amount)
    .bind(entry.transaction_date)
    .bind(entry.created_at)
    .bind(&entry.period_id)
    .bind(&entry.created_by)
    .bind(entry.status)
    .bind(&entry.reference_transaction_id)
    .bind(&entry.reversal_reason)
    .bind(&entry.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<LedgerEntry>> {
    let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
        "SELECT {} FROM transactions WHERE id = ?1",
        ENTRY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

/// Every committed movement of a product, in no particular order.
pub async fn movements_for_product(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<StockMovement>> {
    let rows = sqlx::query_as::<_, StockMovement>(
        r#"
        SELECT transaction_type, quantity
        FROM transactions
        WHERE product_id = ?1 AND status = 'COMMITTED'
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Committed movements of one product within one period.
pub async fn movements_in_period(
    conn: &mut SqliteConnection,
    period_id: &str,
    product_id: &str,
) -> DbResult<Vec<StockMovement>> {
    let rows = sqlx::query_as::<_, StockMovement>(
        r#"
        SELECT transaction_type, quantity
        FROM transactions
        WHERE period_id = ?1 AND product_id = ?2 AND status = 'COMMITTED'
        "#,
    )
    .bind(period_id)
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Committed movements of one product posted outside `period_id`,
/// period-less rows included.
pub async fn movements_outside_period(
    conn: &mut SqliteConnection,
    product_id: &str,
    period_id: &str,
) -> DbResult<Vec<StockMovement>> {
    let rows = sqlx::query_as::<_, StockMovement>(
        r#"
        SELECT transaction_type, quantity
        FROM transactions
        WHERE product_id = ?1
          AND (period_id IS NULL OR period_id <> ?2)
          AND status = 'COMMITTED'
        "#,
    )
    .bind(product_id)
    .bind(period_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// All committed rows of a period, reduced for reconciliation.
pub async fn period_lines(conn: &mut SqliteConnection, period_id: &str) -> DbResult<Vec<PeriodLine>> {
    let rows = sqlx::query_as::<_, PeriodLine>(
        r#"
        SELECT product_id, transaction_type, quantity, total_amount
        FROM transactions
        WHERE period_id = ?1 AND status = 'COMMITTED'
        "#,
    )
    .bind(period_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Rows posted while no period was open (reversals only, in practice).
pub async fn periodless(conn: &mut SqliteConnection) -> DbResult<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, LedgerEntry>(&format!(
        "SELECT {} FROM transactions WHERE period_id IS NULL AND status = 'COMMITTED'",
        ENTRY_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Id of the REVERSAL that references `original_id`, if any.
pub async fn find_reversal_of(
    conn: &mut SqliteConnection,
    original_id: &str,
) -> DbResult<Option<String>> {
    let id = sqlx::query_scalar::<_, String>(
        r#"
        SELECT id FROM transactions
        WHERE reference_transaction_id = ?1 AND transaction_type = 'REVERSAL'
        LIMIT 1
        "#,
    )
    .bind(original_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id)
}

/// Filtered ledger history, newest first.
///
/// The limit is clamped to `1..=MAX_HISTORY_ROWS`.
pub async fn history(
    conn: &mut SqliteConnection,
    filter: &TransactionFilter,
) -> DbResult<Vec<LedgerEntry>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM transactions WHERE 1 = 1",
        ENTRY_COLUMNS
    ));

    if let Some(product_id) = &filter.product_id {
        qb.push(" AND product_id = ").push_bind(product_id.clone());
    }
    if let Some(period_id) = &filter.period_id {
        qb.push(" AND period_id = ").push_bind(period_id.clone());
    }
    if let Some(ty) = filter.transaction_type {
        qb.push(" AND transaction_type = ").push_bind(ty);
    }
    if let Some(created_by) = &filter.created_by {
        qb.push(" AND created_by = ").push_bind(created_by.clone());
    }

    let limit = clamp_history_limit(filter.limit);
    qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(i64::from(limit));

    let rows = qb
        .build_query_as::<LedgerEntry>()
        .fetch_all(&mut *conn)
        .await?;

    debug!(count = rows.len(), limit = limit, "Loaded ledger history");
    Ok(rows)
}
