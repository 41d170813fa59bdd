//! # Ledger Store and Stock Projector
//!
//! [`post`] is the single path by which a row enters the ledger. Drafts,
//! reversals, purchases and physical counts all go through it, inside
//! their own unit of work.
//!
//! ## Posting a Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. quantity / price valid for the type                                 │
//! │  2. actor authenticated                    → created_by                 │
//! │  3. period exists and is OPEN              (REVERSAL: see below)        │
//! │  4. product exists                                                      │
//! │  5. SALE: current_stock >= quantity                                     │
//! │  6. transaction_date parses                (defaults to now)            │
//! │  ─────────────────────────────────────────                              │
//! │  INSERT transactions                                                    │
//! │  recalculate(product)                      → products.current_stock     │
//! │  audit CREATE_TRANSACTION                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A REVERSAL skips the open-period gate but must cancel exactly one
//! unreversed SALE or PURCHASE: same product and unit price, the negated
//! stock effect, and a reason. It is filed under the period OPEN at posting
//! time (or none), whatever period the caller named, so frozen closings
//! stay correct and the next period's opening carries it.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::{period as period_repo, product as product_repo, transaction as tx_repo};
use clinic_core::ledger::{
    check_sale_stock, parse_transaction_date, project_stock, reversal_quantity, transaction_total,
    validate_entry_quantity,
};
use clinic_core::validation::{validate_non_negative_price, validate_reversal_reason};
use clinic_core::{
    Actor, AuditAction, CoreError, LedgerEntry, NewTransaction, Period, Product, TransactionFilter,
    TransactionStatus, TransactionType, ValidationError,
};

// =============================================================================
// Unit-of-Work Building Blocks
// =============================================================================

/// Validates and appends one ledger row, then re-projects the product's
/// stock and audits the row.
///
/// Runs on the caller's connection; the caller owns the transaction.
pub(crate) async fn post(
    conn: &mut SqliteConnection,
    actor: &Actor,
    new: NewTransaction,
) -> LedgerResult<LedgerEntry> {
    validate_entry_quantity(new.transaction_type, new.quantity)?;
    validate_non_negative_price("unit_price", new.unit_price)?;

    let user_id = actor.require_authenticated()?.to_string();

    let period_id = if new.transaction_type.requires_open_period() {
        let period_id = new
            .period_id
            .as_deref()
            .ok_or_else(|| ValidationError::required("period_id"))?;
        let period = period_repo::fetch(conn, period_id)
            .await?
            .ok_or_else(|| CoreError::PeriodNotFound(period_id.to_string()))?;
        if !period.is_open() {
            warn!(period = %period.period_name, "Rejected write to closed period");
            return Err(CoreError::PeriodClosed(period.period_name).into());
        }
        Some(period.id)
    } else {
        check_reversal(conn, &new).await?;
        let open = period_repo::fetch_open(conn).await?.map(|p| p.id);
        if new.period_id.is_some() && new.period_id != open {
            debug!(requested = ?new.period_id, filed = ?open, "Reversal filed under the open period");
        }
        open
    };

    let product = product_repo::fetch(conn, &new.product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(new.product_id.clone()))?;

    if new.transaction_type == TransactionType::Sale {
        check_sale_stock(&product, new.quantity)?;
    }

    let now = Utc::now();
    let transaction_date = parse_transaction_date(new.options.transaction_date.as_deref(), now)?;
    let total_amount = transaction_total(new.quantity, new.unit_price)?;

    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        transaction_type: new.transaction_type,
        total_amount,
        product_id: product.id.clone(),
        quantity: new.quantity,
        unit_price: new.unit_price,
        transaction_date,
        created_at: now,
        period_id,
        created_by: user_id.clone(),
        status: TransactionStatus::Committed,
        reference_transaction_id: new.options.reference_transaction_id,
        reversal_reason: new.options.reversal_reason,
        notes: new.options.notes,
    };

    tx_repo::insert(conn, &entry).await?;
    recalculate_product(conn, &product).await?;

    audit::record(
        conn,
        AuditRecord::new(user_id, AuditAction::CreateTransaction, "transaction", &entry.id)
            .new_value(&entry),
    )
    .await;

    Ok(entry)
}

/// Checks a REVERSAL against the row it points at.
async fn check_reversal(conn: &mut SqliteConnection, new: &NewTransaction) -> LedgerResult<()> {
    let original_id = new
        .options
        .reference_transaction_id
        .as_deref()
        .ok_or_else(|| ValidationError::required("reference_transaction_id"))?;
    validate_reversal_reason(new.options.reversal_reason.as_deref().unwrap_or_default())?;

    let original = tx_repo::fetch(conn, original_id)
        .await?
        .ok_or_else(|| CoreError::TransactionNotFound(original_id.to_string()))?;
    let quantity = reversal_quantity(&original)?;

    if tx_repo::find_reversal_of(conn, original_id).await?.is_some() {
        return Err(CoreError::AlreadyReversed(original_id.to_string()).into());
    }

    let mismatch = if new.product_id != original.product_id {
        Some(("product_id", "must match the reversed transaction"))
    } else if new.quantity != quantity {
        Some(("quantity", "must cancel the reversed transaction exactly"))
    } else if new.unit_price != original.unit_price {
        Some(("unit_price", "must match the reversed transaction"))
    } else {
        None
    };
    if let Some((field, reason)) = mismatch {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Folds the product's ledger over its opening stock and stores the
/// result. Returns the new stock.
pub(crate) async fn recalculate_in(conn: &mut SqliteConnection, product_id: &str) -> LedgerResult<i64> {
    let product = product_repo::fetch(conn, product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
    recalculate_product(conn, &product).await
}

async fn recalculate_product(conn: &mut SqliteConnection, product: &Product) -> LedgerResult<i64> {
    let movements = tx_repo::movements_for_product(conn, &product.id).await?;
    let stock = project_stock(product.opening_stock, &movements);

    if stock != product.current_stock {
        debug!(
            product_id = %product.id,
            from = product.current_stock,
            to = stock,
            "Projected stock changed"
        );
    }
    product_repo::set_current_stock(conn, &product.id, stock, Utc::now()).await?;

    Ok(stock)
}

// =============================================================================
// Service
// =============================================================================

/// A product whose stored stock disagreed with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockDrift {
    pub product_id: String,
    pub product_name: String,
    pub stored: i64,
    pub derived: i64,
}

/// Ledger writes, the stock projector, and ledger reads.
#[derive(Debug, Clone)]
pub struct LedgerService {
    pool: SqlitePool,
}

impl LedgerService {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerService { pool }
    }

    /// Records one transaction as its own unit of work.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let entry = db.ledger().create_transaction(
    ///     &actor,
    ///     NewTransaction::new(TransactionType::Sale, &product_id, 3, price, Some(period_id)),
    /// ).await?;
    /// ```
    pub async fn create_transaction(
        &self,
        actor: &Actor,
        new: NewTransaction,
    ) -> LedgerResult<LedgerEntry> {
        let mut tx = begin_write(&self.pool).await?;
        let entry = post(&mut tx, actor, new).await?;
        tx.commit().await?;

        info!(
            id = %entry.id,
            transaction_type = %entry.transaction_type,
            product_id = %entry.product_id,
            quantity = entry.quantity,
            "Transaction committed"
        );
        Ok(entry)
    }

    /// Re-derives and stores one product's stock.
    pub async fn recalculate(&self, product_id: &str) -> LedgerResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        let stock = recalculate_in(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Re-derives every product's stock. Returns the products that had
    /// drifted, each audited as RECALCULATE_STOCK.
    pub async fn recalculate_all(&self, actor: &Actor) -> LedgerResult<Vec<StockDrift>> {
        let user_id = actor.require_admin("recalculate stock")?.to_string();

        let mut tx = begin_write(&self.pool).await?;
        let products = product_repo::list(&mut tx, None).await?;

        let mut drifted = Vec::new();
        for product in &products {
            let derived = recalculate_product(&mut tx, product).await?;
            if derived == product.current_stock {
                continue;
            }

            let drift = StockDrift {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                stored: product.current_stock,
                derived,
            };
            audit::record(
                &mut tx,
                AuditRecord::new(&user_id, AuditAction::RecalculateStock, "product", &product.id)
                    .old_value(&serde_json::json!({ "current_stock": drift.stored }))
                    .new_value(&serde_json::json!({ "current_stock": drift.derived })),
            )
            .await;
            drifted.push(drift);
        }
        tx.commit().await?;

        if drifted.is_empty() {
            info!(products = products.len(), "Stock recalculated, no drift");
        } else {
            warn!(products = products.len(), drifted = drifted.len(), "Stock drift healed");
        }
        Ok(drifted)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_transaction(&self, id: &str) -> LedgerResult<LedgerEntry> {
        let mut conn = self.pool.acquire().await?;
        let entry = tx_repo::fetch(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
        Ok(entry)
    }

    pub async fn transaction_history(&self, filter: &TransactionFilter) -> LedgerResult<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        Ok(tx_repo::history(&mut conn, filter).await?)
    }

    /// Every ledger row of one product, newest first.
    pub async fn product_stock_history(
        &self,
        product_id: &str,
        limit: Option<u32>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        if product_repo::fetch(&mut conn, product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        let filter = TransactionFilter {
            product_id: Some(product_id.to_string()),
            limit,
            ..Default::default()
        };
        Ok(tx_repo::history(&mut conn, &filter).await?)
    }

    /// SALE rows, optionally for one period. Cashiers only see their own.
    pub async fn sales_history(
        &self,
        actor: &Actor,
        period_id: Option<&str>,
        limit: Option<u32>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let user_id = actor.require_authenticated()?;

        let filter = TransactionFilter {
            period_id: period_id.map(str::to_string),
            transaction_type: Some(TransactionType::Sale),
            created_by: (!actor.is_admin()).then(|| user_id.to_string()),
            limit,
            ..Default::default()
        };

        let mut conn = self.pool.acquire().await?;
        Ok(tx_repo::history(&mut conn, &filter).await?)
    }

    /// The period whose date range contains `date`, else the OPEN period.
    pub async fn find_period_for_date(&self, date: NaiveDate) -> LedgerResult<Option<Period>> {
        let mut conn = self.pool.acquire().await?;
        if let Some(period) = period_repo::fetch_containing(&mut conn, date).await? {
            return Ok(Some(period));
        }
        Ok(period_repo::fetch_open(&mut conn).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::{admin, cashier, memory_db, open_period, product};
    use clinic_core::{Money, TransactionOptions};
    use std::time::Duration;

    fn tx(
        ty: TransactionType,
        product_id: &str,
        quantity: i64,
        period_id: &str,
    ) -> NewTransaction {
        NewTransaction::new(ty, product_id, quantity, Money::from_cents(250), Some(period_id.to_string()))
    }

    async fn stock_of(db: &Database, product_id: &str) -> i64 {
        db.products().get(product_id).await.unwrap().current_stock
    }

    #[tokio::test]
    async fn test_stock_follows_ledger() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let period = open_period(&db, "March").await;
        let ledger = db.ledger();

        ledger.create_transaction(&admin(), tx(TransactionType::Purchase, &p.id, 50, &period.id)).await.unwrap();
        assert_eq!(stock_of(&db, &p.id).await, 150);

        let sale = ledger
            .create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 30, &period.id))
            .await
            .unwrap();
        assert_eq!(sale.total_amount, Money::from_cents(7500));
        assert_eq!(sale.created_by, "c-1");
        assert_eq!(stock_of(&db, &p.id).await, 120);

        ledger.create_transaction(&admin(), tx(TransactionType::Adjustment, &p.id, -5, &period.id)).await.unwrap();
        assert_eq!(stock_of(&db, &p.id).await, 115);

        let audit = db.audit().entity_log("transaction", &sale.id, None).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::CreateTransaction);
    }

    #[tokio::test]
    async fn test_sale_beyond_stock_changes_nothing() {
        let db = memory_db().await;
        let p = product(&db, "Amoxicillin", 10).await;
        let period = open_period(&db, "March").await;

        let err = db
            .ledger()
            .create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 11, &period.id))
            .await
            .unwrap_err();

        match err {
            LedgerError::Core(CoreError::InsufficientStock { available, requested, .. }) => {
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stock_of(&db, &p.id).await, 10);
        let rows = db.ledger().product_stock_history(&p.id, None).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_period_gate() {
        let db = memory_db().await;
        let p = product(&db, "Ibuprofen", 20).await;
        let ledger = db.ledger();

        let err = ledger
            .create_transaction(&admin(), tx(TransactionType::Purchase, &p.id, 5, "no-such-period"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodNotFound(_))));

        let err = ledger
            .create_transaction(
                &admin(),
                NewTransaction::new(TransactionType::Purchase, &p.id, 5, Money::from_cents(100), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));

        let period = open_period(&db, "March").await;
        db.periods().close_period(&admin(), &period.id).await.unwrap();

        let err = ledger
            .create_transaction(&admin(), tx(TransactionType::Purchase, &p.id, 5, &period.id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodClosed(_))));
        assert_eq!(stock_of(&db, &p.id).await, 20);
    }

    #[tokio::test]
    async fn test_direct_reversal_follows_reversal_rules() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let march = open_period(&db, "March").await;
        let ledger = db.ledger();

        let sale = ledger
            .create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 30, &march.id))
            .await
            .unwrap();
        db.periods().close_period(&admin(), &march.id).await.unwrap();

        let reversal = |quantity: i64, reference: Option<String>| {
            tx(TransactionType::Reversal, &p.id, quantity, &march.id).with_options(TransactionOptions {
                reference_transaction_id: reference,
                reversal_reason: Some("Customer return".into()),
                ..Default::default()
            })
        };

        let err = ledger.create_transaction(&admin(), reversal(30, None)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));
        let err = ledger
            .create_transaction(&admin(), reversal(29, Some(sale.id.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));
        assert_eq!(stock_of(&db, &p.id).await, 70);

        // Names the closed period but lands in none
        let entry = ledger
            .create_transaction(&admin(), reversal(30, Some(sale.id.clone())))
            .await
            .unwrap();
        assert_eq!(entry.period_id, None);
        assert_eq!(stock_of(&db, &p.id).await, 100);
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(70));

        let err = ledger
            .create_transaction(&admin(), reversal(30, Some(sale.id.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::AlreadyReversed(_))));

        let march_summary = db.periods().get_period_summary(&march.id).await.unwrap();
        assert_eq!(march_summary.discrepancies().count(), 0);

        let april = open_period(&db, "April").await;
        assert_eq!(db.periods().period_opening_stock(&p.id, &april.id).await.unwrap(), 100);
        db.periods().close_period(&admin(), &april.id).await.unwrap();
        assert_eq!(db.periods().period_closing_stock(&p.id, &april.id).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_oversized_quantity_rejected() {
        let db = memory_db().await;
        let p = product(&db, "Gauze", 10).await;
        let period = open_period(&db, "March").await;

        let huge = NewTransaction::new(
            TransactionType::Purchase,
            &p.id,
            i64::MAX / 100,
            Money::from_cents(1000),
            Some(period.id.clone()),
        );
        let err = db.ledger().create_transaction(&admin(), huge).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(stock_of(&db, &p.id).await, 10);
    }

    #[tokio::test]
    async fn test_unknown_product_and_unauthenticated() {
        let db = memory_db().await;
        let p = product(&db, "Cetirizine", 20).await;
        let period = open_period(&db, "March").await;

        let err = db
            .ledger()
            .create_transaction(&admin(), tx(TransactionType::Purchase, "missing", 5, &period.id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::ProductNotFound(_))));

        let err = db
            .ledger()
            .create_transaction(&Actor::cashier(""), tx(TransactionType::Sale, &p.id, 1, &period.id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_backdating() {
        let db = memory_db().await;
        let p = product(&db, "Loratadine", 20).await;
        let period = open_period(&db, "March").await;

        let backdated = tx(TransactionType::Sale, &p.id, 2, &period.id).with_options(TransactionOptions {
            transaction_date: Some("2024-03-01 09:15:00".into()),
            ..Default::default()
        });
        let entry = db.ledger().create_transaction(&cashier("c-1"), backdated).await.unwrap();
        assert!(entry.is_backdated());
        assert_eq!(entry.transaction_date.date_naive().to_string(), "2024-03-01");

        let bad = tx(TransactionType::Sale, &p.id, 2, &period.id).with_options(TransactionOptions {
            transaction_date: Some("yesterday".into()),
            ..Default::default()
        });
        let err = db.ledger().create_transaction(&cashier("c-1"), bad).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::InvalidDate { .. })));
        assert_eq!(stock_of(&db, &p.id).await, 18);
    }

    #[tokio::test]
    async fn test_ledger_rows_are_append_only() {
        let db = memory_db().await;
        let p = product(&db, "Omeprazole", 20).await;
        let period = open_period(&db, "March").await;
        let entry = db
            .ledger()
            .create_transaction(&admin(), tx(TransactionType::Purchase, &p.id, 5, &period.id))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE transactions SET quantity = 500 WHERE id = ?1")
            .bind(&entry.id)
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM transactions WHERE id = ?1")
            .bind(&entry.id)
            .execute(db.pool())
            .await;
        assert!(delete.is_err());

        assert_eq!(db.ledger().get_transaction(&entry.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_recalculate_heals_drift() {
        let db = memory_db().await;
        let p = product(&db, "Metformin", 40).await;
        let q = product(&db, "Salbutamol", 10).await;
        let period = open_period(&db, "March").await;
        db.ledger()
            .create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 4, &period.id))
            .await
            .unwrap();

        sqlx::query("UPDATE products SET current_stock = 999 WHERE id = ?1")
            .bind(&p.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.ledger().recalculate_all(&cashier("c-1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Forbidden { .. })));

        let drifted = db.ledger().recalculate_all(&admin()).await.unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].product_id, p.id);
        assert_eq!(drifted[0].stored, 999);
        assert_eq!(drifted[0].derived, 36);
        assert_eq!(stock_of(&db, &p.id).await, 36);

        assert_eq!(db.ledger().recalculate(&q.id).await.unwrap(), 10);
        assert!(db.ledger().recalculate_all(&admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sales_history_scoped_to_cashier() {
        let db = memory_db().await;
        let p = product(&db, "Zinc", 50).await;
        let period = open_period(&db, "March").await;
        let ledger = db.ledger();

        ledger.create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 1, &period.id)).await.unwrap();
        ledger.create_transaction(&cashier("c-1"), tx(TransactionType::Sale, &p.id, 2, &period.id)).await.unwrap();
        ledger.create_transaction(&cashier("c-2"), tx(TransactionType::Sale, &p.id, 3, &period.id)).await.unwrap();
        ledger.create_transaction(&admin(), tx(TransactionType::Purchase, &p.id, 9, &period.id)).await.unwrap();

        let own = ledger.sales_history(&cashier("c-1"), None, None).await.unwrap();
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|e| e.created_by == "c-1"));
        assert_eq!(own[0].quantity, 2, "newest first");

        let all = ledger.sales_history(&admin(), Some(&period.id), None).await.unwrap();
        assert_eq!(all.len(), 3);

        let limited = ledger
            .transaction_history(&TransactionFilter { limit: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].transaction_type, TransactionType::Purchase);
    }

    #[tokio::test]
    async fn test_find_period_for_date() {
        let db = memory_db().await;
        let ledger = db.ledger();
        let day = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();

        assert!(ledger.find_period_for_date(day("2024-03-10")).await.unwrap().is_none());

        let feb = db
            .periods()
            .create_period(&admin(), "February", day("2024-02-01"), Some(day("2024-02-29")))
            .await
            .unwrap();
        db.periods().close_period(&admin(), &feb.id).await.unwrap();
        let march = db
            .periods()
            .create_period(&admin(), "March", day("2024-03-01"), None)
            .await
            .unwrap();

        let found = ledger.find_period_for_date(day("2024-02-14")).await.unwrap().unwrap();
        assert_eq!(found.id, feb.id);
        let found = ledger.find_period_for_date(day("2024-03-20")).await.unwrap().unwrap();
        assert_eq!(found.id, march.id);
        let found = ledger.find_period_for_date(day("2023-12-25")).await.unwrap().unwrap();
        assert_eq!(found.id, march.id, "falls back to the open period");
    }

    #[tokio::test]
    async fn test_concurrent_sales_cannot_oversell() {
        let path = std::env::temp_dir().join(format!("clinic-ledger-{}.db", Uuid::new_v4()));
        let config = DbConfig::new(&path)
            .max_connections(4)
            .busy_timeout(Duration::from_secs(10));
        let db = Database::new(config).await.unwrap();

        let p = product(&db, "Insulin", 10).await;
        let period = open_period(&db, "March").await;

        let spawn_sale = |user: &'static str| {
            let db = db.clone();
            let sale = tx(TransactionType::Sale, &p.id, 6, &period.id);
            tokio::spawn(async move { db.ledger().create_transaction(&cashier(user), sale).await })
        };
        let first = spawn_sale("c-1");
        let second = spawn_sale("c-2");
        let (a, b) = (first.await.unwrap(), second.await.unwrap());

        let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(succeeded, 1);
        let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(failure, LedgerError::Core(CoreError::InsufficientStock { .. })));
        assert_eq!(stock_of(&db, &p.id).await, 4);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
