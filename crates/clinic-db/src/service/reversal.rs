//! # Reversal Engine
//!
//! Corrects a committed SALE or PURCHASE by appending a REVERSAL that
//! cancels its stock effect. The original row is never touched.
//!
//! ```text
//! SALE     30 @ 2.50  (stock -30)   →  REVERSAL +30 @ 2.50, total  75.00
//! PURCHASE 20 @ 1.10  (stock +20)   →  REVERSAL -20 @ 1.10, total -22.00
//! ```
//!
//! REVERSAL skips the open-period gate, so closed periods can be corrected.
//! The row is attached to the period OPEN at reversal time, or to none.
//! Frozen snapshots of closed periods are never changed; the next period's
//! opening stock picks up period-less reversals.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::transaction as tx_repo;
use crate::service::ledger::post;
use clinic_core::ledger::reversal_quantity;
use clinic_core::validation::validate_reversal_reason;
use clinic_core::{
    Actor, AuditAction, CoreError, LedgerEntry, NewTransaction, TransactionOptions, TransactionType,
};

#[derive(Debug, Clone)]
pub struct ReversalService {
    pool: SqlitePool,
}

impl ReversalService {
    pub fn new(pool: SqlitePool) -> Self {
        ReversalService { pool }
    }

    /// Appends the REVERSAL of `original_id`.
    ///
    /// ## Errors
    /// * `TransactionNotFound` - no such row
    /// * `UnsupportedReversal` - original is not SALE or PURCHASE
    /// * `AlreadyReversed` - a REVERSAL already points at the original
    pub async fn reverse(
        &self,
        actor: &Actor,
        original_id: &str,
        reason: &str,
    ) -> LedgerResult<LedgerEntry> {
        let user_id = actor.require_authenticated()?.to_string();
        validate_reversal_reason(reason)?;

        let mut tx = begin_write(&self.pool).await?;

        let original = tx_repo::fetch(&mut tx, original_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(original_id.to_string()))?;
        let quantity = reversal_quantity(&original)?;

        // `post` files it under the open period and rejects a second reversal
        let reversal = NewTransaction::new(
            TransactionType::Reversal,
            &original.product_id,
            quantity,
            original.unit_price,
            None,
        )
        .with_options(TransactionOptions {
            transaction_date: None,
            reference_transaction_id: Some(original.id.clone()),
            reversal_reason: Some(reason.trim().to_string()),
            notes: None,
        });

        let entry = post(&mut tx, actor, reversal).await?;

        let action = match original.transaction_type {
            TransactionType::Purchase => AuditAction::ReversePurchase,
            _ => AuditAction::ReverseSale,
        };
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, action, "transaction", &original.id)
                .old_value(&original)
                .new_value(&entry),
        )
        .await;
        tx.commit().await?;

        info!(
            original = %original.id,
            reversal = %entry.id,
            quantity = entry.quantity,
            period_id = ?entry.period_id,
            "Transaction reversed"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::test_support::{admin, cashier, memory_db, open_period, product};
    use clinic_core::Money;

    fn posted(ty: TransactionType, product_id: &str, qty: i64, cents: i64, period_id: &str) -> NewTransaction {
        NewTransaction::new(ty, product_id, qty, Money::from_cents(cents), Some(period_id.to_string()))
    }

    #[tokio::test]
    async fn test_reversal_cancels_sale() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let period = open_period(&db, "March").await;

        let sale = db
            .ledger()
            .create_transaction(&cashier("c-1"), posted(TransactionType::Sale, &p.id, 5, 250, &period.id))
            .await
            .unwrap();
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 95);

        let reversal = db.reversals().reverse(&cashier("c-1"), &sale.id, "Wrong item").await.unwrap();
        assert_eq!(reversal.transaction_type, TransactionType::Reversal);
        assert_eq!(reversal.quantity, 5);
        assert_eq!(reversal.total_amount, Money::from_cents(1250));
        assert_eq!(reversal.reference_transaction_id.as_deref(), Some(sale.id.as_str()));
        assert_eq!(reversal.reversal_reason.as_deref(), Some("Wrong item"));
        assert_eq!(reversal.period_id.as_deref(), Some(period.id.as_str()));
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 100);

        let untouched = db.ledger().get_transaction(&sale.id).await.unwrap();
        assert_eq!(untouched.quantity, 5);

        let log = db.audit().entity_log("transaction", &sale.id, None).await.unwrap();
        assert!(log.iter().any(|e| e.action == AuditAction::ReverseSale));
    }

    #[tokio::test]
    async fn test_reversal_cancels_purchase() {
        let db = memory_db().await;
        let p = product(&db, "Gauze", 10).await;
        let period = open_period(&db, "March").await;

        let purchase = db
            .ledger()
            .create_transaction(&admin(), posted(TransactionType::Purchase, &p.id, 20, 110, &period.id))
            .await
            .unwrap();
        let reversal = db.reversals().reverse(&admin(), &purchase.id, "Supplier recall").await.unwrap();

        assert_eq!(reversal.quantity, -20);
        assert_eq!(reversal.total_amount, Money::from_cents(-2200));
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 10);
    }

    #[tokio::test]
    async fn test_reversal_rules() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let period = open_period(&db, "March").await;
        let ledger = db.ledger();

        let err = db.reversals().reverse(&admin(), "missing", "typo").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::TransactionNotFound(_))));

        let adjustment = ledger
            .create_transaction(&admin(), posted(TransactionType::Adjustment, &p.id, -2, 100, &period.id))
            .await
            .unwrap();
        let err = db.reversals().reverse(&admin(), &adjustment.id, "typo").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::UnsupportedReversal { .. })));

        let sale = ledger
            .create_transaction(&cashier("c-1"), posted(TransactionType::Sale, &p.id, 3, 100, &period.id))
            .await
            .unwrap();

        let err = db.reversals().reverse(&admin(), &sale.id, "   ").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));

        let reversal = db.reversals().reverse(&admin(), &sale.id, "Refund").await.unwrap();

        let err = db.reversals().reverse(&admin(), &reversal.id, "Undo refund").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::UnsupportedReversal { .. })));

        let err = db.reversals().reverse(&admin(), &sale.id, "Refund again").await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::AlreadyReversed(_))));
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 98);
    }

    /// opening 100, +50, -30, -5, close at 115, reverse the sale after close.
    #[tokio::test]
    async fn test_reversal_after_close() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let march = open_period(&db, "March").await;
        let ledger = db.ledger();

        ledger
            .create_transaction(&admin(), posted(TransactionType::Purchase, &p.id, 50, 100, &march.id))
            .await
            .unwrap();
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 150);
        let sale = ledger
            .create_transaction(&cashier("c-1"), posted(TransactionType::Sale, &p.id, 30, 250, &march.id))
            .await
            .unwrap();
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 120);
        ledger
            .create_transaction(&admin(), posted(TransactionType::Adjustment, &p.id, -5, 100, &march.id))
            .await
            .unwrap();
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 115);

        db.periods().close_period(&admin(), &march.id).await.unwrap();
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(115));

        let reversal = db.reversals().reverse(&admin(), &sale.id, "Returned unopened").await.unwrap();
        assert_eq!(reversal.period_id, None);
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 145);
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(115));

        let summary = db.periods().get_period_summary(&march.id).await.unwrap();
        assert_eq!(summary.discrepancies().count(), 0);

        let april = open_period(&db, "April").await;
        assert_eq!(db.periods().period_opening_stock(&p.id, &april.id).await.unwrap(), 145);
    }

    #[tokio::test]
    async fn test_reversal_lands_in_next_open_period() {
        let db = memory_db().await;
        let p = product(&db, "Cetirizine", 60).await;
        let march = open_period(&db, "March").await;

        let sale = db
            .ledger()
            .create_transaction(&cashier("c-1"), posted(TransactionType::Sale, &p.id, 12, 220, &march.id))
            .await
            .unwrap();
        db.periods().close_period(&admin(), &march.id).await.unwrap();

        let april = open_period(&db, "April").await;
        assert_eq!(db.periods().period_opening_stock(&p.id, &april.id).await.unwrap(), 48);

        let reversal = db.reversals().reverse(&admin(), &sale.id, "Dispensed in error").await.unwrap();
        assert_eq!(reversal.period_id.as_deref(), Some(april.id.as_str()));
        assert_eq!(db.periods().period_closing_stock(&p.id, &march.id).await.unwrap(), Some(48));

        let closed = db.periods().close_period(&admin(), &april.id).await.unwrap();
        assert_eq!(closed.id, april.id);
        let derived = db.ledger().recalculate(&p.id).await.unwrap();
        assert_eq!(derived, 60);
        assert_eq!(db.periods().period_closing_stock(&p.id, &april.id).await.unwrap(), Some(derived));

        let summary = db.periods().get_period_summary(&april.id).await.unwrap();
        assert_eq!(summary.discrepancies().count(), 0);
    }
}
