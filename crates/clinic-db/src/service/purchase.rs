//! # Purchases
//!
//! Stock received from a supplier, posted as one PURCHASE row.

use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::service::ledger::post;
use clinic_core::validation::validate_supplier;
use clinic_core::{
    Actor, AuditAction, LedgerEntry, Money, NewTransaction, TransactionOptions, TransactionType,
};

#[derive(Debug, Clone)]
pub struct PurchaseService {
    pool: SqlitePool,
}

impl PurchaseService {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseService { pool }
    }

    /// Posts a PURCHASE of `quantity` at `unit_cost` from `supplier`.
    ///
    /// The supplier goes into the row's notes unless the caller supplied
    /// notes of their own, and always into the audit entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_purchase(
        &self,
        actor: &Actor,
        product_id: &str,
        quantity: i64,
        unit_cost: Money,
        period_id: &str,
        supplier: &str,
        mut options: TransactionOptions,
    ) -> LedgerResult<LedgerEntry> {
        let user_id = actor.require_authenticated()?.to_string();
        validate_supplier(supplier)?;
        let supplier = supplier.trim();

        if options.notes.as_deref().map_or(true, |n| n.trim().is_empty()) {
            options.notes = Some(format!("Supplier: {}", supplier));
        }

        let purchase = NewTransaction::new(
            TransactionType::Purchase,
            product_id,
            quantity,
            unit_cost,
            Some(period_id.to_string()),
        )
        .with_options(options);

        let mut tx = begin_write(&self.pool).await?;
        let entry = post(&mut tx, actor, purchase).await?;
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::RecordPurchase, "transaction", &entry.id)
                .new_value(&json!({
                    "supplier": supplier,
                    "product_id": entry.product_id,
                    "quantity": entry.quantity,
                    "unit_cost": entry.unit_price,
                    "total_amount": entry.total_amount,
                })),
        )
        .await;
        tx.commit().await?;

        info!(
            id = %entry.id,
            product_id = %entry.product_id,
            quantity = entry.quantity,
            supplier = %supplier,
            "Purchase recorded"
        );
        Ok(entry)
    }
}
