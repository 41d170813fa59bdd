//! # Draft Sale Workspace
//!
//! Per-cashier carts. Nothing here touches stock until [`DraftService::commit`],
//! which turns every line into a SALE in one unit of work.
//!
//! ## Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  begin_write()                                                          │
//! │    draft owned by caller?            no  → DraftNotFound                │
//! │    any items?                        no  → EmptyDraft                   │
//! │    for each item: post(SALE)         period / stock failure → ROLLBACK  │
//! │    delete draft + items                                                 │
//! │  COMMIT                              → ids of the SALE rows             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A failing item leaves no SALE rows behind and the draft untouched.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::{draft as draft_repo, product as product_repo};
use crate::service::ledger::post;
use clinic_core::draft::{check_item, draft_total, ensure_committable, line_total};
use clinic_core::{
    Actor, AuditAction, CoreError, DraftSale, DraftSaleItem, DraftSaleWithItems, Money,
    NewTransaction, TransactionOptions, TransactionType,
};

const ENTITY: &str = "draft_sale";

#[derive(Debug, Clone)]
pub struct DraftService {
    pool: SqlitePool,
}

impl DraftService {
    pub fn new(pool: SqlitePool) -> Self {
        DraftService { pool }
    }

    /// Starts an empty draft owned by the caller.
    pub async fn create(&self, actor: &Actor) -> LedgerResult<DraftSale> {
        let user_id = actor.require_authenticated()?;

        let now = Utc::now();
        let draft = DraftSale {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            total_amount: Money::zero(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = begin_write(&self.pool).await?;
        draft_repo::insert(&mut tx, &draft).await?;
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::CreateDraftSale, ENTITY, &draft.id),
        )
        .await;
        tx.commit().await?;

        debug!(id = %draft.id, user_id = %draft.user_id, "Draft created");
        Ok(draft)
    }

    /// Adds a line and recomputes the draft total.
    ///
    /// Stock is not checked here; the commit does that.
    pub async fn add_item(
        &self,
        actor: &Actor,
        draft_id: &str,
        product_id: &str,
        quantity: i64,
        unit_price: Money,
    ) -> LedgerResult<DraftSaleWithItems> {
        let user_id = actor.require_authenticated()?;

        let mut tx = begin_write(&self.pool).await?;
        let draft = owned_draft(&mut tx, draft_id, user_id).await?;

        if product_repo::fetch(&mut tx, product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        let existing = draft_repo::count_items(&mut tx, draft_id).await?;
        check_item(quantity, unit_price, existing)?;

        let item = DraftSaleItem {
            id: Uuid::new_v4().to_string(),
            draft_sale_id: draft.id.clone(),
            product_id: product_id.to_string(),
            quantity,
            unit_price,
            line_total: line_total(quantity, unit_price),
            created_at: Utc::now(),
        };
        draft_repo::insert_item(&mut tx, &item).await?;

        let updated = refresh_total(&mut tx, draft).await?;
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::AddDraftItem, ENTITY, draft_id).new_value(&item),
        )
        .await;
        tx.commit().await?;

        Ok(updated)
    }

    /// Removes a line and recomputes the draft total.
    pub async fn remove_item(
        &self,
        actor: &Actor,
        draft_id: &str,
        item_id: &str,
    ) -> LedgerResult<DraftSaleWithItems> {
        let user_id = actor.require_authenticated()?;

        let mut tx = begin_write(&self.pool).await?;
        let draft = owned_draft(&mut tx, draft_id, user_id).await?;

        let removed = draft_repo::delete_item(&mut tx, draft_id, item_id)
            .await?
            .ok_or_else(|| CoreError::DraftItemNotFound {
                draft_id: draft_id.to_string(),
                item_id: item_id.to_string(),
            })?;

        let updated = refresh_total(&mut tx, draft).await?;
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::RemoveDraftItem, ENTITY, draft_id)
                .old_value(&removed),
        )
        .await;
        tx.commit().await?;

        Ok(updated)
    }

    /// The caller's draft with its items.
    pub async fn get_draft(&self, actor: &Actor, draft_id: &str) -> LedgerResult<DraftSaleWithItems> {
        let user_id = actor.require_authenticated()?;

        let mut conn = self.pool.acquire().await?;
        let draft = owned_draft(&mut conn, draft_id, user_id).await?;
        let items = draft_repo::items(&mut conn, draft_id).await?;
        Ok(DraftSaleWithItems { draft, items })
    }

    /// The caller's drafts, newest first.
    pub async fn list_drafts(&self, actor: &Actor) -> LedgerResult<Vec<DraftSale>> {
        let user_id = actor.require_authenticated()?;
        let mut conn = self.pool.acquire().await?;
        Ok(draft_repo::list_for_user(&mut conn, user_id).await?)
    }

    /// Turns every line into a SALE in `period_id`, then deletes the draft.
    ///
    /// All or nothing: one failing line aborts the whole commit.
    ///
    /// ## Returns
    /// Ids of the created SALE rows, in line order.
    pub async fn commit(
        &self,
        actor: &Actor,
        draft_id: &str,
        period_id: &str,
        options: TransactionOptions,
    ) -> LedgerResult<Vec<String>> {
        let user_id = actor.require_authenticated()?;

        let mut tx = begin_write(&self.pool).await?;
        let draft = owned_draft(&mut tx, draft_id, user_id).await?;
        let items = draft_repo::items(&mut tx, draft_id).await?;
        ensure_committable(draft_id, &items)?;

        let mut transaction_ids = Vec::with_capacity(items.len());
        for item in &items {
            let sale = NewTransaction::new(
                TransactionType::Sale,
                &item.product_id,
                item.quantity,
                item.unit_price,
                Some(period_id.to_string()),
            )
            .with_options(options.clone());

            let entry = post(&mut tx, actor, sale).await?;
            transaction_ids.push(entry.id);
        }

        draft_repo::delete(&mut tx, draft_id).await?;
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::CommitSale, ENTITY, draft_id).new_value(
                &serde_json::json!({
                    "period_id": period_id,
                    "total_amount": draft_total(&items),
                    "transaction_ids": transaction_ids,
                }),
            ),
        )
        .await;
        tx.commit().await?;

        info!(
            draft_id = %draft_id,
            items = items.len(),
            total = %draft.total_amount,
            "Draft committed"
        );
        Ok(transaction_ids)
    }
}

/// The draft if `user_id` owns it, `DraftNotFound` otherwise.
async fn owned_draft(
    conn: &mut SqliteConnection,
    draft_id: &str,
    user_id: &str,
) -> LedgerResult<DraftSale> {
    let draft = draft_repo::fetch_owned(conn, draft_id, user_id)
        .await?
        .ok_or_else(|| CoreError::DraftNotFound(draft_id.to_string()))?;
    Ok(draft)
}

async fn refresh_total(
    conn: &mut SqliteConnection,
    draft: DraftSale,
) -> LedgerResult<DraftSaleWithItems> {
    let items = draft_repo::items(conn, &draft.id).await?;
    let total = draft_total(&items);
    let now = Utc::now();
    draft_repo::update_total(conn, &draft.id, total, now).await?;

    Ok(DraftSaleWithItems {
        draft: DraftSale {
            total_amount: total,
            updated_at: now,
            ..draft
        },
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::test_support::{admin, cashier, memory_db, open_period, product};
    use clinic_core::TransactionFilter;

    #[tokio::test]
    async fn test_items_recompute_total() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let drafts = db.drafts();
        let me = cashier("c-1");

        let draft = drafts.create(&me).await.unwrap();
        assert!(draft.total_amount.is_zero());

        drafts.add_item(&me, &draft.id, &p.id, 2, Money::from_cents(150)).await.unwrap();
        let with_two = drafts.add_item(&me, &draft.id, &p.id, 1, Money::from_cents(400)).await.unwrap();
        assert_eq!(with_two.items.len(), 2);
        assert_eq!(with_two.draft.total_amount, Money::from_cents(700));

        let first = with_two.items[0].id.clone();
        let after = drafts.remove_item(&me, &draft.id, &first).await.unwrap();
        assert_eq!(after.items.len(), 1);
        assert_eq!(after.draft.total_amount, Money::from_cents(400));

        let err = drafts.remove_item(&me, &draft.id, &first).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::DraftItemNotFound { .. })));

        let stored = drafts.get_draft(&me, &draft.id).await.unwrap();
        assert_eq!(stored.draft.total_amount, Money::from_cents(400));
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 100);
    }

    #[tokio::test]
    async fn test_item_validation() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let me = cashier("c-1");
        let draft = db.drafts().create(&me).await.unwrap();

        let err = db.drafts().add_item(&me, &draft.id, &p.id, 0, Money::from_cents(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));

        let err = db.drafts().add_item(&me, &draft.id, "missing", 1, Money::from_cents(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_drafts_are_isolated() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let period = open_period(&db, "March").await;
        let (alice, bob) = (cashier("c-alice"), cashier("c-bob"));

        let a = db.drafts().create(&alice).await.unwrap();
        let b = db.drafts().create(&bob).await.unwrap();
        db.drafts().add_item(&alice, &a.id, &p.id, 3, Money::from_cents(100)).await.unwrap();
        db.drafts().add_item(&bob, &b.id, &p.id, 4, Money::from_cents(100)).await.unwrap();

        let err = db.drafts().get_draft(&bob, &a.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::DraftNotFound(_))));
        let err = db
            .drafts()
            .add_item(&bob, &a.id, &p.id, 1, Money::from_cents(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::DraftNotFound(_))));
        let err = db.drafts().commit(&bob, &a.id, &period.id, Default::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::DraftNotFound(_))));

        assert_eq!(db.drafts().get_draft(&bob, &b.id).await.unwrap().items.len(), 1);

        db.drafts().commit(&alice, &a.id, &period.id, Default::default()).await.unwrap();
        assert!(db.drafts().list_drafts(&alice).await.unwrap().is_empty());
        let bobs = db.drafts().get_draft(&bob, &b.id).await.unwrap();
        assert_eq!(bobs.items.len(), 1);
        assert_eq!(bobs.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_commit_posts_sales_and_deletes_draft() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let q = product(&db, "Ibuprofen", 60).await;
        let period = open_period(&db, "March").await;
        let me = cashier("c-1");

        let draft = db.drafts().create(&me).await.unwrap();
        db.drafts().add_item(&me, &draft.id, &p.id, 5, Money::from_cents(100)).await.unwrap();
        db.drafts().add_item(&me, &draft.id, &q.id, 2, Money::from_cents(350)).await.unwrap();

        let ids = db.drafts().commit(&me, &draft.id, &period.id, Default::default()).await.unwrap();
        assert_eq!(ids.len(), 2);

        let first = db.ledger().get_transaction(&ids[0]).await.unwrap();
        assert_eq!(first.transaction_type, TransactionType::Sale);
        assert_eq!(first.created_by, "c-1");
        assert_eq!(first.period_id.as_deref(), Some(period.id.as_str()));

        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 95);
        assert_eq!(db.products().get(&q.id).await.unwrap().current_stock, 58);

        let err = db.drafts().get_draft(&me, &draft.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::DraftNotFound(_))));
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM draft_sale_items")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let scarce = product(&db, "Insulin", 3).await;
        let period = open_period(&db, "March").await;
        let me = cashier("c-1");

        let draft = db.drafts().create(&me).await.unwrap();
        db.drafts().add_item(&me, &draft.id, &p.id, 10, Money::from_cents(100)).await.unwrap();
        db.drafts().add_item(&me, &draft.id, &scarce.id, 4, Money::from_cents(900)).await.unwrap();

        let err = db.drafts().commit(&me, &draft.id, &period.id, Default::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::InsufficientStock { .. })));

        let rows = db.ledger().transaction_history(&TransactionFilter::default()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(db.products().get(&p.id).await.unwrap().current_stock, 100);
        assert_eq!(db.drafts().get_draft(&me, &draft.id).await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_commit_rejects_empty_draft_and_closed_period() {
        let db = memory_db().await;
        let p = product(&db, "Paracetamol", 100).await;
        let period = open_period(&db, "March").await;
        let me = cashier("c-1");

        let draft = db.drafts().create(&me).await.unwrap();
        let err = db.drafts().commit(&me, &draft.id, &period.id, Default::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::EmptyDraft(_))));

        db.drafts().add_item(&me, &draft.id, &p.id, 1, Money::from_cents(100)).await.unwrap();
        db.periods().close_period(&admin(), &period.id).await.unwrap();
        let err = db.drafts().commit(&me, &draft.id, &period.id, Default::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::PeriodClosed(_))));
        assert_eq!(db.drafts().list_drafts(&me).await.unwrap().len(), 1);
    }
}
