//! # Draft Sale Repository
//!
//! SQL for `draft_sales` and `draft_sale_items`.
//!
//! Every draft lookup is scoped by owner: a draft that belongs to someone
//! else is indistinguishable from one that does not exist.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use clinic_core::{DraftSale, DraftSaleItem, Money};

const DRAFT_COLUMNS: &str = "id, user_id, total_amount, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, draft_sale_id, product_id, quantity, unit_price, line_total, created_at";

pub async fn insert(conn: &mut SqliteConnection, draft: &DraftSale) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO draft_sales (id, user_id, total_amount, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&draft.id)
    .bind(&draft.user_id)
    .bind(draft.total_amount)
    .bind(draft.created_at)
    .bind(draft.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// The draft with this id, if `user_id` owns it.
pub async fn fetch_owned(
    conn: &mut SqliteConnection,
    id: &str,
    user_id: &str,
) -> DbResult<Option<DraftSale>> {
    let draft = sqlx::query_as::<_, DraftSale>(&format!(
        "SELECT {} FROM draft_sales WHERE id = ?1 AND user_id = ?2",
        DRAFT_COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(draft)
}

/// The caller's drafts, newest first.
pub async fn list_for_user(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Vec<DraftSale>> {
    let drafts = sqlx::query_as::<_, DraftSale>(&format!(
        "SELECT {} FROM draft_sales WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        DRAFT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(drafts)
}

/// Items of a draft in the order they were added.
pub async fn items(conn: &mut SqliteConnection, draft_id: &str) -> DbResult<Vec<DraftSaleItem>> {
    let items = sqlx::query_as::<_, DraftSaleItem>(&format!(
        "SELECT {} FROM draft_sale_items WHERE draft_sale_id = ?1 ORDER BY created_at ASC, rowid ASC",
        ITEM_COLUMNS
    ))
    .bind(draft_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

pub async fn count_items(conn: &mut SqliteConnection, draft_id: &str) -> DbResult<usize> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM draft_sale_items WHERE draft_sale_id = ?1")
            .bind(draft_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count.max(0) as usize)
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &DraftSaleItem) -> DbResult<()> {
    debug!(draft_id = %item.draft_sale_id, product_id = %item.product_id, "Adding draft item");

    sqlx::query(
        r#"
        INSERT INTO draft_sale_items (
            id, draft_sale_id, product_id, quantity, unit_price, line_total, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&item.id)
    .bind(&item.draft_sale_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.line_total)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Deletes one item of one draft. Returns the removed item, if it existed.
pub async fn delete_item(
    conn: &mut SqliteConnection,
    draft_id: &str,
    item_id: &str,
) -> DbResult<Option<DraftSaleItem>> {
    let item = sqlx::query_as::<_, DraftSaleItem>(&format!(
        "SELECT {} FROM draft_sale_items WHERE id = ?1 AND draft_sale_id = ?2",
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(draft_id)
    .fetch_optional(&mut *conn)
    .await?;

    if item.is_some() {
        sqlx::query("DELETE FROM draft_sale_items WHERE id = ?1 AND draft_sale_id = ?2")
            .bind(item_id)
            .bind(draft_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(item)
}

pub async fn update_total(
    conn: &mut SqliteConnection,
    draft_id: &str,
    total: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE draft_sales SET total_amount = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(draft_id)
        .bind(total)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Deletes a draft and its items.
pub async fn delete(conn: &mut SqliteConnection, draft_id: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM draft_sale_items WHERE draft_sale_id = ?1")
        .bind(draft_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM draft_sales WHERE id = ?1")
        .bind(draft_id)
        .execute(&mut *conn)
        .await?;

    debug!(draft_id = %draft_id, "Deleted draft");
    Ok(())
}
