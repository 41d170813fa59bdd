//! # Product Repository
//!
//! SQL for the `products` table.
//!
//! `current_stock` has exactly one writer, [`set_current_stock`], called by
//! the stock projector. Nothing here edits `opening_stock` after insert.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use clinic_core::{Product, ProductStatus};

const PRODUCT_COLUMNS: &str = r#"
    id, name, category, selling_price, cost_price,
    opening_stock, current_stock, reorder_level, status,
    created_at, updated_at
"#;

/// Gets a product by its ID.
///
/// ## Returns
/// * `Ok(Some(Product))` - Product found
/// * `Ok(None)` - Product not found
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = ?1",
        PRODUCT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Lists products ordered by name, optionally filtered by status.
pub async fn list(
    conn: &mut SqliteConnection,
    status: Option<ProductStatus>,
) -> DbResult<Vec<Product>> {
    let products = match status {
        Some(status) => {
            sqlx::query_as::<_, Product>(&format!(
                "SELECT {} FROM products WHERE status = ?1 ORDER BY name ASC",
                PRODUCT_COLUMNS
            ))
            .bind(status)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, Product>(&format!(
                "SELECT {} FROM products ORDER BY name ASC",
                PRODUCT_COLUMNS
            ))
            .fetch_all(&mut *conn)
            .await?
        }
    };

    debug!(count = products.len(), "Listed products");
    Ok(products)
}

/// Products at or below their reorder level.
pub async fn list_low_stock(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(&format!(
        r#"
        SELECT {} FROM products
        WHERE status = 'active' AND current_stock <= reorder_level
        ORDER BY current_stock ASC, name ASC
        "#,
        PRODUCT_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(products)
}

/// Inserts a new product (id generated beforehand).
pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, category, selling_price, cost_price,
            opening_stock, current_stock, reorder_level, status,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.category)
    .bind(product.selling_price)
    .bind(product.cost_price)
    .bind(product.opening_stock)
    .bind(product.current_stock)
    .bind(product.reorder_level)
    .bind(product.status)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stores a recomputed stock figure. Only the stock projector calls this.
pub async fn set_current_stock(
    conn: &mut SqliteConnection,
    id: &str,
    stock: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET current_stock = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(stock)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    debug!(id = %id, stock = stock, "Stored current stock");
    Ok(())
}

/// Activates or deactivates a product (soft delete).
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: ProductStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}
