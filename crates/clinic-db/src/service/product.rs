//! # Product Service
//!
//! The slice of the catalog the ledger depends on. Products are created
//! with an immutable opening stock; after that only the stock projector
//! touches `current_stock`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::pool::begin_write;
use crate::repository::audit::{self, AuditRecord};
use crate::repository::{period as period_repo, product as product_repo};
use clinic_core::types::DEFAULT_REORDER_LEVEL;
use clinic_core::validation::validate_new_product;
use clinic_core::{Actor, AuditAction, CoreError, NewProduct, Product, ProductStatus};

#[derive(Debug, Clone)]
pub struct ProductService {
    pool: SqlitePool,
}

impl ProductService {
    pub fn new(pool: SqlitePool) -> Self {
        ProductService { pool }
    }

    /// Creates a product. Admin only.
    ///
    /// `current_stock` starts equal to `opening_stock`. When a period is
    /// OPEN the product also gets a snapshot row in it, opening at its
    /// opening stock, so the period's close covers it.
    pub async fn create_product(&self, actor: &Actor, new: NewProduct) -> LedgerResult<Product> {
        let user_id = actor.require_admin("create products")?.to_string();
        validate_new_product(&new)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            category: new.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            selling_price: new.selling_price,
            cost_price: new.cost_price,
            opening_stock: new.opening_stock,
            current_stock: new.opening_stock,
            reorder_level: new.reorder_level.unwrap_or(DEFAULT_REORDER_LEVEL),
            status: ProductStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut tx = begin_write(&self.pool).await?;
        product_repo::insert(&mut tx, &product).await?;

        if let Some(period) = period_repo::fetch_open(&mut tx).await? {
            period_repo::insert_snapshot(&mut tx, &period.id, &product.id, product.opening_stock)
                .await?;
        }

        audit::record(
            &mut tx,
            AuditRecord::new(user_id, AuditAction::CreateProduct, "product", &product.id)
                .new_value(&product),
        )
        .await;
        tx.commit().await?;

        info!(id = %product.id, name = %product.name, opening_stock = product.opening_stock, "Product created");
        Ok(product)
    }

    /// Activates or deactivates a product. Admin only.
    ///
    /// Inactive products keep their ledger history and still count toward
    /// snapshots they already have; they get no new snapshot rows.
    pub async fn set_status(
        &self,
        actor: &Actor,
        product_id: &str,
        status: ProductStatus,
    ) -> LedgerResult<Product> {
        let user_id = actor.require_admin("change product status")?.to_string();

        let mut tx = begin_write(&self.pool).await?;
        let before = product_repo::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if before.status == status {
            tx.commit().await?;
            return Ok(before);
        }

        let now = Utc::now();
        product_repo::set_status(&mut tx, product_id, status, now).await?;

        let action = match status {
            ProductStatus::Active => AuditAction::ActivateProduct,
            ProductStatus::Inactive => AuditAction::DeactivateProduct,
        };
        audit::record(
            &mut tx,
            AuditRecord::new(user_id, action, "product", product_id)
                .old_value(&serde_json::json!({ "status": before.status }))
                .new_value(&serde_json::json!({ "status": status })),
        )
        .await;
        tx.commit().await?;

        info!(id = %product_id, status = %status.as_str(), "Product status changed");
        Ok(Product {
            status,
            updated_at: now,
            ..before
        })
    }

    pub async fn get(&self, product_id: &str) -> LedgerResult<Product> {
        let mut conn = self.pool.acquire().await?;
        let product = product_repo::fetch(&mut conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        Ok(product)
    }

    /// Products by name, optionally only one status.
    pub async fn list(&self, status: Option<ProductStatus>) -> LedgerResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        Ok(product_repo::list(&mut conn, status).await?)
    }

    /// Active products at or below their reorder level.
    pub async fn low_stock(&self) -> LedgerResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        Ok(product_repo::list_low_stock(&mut conn).await?)
    }
}
