//! Fixtures shared by the service tests.

use chrono::NaiveDate;

use crate::pool::{Database, DbConfig};
use clinic_core::{Actor, Money, NewProduct, Period, Product};

pub(crate) fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub(crate) fn cashier(user_id: &str) -> Actor {
    Actor::cashier(user_id)
}

/// Fresh migrated in-memory database.
pub(crate) async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// Active product selling at 2.50, costing 1.20.
pub(crate) async fn product(db: &Database, name: &str, opening_stock: i64) -> Product {
    db.products()
        .create_product(
            &admin(),
            NewProduct {
                name: name.to_string(),
                category: None,
                selling_price: Money::from_cents(250),
                cost_price: Money::from_cents(120),
                opening_stock,
                reorder_level: None,
            },
        )
        .await
        .expect("create product")
}

/// Opens a period starting 2024-03-01 with no end date.
pub(crate) async fn open_period(db: &Database, name: &str) -> Period {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
    db.periods()
        .create_period(&admin(), name, start, None)
        .await
        .expect("open period")
}
