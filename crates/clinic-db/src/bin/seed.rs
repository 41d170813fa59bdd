//! # Seed Data Generator
//!
//! Populates a database with demo dispensary products and replays the
//! reference bookkeeping walk-through against one of them.
//!
//! ## Usage
//! ```bash
//! # Seed 40 products (default) into ./clinic_dev.db
//! cargo run -p clinic-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p clinic-db --bin seed -- --count 200 --db ./data/clinic.db
//!
//! # More logging
//! RUST_LOG=debug cargo run -p clinic-db --bin seed
//! ```
//!
//! ## Walk-through
//! ```text
//! opening 100 → PURCHASE 50 → 150 → SALE 30 → 120 → ADJUSTMENT -5 → 115
//! close period (frozen closing 115) → REVERSAL of the sale → 145
//! next period opens at 145
//! ```

use std::env;

use chrono::{Datelike, Utc};
use clinic_core::{Actor, Money, NewProduct, NewTransaction, TransactionType};
use clinic_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Product families with a base price in cents.
const FORMULARY: &[(&str, &[&str], i64)] = &[
    (
        "Analgesic",
        &["Paracetamol 500mg", "Ibuprofen 400mg", "Aspirin 75mg", "Diclofenac 50mg"],
        150,
    ),
    (
        "Antibiotic",
        &["Amoxicillin 250mg", "Azithromycin 500mg", "Ciprofloxacin 500mg", "Doxycycline 100mg"],
        600,
    ),
    (
        "Antihistamine",
        &["Cetirizine 10mg", "Loratadine 10mg", "Chlorphenamine 4mg"],
        220,
    ),
    (
        "Gastro",
        &["Omeprazole 20mg", "Oral Rehydration Salts", "Loperamide 2mg"],
        300,
    ),
    (
        "Supplies",
        &["Gauze Swabs", "Crepe Bandage", "Surgical Gloves", "Syringe 5ml", "Cotton Wool"],
        90,
    ),
];

const PACKS: &[(&str, i64)] = &[("x10", 1), ("x30", 3), ("x100", 9)];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,clinic_core=debug,clinic_db=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path = String::from("./clinic_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Clinic Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./clinic_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path, "Connected, migrations applied");

    let admin = Actor::admin("seed-admin");
    let cashier = Actor::cashier("seed-cashier");

    let existing = db.products().list(None).await?;
    if !existing.is_empty() {
        warn!(products = existing.len(), "Database already seeded, delete the file to regenerate");
        return Ok(());
    }

    // Products first: with no period open yet, each opens at its own stock
    let start = std::time::Instant::now();
    let mut generated = 0;
    'outer: for (category, names, base_cents) in FORMULARY {
        for name in names.iter() {
            for (pack, multiplier) in PACKS {
                if generated >= count {
                    break 'outer;
                }
                let selling = base_cents * multiplier;
                db.products()
                    .create_product(
                        &admin,
                        NewProduct {
                            name: format!("{} {}", name, pack),
                            category: Some(category.to_string()),
                            selling_price: Money::from_cents(selling),
                            cost_price: Money::from_cents(selling * 65 / 100),
                            opening_stock: 20 + (generated as i64 * 37) % 180,
                            reorder_level: None,
                        },
                    )
                    .await?;
                generated += 1;
            }
        }
    }
    info!(generated, elapsed = ?start.elapsed(), "Products seeded");

    // Walk-through product
    let demo = db
        .products()
        .create_product(
            &admin,
            NewProduct {
                name: "Walk-through Paracetamol".to_string(),
                category: Some("Analgesic".to_string()),
                selling_price: Money::from_cents(250),
                cost_price: Money::from_cents(120),
                opening_stock: 100,
                reorder_level: Some(20),
            },
        )
        .await?;

    let today = Utc::now().date_naive();
    let month_start = today.with_day(1).unwrap_or(today);
    let period = db
        .periods()
        .create_period(&admin, "Walk-through", month_start, None)
        .await?;

    let post = |ty: TransactionType, quantity: i64, cents: i64| {
        NewTransaction::new(ty, &demo.id, quantity, Money::from_cents(cents), Some(period.id.clone()))
    };

    db.ledger()
        .create_transaction(&admin, post(TransactionType::Purchase, 50, 120))
        .await?;
    let sale = db
        .ledger()
        .create_transaction(&cashier, post(TransactionType::Sale, 30, 250))
        .await?;
    db.ledger()
        .create_transaction(&admin, post(TransactionType::Adjustment, -5, 120))
        .await?;
    let stock = db.products().get(&demo.id).await?.current_stock;
    info!(stock, "Before close");

    db.periods().close_period(&admin, &period.id).await?;
    let frozen = db.periods().period_closing_stock(&demo.id, &period.id).await?;
    info!(closing_stock = ?frozen, "Period closed");

    db.reversals()
        .reverse(&admin, &sale.id, "Walk-through: customer returned the pack")
        .await?;
    let stock = db.products().get(&demo.id).await?.current_stock;
    let frozen = db.periods().period_closing_stock(&demo.id, &period.id).await?;
    info!(stock, closing_stock = ?frozen, "After reversal");

    let next = db
        .periods()
        .create_period(&admin, "Current", today, None)
        .await?;
    let opening = db.periods().period_opening_stock(&demo.id, &next.id).await?;
    info!(opening_stock = opening, "Next period opened");

    let summary = db.periods().get_period_summary(&period.id).await?;
    info!(
        transactions = summary.transaction_count,
        sales = %summary.sales_amount(),
        discrepancies = summary.discrepancies().count(),
        "Walk-through period summary"
    );

    db.close().await;
    info!("Seed complete");
    Ok(())
}
