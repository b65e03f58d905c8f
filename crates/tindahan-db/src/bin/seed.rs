//! # Seed Data Generator
//!
//! Populates a database with a small demo store for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tindahan_dev.db with store "store-demo"
//! cargo run -p tindahan-db --bin seed
//!
//! # Custom store, database and manager PIN
//! cargo run -p tindahan-db --bin seed -- --store sari-01 --db ./data/tindahan.db --pin 4321
//! ```
//!
//! ## Generated Data
//! - Store settings: step-up required for voids, refunds and discounts,
//!   manager PIN hashed with argon2, 2% auto-discount
//! - Categories: Beverages, Snacks, Grocery, Household
//! - Products: `{CATEGORY}-{INDEX}` SKUs with opening stock, plus one
//!   non-sellable parent ("Rice sack") with sellable per-kilo variants
//! - Customers: two suki accounts with zero balance

use std::env;

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use tindahan_core::{clock, Capability, Category, Customer, Product, StoreSettings};
use tindahan_db::{CatalogStore, CustomerStore, Database, DbConfig, Storage};
use tracing_subscriber::EnvFilter;

/// (category code, category name, [(product name, price in centavos)])
const CATALOG: &[(&str, &str, &[(&str, i64)])] = &[
    (
        "BEV",
        "Beverages",
        &[
            ("Coke Mismo", 2000),
            ("Royal Tru-Orange 1.5L", 7500),
            ("Nescafe 3-in-1 Stick", 1000),
            ("Milo Sachet", 1200),
            ("Zesto Juice", 1100),
        ],
    ),
    (
        "SNK",
        "Snacks",
        &[
            ("Piattos Cheese", 1800),
            ("Skyflakes Crackers", 900),
            ("Boy Bawang", 1200),
            ("Choc-Nut", 200),
            ("Hansel Mocha", 800),
        ],
    ),
    (
        "GRO",
        "Grocery",
        &[
            ("Lucky Me Pancit Canton", 1600),
            ("Argentina Corned Beef", 4200),
            ("Century Tuna Flakes", 3800),
            ("Datu Puti Vinegar 350ml", 2200),
            ("Silver Swan Soy Sauce 350ml", 2400),
        ],
    ),
    (
        "HSE",
        "Household",
        &[
            ("Safeguard Bar", 4500),
            ("Surf Powder Sachet", 900),
            ("Joy Dishwashing Sachet", 800),
        ],
    ),
];

const OPENING_STOCK: i64 = 48;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut store_id = String::from("store-demo");
    let mut db_path = String::from("./tindahan_dev.db");
    let mut pin = String::from("1234");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--pin" | "-p" => {
                if i + 1 < args.len() {
                    pin = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tindahan Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --store <ID>   Store id to seed (default: store-demo)");
                println!("  -d, --db <PATH>    Database file path (default: ./tindahan_dev.db)");
                println!("  -p, --pin <PIN>    Manager PIN for step-up (default: 1234)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tindahan Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Store:    {}", store_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {}", db_path))?;
    db.health_check().await?;
    println!("✓ Connected to database, migrations applied");

    if db.get_settings(&store_id).await?.is_some() {
        println!("⚠ Store {} is already seeded.", store_id);
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = clock::now();

    let mut settings = StoreSettings::defaults(store_id.as_str());
    settings.auto_discount_bps = 200;
    settings.step_up_capabilities = vec![
        Capability::SaleVoid,
        Capability::SaleRefund,
        Capability::DiscountApply,
    ];
    settings.manager_pin_hash = Some(hash_pin(&pin)?);
    settings.updated_at = now;
    db.upsert_settings(&settings).await?;
    println!("✓ Store settings (step-up PIN set)");

    let mut products = 0;
    for (code, name, items) in CATALOG {
        let category_id = format!("{}-cat-{}", store_id, code.to_lowercase());
        db.upsert_category(&Category {
            id: category_id.clone(),
            store_id: store_id.clone(),
            name: name.to_string(),
            is_active: true,
            updated_at: now,
        })
        .await?;

        for (idx, (product_name, price)) in items.iter().enumerate() {
            let product = Product {
                id: format!("{}-{}-{:03}", store_id, code.to_lowercase(), idx + 1),
                store_id: store_id.clone(),
                sku: format!("{}-{:03}", code, idx + 1),
                name: product_name.to_string(),
                price_centavos: *price,
                stock_quantity: OPENING_STOCK,
                category_id: Some(category_id.clone()),
                parent_id: None,
                is_sellable: true,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            db.upsert_product(&product).await?;
            products += 1;
        }
    }

    // Sack of rice sold by the kilo: the parent is not sellable itself.
    let parent_id = format!("{}-rice-sack", store_id);
    let grocery = format!("{}-cat-gro", store_id);
    db.upsert_product(&Product {
        id: parent_id.clone(),
        store_id: store_id.clone(),
        sku: "GRO-RICE".to_string(),
        name: "Rice sack 25kg".to_string(),
        price_centavos: 137_500,
        stock_quantity: 0,
        category_id: Some(grocery.clone()),
        parent_id: None,
        is_sellable: false,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
    .await?;
    for (suffix, name, price) in [("1kg", "Rice 1kg", 5800), ("half", "Rice 1/2kg", 2900)] {
        db.upsert_product(&Product {
            id: format!("{}-rice-{}", store_id, suffix),
            store_id: store_id.clone(),
            sku: format!("GRO-RICE-{}", suffix.to_uppercase()),
            name: name.to_string(),
            price_centavos: price,
            stock_quantity: 100,
            category_id: Some(grocery.clone()),
            parent_id: Some(parent_id.clone()),
            is_sellable: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
        products += 1;
    }
    println!("✓ {} sellable products", products);

    for (idx, name) in ["Aling Nena", "Mang Tonyo"].iter().enumerate() {
        db.upsert_customer(&Customer {
            id: format!("{}-cust-{:03}", store_id, idx + 1),
            store_id: store_id.clone(),
            name: name.to_string(),
            phone: None,
            balance_due_centavos: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    }
    println!("✓ 2 customers");

    db.close().await;
    println!();
    println!("Done.");
    Ok(())
}

fn hash_pin(pin: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash manager PIN: {}", e))
}
