//! # Seed Data Generator
//!
//! Populates a database with a demo bar for development.
//!
//! ## Usage
//! ```bash
//! # 60 days of history into ./data/barback.db (default)
//! cargo run -p barback-db --bin seed
//!
//! # Custom history length and database path
//! cargo run -p barback-db --bin seed -- --days 120 --db ./data/dev.db
//! ```
//!
//! ## What Gets Created
//! - User `demo` / password `barback-demo` (2FA off)
//! - Spirits, beer, wine and mixers with par levels
//! - A handful of cocktails built from them
//! - Daily sales that get busier on Fridays and Saturdays, run through the
//!   same checkout path the server uses

use std::env;

use anyhow::{anyhow, Context};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{Datelike, Duration, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use barback_core::cart::Cart;
use barback_core::checkout::{prepare_sale, Catalog, Payment};
use barback_core::tax::{TaxRegion, TaxSettings};
use barback_core::types::setting_keys;
use barback_core::{ItemKind, PaymentMethod, Product, Recipe, RecipeIngredient, User};
use barback_db::{Database, DbConfig, StockDelta};

const DEMO_USERNAME: &str = "demo";
const DEMO_PASSWORD: &str = "barback-demo";

/// (name, category, unit, price, cost, on hand, par)
const PRODUCTS: &[(&str, &str, &str, i64, i64, f64, f64)] = &[
    ("London Dry Gin", "Spirits", "bottle", 900, 2800, 6.0, 4.0),
    ("Blanco Tequila", "Spirits", "bottle", 1000, 3200, 5.0, 3.0),
    ("Bourbon", "Spirits", "bottle", 1100, 3500, 4.0, 3.0),
    ("White Rum", "Spirits", "bottle", 800, 2400, 5.0, 3.0),
    ("Vodka", "Spirits", "bottle", 850, 2600, 7.0, 4.0),
    ("Campari", "Liqueurs", "bottle", 900, 3000, 3.0, 2.0),
    ("Sweet Vermouth", "Liqueurs", "bottle", 700, 1800, 3.0, 2.0),
    ("Triple Sec", "Liqueurs", "bottle", 700, 1600, 2.0, 1.0),
    ("Lager", "Beer", "can", 700, 180, 96.0, 48.0),
    ("IPA", "Beer", "can", 850, 260, 72.0, 48.0),
    ("House Red", "Wine", "glass", 1100, 300, 40.0, 20.0),
    ("House White", "Wine", "glass", 1100, 300, 40.0, 20.0),
    ("Tonic Water", "Mixers", "can", 300, 90, 48.0, 24.0),
    ("Lime Juice", "Mixers", "litre", 0, 600, 4.0, 2.0),
    ("Simple Syrup", "Mixers", "litre", 0, 300, 3.0, 1.0),
    ("Bitters", "Mixers", "bottle", 0, 1500, 2.0, 1.0),
];

/// (name, price, [(product name, quantity per serving)])
const COCKTAILS: &[(&str, i64, &[(&str, f64)])] = &[
    ("Gin & Tonic", 1200, &[("London Dry Gin", 0.06), ("Tonic Water", 1.0)]),
    (
        "Negroni",
        1500,
        &[("London Dry Gin", 0.04), ("Campari", 0.04), ("Sweet Vermouth", 0.04)],
    ),
    (
        "Margarita",
        1400,
        &[("Blanco Tequila", 0.06), ("Triple Sec", 0.03), ("Lime Juice", 0.03)],
    ),
    (
        "Old Fashioned",
        1500,
        &[("Bourbon", 0.08), ("Simple Syrup", 0.01), ("Bitters", 0.005)],
    ),
    (
        "Daiquiri",
        1300,
        &[("White Rum", 0.06), ("Lime Juice", 0.03), ("Simple Syrup", 0.02)],
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut days: i64 = 60;
    let mut db_path = String::from("./data/barback.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--days" | "-n" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(60);
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
                println!("Barback Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --days <N>     Days of sales history (default: 60)");
                println!("  -d, --db <PATH>    Database file path (default: ./data/barback.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, days, "Seeding demo bar");
    let db = Database::sqlite(DbConfig::new(&db_path))
        .await
        .context("opening database")?;

    if db.find_user_by_username(DEMO_USERNAME).await?.is_some() {
        warn!("User '{}' already exists; delete the database file to reseed", DEMO_USERNAME);
        return Ok(());
    }

    let owner_id = create_demo_user(&db).await?;
    let products = create_products(&db, &owner_id).await?;
    let recipes = create_recipes(&db, &owner_id, &products).await?;

    let tax = TaxSettings {
        region: TaxRegion::Ontario,
        flat_rate_percent: 0.0,
    };
    let mut settings = std::collections::BTreeMap::new();
    settings.insert(setting_keys::TAX_REGION.to_string(), "ontario".to_string());
    settings.insert(setting_keys::BUSINESS_NAME.to_string(), "The Demo Bar".to_string());
    settings.insert(setting_keys::CURRENCY.to_string(), "CAD".to_string());
    // history would otherwise drain the shelves long before today
    settings.insert(setting_keys::ALLOW_NEGATIVE_STOCK.to_string(), "true".to_string());
    db.put_settings(&owner_id, &settings).await?;

    let start = std::time::Instant::now();
    let recorded = create_sales(&db, &owner_id, &products, &recipes, &tax, days).await?;

    info!(
        products = products.len(),
        recipes = recipes.len(),
        sales = recorded,
        elapsed = ?start.elapsed(),
        "Seed complete. Log in as '{}' / '{}'",
        DEMO_USERNAME,
        DEMO_PASSWORD
    );
    Ok(())
}

async fn create_demo_user(db: &Database) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(DEMO_PASSWORD.as_bytes(), &salt)
        .map_err(|e| anyhow!("hashing demo password: {e}"))?
        .to_string();

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: DEMO_USERNAME.to_string(),
        password_hash,
        totp_secret: None,
        totp_enabled: false,
        created_at: Utc::now(),
    };
    db.create_user(&user).await?;
    Ok(user.id)
}

async fn create_products(db: &Database, owner_id: &str) -> anyhow::Result<Vec<Product>> {
    let now = Utc::now();
    let mut products = Vec::with_capacity(PRODUCTS.len());
    for (idx, (name, category, unit, price, cost, quantity, par)) in PRODUCTS.iter().enumerate() {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            price_cents: *price,
            cost_cents: *cost,
            quantity: *quantity,
            unit: unit.to_string(),
            par_level: Some(*par),
            sku: Some(format!("{}-{:03}", &category[..3].to_uppercase(), idx + 1)),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.insert_product(&product).await?;
        products.push(product);
    }
    Ok(products)
}

async fn create_recipes(db: &Database, owner_id: &str, products: &[Product]) -> anyhow::Result<Vec<Recipe>> {
    let now = Utc::now();
    let mut recipes = Vec::with_capacity(COCKTAILS.len());
    for (name, price, ingredients) in COCKTAILS {
        let id = Uuid::new_v4().to_string();
        let ingredients = ingredients
            .iter()
            .map(|(product_name, quantity)| {
                let product = products
                    .iter()
                    .find(|p| p.name == *product_name)
                    .ok_or_else(|| anyhow!("unknown ingredient {product_name}"))?;
                Ok(RecipeIngredient {
                    recipe_id: id.clone(),
                    product_id: product.id.clone(),
                    quantity: *quantity,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let recipe = Recipe {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            category: "Cocktails".to_string(),
            price_cents: *price,
            description: None,
            ingredients,
            created_at: now,
            updated_at: now,
        };
        db.insert_recipe(&recipe).await?;
        recipes.push(recipe);
    }
    Ok(recipes)
}

async fn create_sales(
    db: &Database,
    owner_id: &str,
    products: &[Product],
    recipes: &[Recipe],
    tax: &TaxSettings,
    days: i64,
) -> anyhow::Result<usize> {
    let catalog = Catalog::new(products, recipes);
    let sellable: Vec<(ItemKind, &str)> = products
        .iter()
        .filter(|p| p.price_cents > 0)
        .map(|p| (ItemKind::Product, p.id.as_str()))
        .chain(recipes.iter().map(|r| (ItemKind::Recipe, r.id.as_str())))
        .collect();

    let mut rng = StdRng::seed_from_u64(42);
    let today = Utc::now();
    let mut recorded = 0;

    for day in (1..=days).rev() {
        let date = today - Duration::days(day);
        let busy = matches!(date.weekday(), Weekday::Fri | Weekday::Sat);
        let count = if busy { rng.gen_range(25..40) } else { rng.gen_range(8..18) };

        for n in 0..count {
            let mut cart = Cart::new();
            for _ in 0..rng.gen_range(1..4) {
                let (kind, id) = sellable[rng.gen_range(0..sellable.len())];
                cart.add_item(catalog.cart_item(kind, id, rng.gen_range(1..3))?)?;
            }

            let payment = if rng.gen_bool(0.3) {
                Payment {
                    method: PaymentMethod::Cash,
                    tendered_cents: Some((cart.totals(tax).total_cents + 1999) / 2000 * 2000),
                    payment_intent_id: None,
                }
            } else {
                Payment {
                    method: PaymentMethod::Card,
                    tendered_cents: None,
                    payment_intent_id: None,
                }
            };

            // spread the evening from 17:00 onwards
            let at = date.date_naive().and_hms_opt(17, 0, 0).map(|t| t.and_utc()).unwrap_or(date)
                + Duration::minutes(n * 360 / count);
            let draft = prepare_sale(owner_id, &cart, &catalog, tax, payment, None, at)?;
            let stock: Vec<StockDelta> = draft
                .stock
                .iter()
                .map(|(product_id, units)| StockDelta {
                    product_id: product_id.clone(),
                    delta: -units,
                })
                .collect();

            db.record_sale(draft.sale, draft.items, &stock, true).await?;
            recorded += 1;
        }
    }
    Ok(recorded)
}
